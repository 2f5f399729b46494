mod apply_pixel;
mod dummy;
mod filter_pixel;
mod join_bands;
mod reduce;
mod reduce_space;
mod reduce_time;
mod select_bands;
mod stream;
mod window_time;

pub use apply_pixel::ApplyPixelCube;
pub use dummy::DummyCube;
pub use filter_pixel::FilterPixelCube;
pub use join_bands::JoinBandsCube;
pub use reduce::ReduceCube;
pub use reduce_space::ReduceSpaceCube;
pub use reduce_time::ReduceTimeCube;
pub use select_bands::SelectBandsCube;
pub use stream::StreamCube;
pub use window_time::WindowTimeCube;
