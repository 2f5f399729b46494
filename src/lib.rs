pub mod buffer;
pub mod components;
pub mod config;
pub mod datetime;
pub mod errors;
pub mod expression;
pub mod processor;
#[cfg(test)]
pub(crate) mod testing;

pub use buffer::ChunkBuffer;
pub use components::{
    aggregation::TemporalAggregator,
    bands::{Band, BandCollection},
    bounds::SpaceTimeWindow,
    collection::{CatalogRow, CollectionImage, ImageCollection, MemoryCollection},
    cube::{Cube, CubeCore},
    cubes::{
        ApplyPixelCube, DummyCube, FilterPixelCube, JoinBandsCube, ReduceCube, ReduceSpaceCube,
        ReduceTimeCube, SelectBandsCube, StreamCube, WindowTimeCube,
    },
    engines::{gdal_engine::GdalFacility, RasterFacility, WarpRequest},
    factory::{CollectionOpener, CubeFactory},
    mask::ImageMask,
    reducers::{BandReducer, ReducerKind},
    source::ImageCollectionCube,
    view::{AggregationMethod, ChunkGrid, ChunkId, CubeView, STReference},
};
pub use config::EngineConfig;
pub use datetime::{TimeDuration, TimePoint, TimeUnit};
pub use errors::{CubeError, Result};
pub use processor::ChunkProcessor;
