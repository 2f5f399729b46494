pub type Result<T> = std::result::Result<T, CubeError>;

#[derive(thiserror::Error, Debug)]
pub enum CubeError {
    /// lib errors
    #[error(transparent)]
    GdalError(#[from] gdal::errors::GdalError),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// crate mod errors
    #[error(transparent)]
    DatetimeError(#[from] crate::datetime::DatetimeError),
    #[error(transparent)]
    ExpressionError(#[from] crate::expression::ExpressionError),
    /// crate lib errors
    #[error("unknown reducer `{0}`")]
    UnknownReducer(String),
    #[error("unknown cube type `{0}`")]
    UnknownCubeType(String),
    #[error("band `{0}` not found")]
    BandNotFound(String),
    #[error("duplicate band name `{0}`")]
    DuplicateBand(String),
    #[error("incompatible cube geometries: {0}")]
    GeometryMismatch(String),
    #[error("invalid cube view: {0}")]
    InvalidView(String),
    #[error("invalid cube description: {0}")]
    InvalidDescription(String),
    #[error("image collection file `{0}` does not exist")]
    CollectionNotFound(std::path::PathBuf),
    #[error("aggregation method `{0}` is not supported when reading image collections")]
    UnsupportedAggregation(String),
    #[error("raster facility failed on `{descriptor}`: {message}")]
    RasterFacility { descriptor: String, message: String },
    #[error("stream command failed: {0}")]
    StreamFailed(String),
    #[error("streamed process returned chunk of shape {got:?}, expected {expected:?}")]
    StreamShapeMismatch { got: [usize; 4], expected: [usize; 4] },
    #[error("could not build worker pool: {0}")]
    WorkerPool(String),
}
