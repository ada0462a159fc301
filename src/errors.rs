pub type Result<T> = std::result::Result<T, BandMathError>;

/// Kind of a [BandMathError], without its detail payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidGeometry,
    MissingSpatialReference,
    NoIntersection,
    IncompatibleBands,
    BandOutOfRange,
    BandCountMismatch,
    UnknownAlgorithm,
    OutputCreationFailed,
    SourceOpenFailed,
    InvalidTransform,
    InvalidSubset,
    InvalidBandIndexes,
    UnsupportedDataType,
    Io,
    Projection,
    ThreadPool,
    RunFinished,
}

#[derive(thiserror::Error, Debug)]
pub enum BandMathError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("Image '{0}' has no spatial reference")]
    MissingSpatialReference(String),
    #[error("Geometry does not intersect image: {0}")]
    NoIntersection(String),
    #[error("Bands {bands:?} of image '{image}' have different {property}")]
    IncompatibleBands {
        image: String,
        bands: Vec<usize>,
        property: &'static str,
    },
    #[error("Band '{band}' is out of range, image has {total} bands")]
    BandOutOfRange { band: usize, total: usize },
    #[error("Algorithm '{algorithm}' reads {expected} bands, got {got}")]
    BandCountMismatch {
        algorithm: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("Unknown algorithm '{0}'")]
    UnknownAlgorithm(String),
    #[error("Creating output image '{path}': {reason}")]
    OutputCreationFailed { path: String, reason: String },
    #[error("Opening '{source_name}': {reason}")]
    SourceOpenFailed { source_name: String, reason: String },
    #[error("Invalid geotransform {0:?}")]
    InvalidTransform([f64; 6]),
    #[error("Invalid subset: {0}")]
    InvalidSubset(String),
    #[error("Invalid band numbers '{0}'")]
    InvalidBandIndexes(String),
    #[error("Data type '{0}' is not supported")]
    UnsupportedDataType(String),
    #[error(transparent)]
    GdalError(#[from] gdal::errors::GdalError),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ProjError(#[from] proj::ProjError),
    #[error(transparent)]
    ProjCreateError(#[from] proj::ProjCreateError),
    #[error("Row {row} of selected band {band} was never read")]
    RowNotRead { row: usize, band: usize },
    #[error("Run already finished as {0:?}")]
    RunFinished(crate::pipeline::RunState),
    #[error(transparent)]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
}

impl BandMathError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidGeometry(_) => ErrorKind::InvalidGeometry,
            Self::MissingSpatialReference(_) => ErrorKind::MissingSpatialReference,
            Self::NoIntersection(_) => ErrorKind::NoIntersection,
            Self::IncompatibleBands { .. } => ErrorKind::IncompatibleBands,
            Self::BandOutOfRange { .. } => ErrorKind::BandOutOfRange,
            Self::BandCountMismatch { .. } => ErrorKind::BandCountMismatch,
            Self::UnknownAlgorithm(_) => ErrorKind::UnknownAlgorithm,
            Self::OutputCreationFailed { .. } => ErrorKind::OutputCreationFailed,
            Self::SourceOpenFailed { .. } => ErrorKind::SourceOpenFailed,
            Self::InvalidTransform(_) => ErrorKind::InvalidTransform,
            Self::InvalidSubset(_) => ErrorKind::InvalidSubset,
            Self::InvalidBandIndexes(_) => ErrorKind::InvalidBandIndexes,
            Self::UnsupportedDataType(_) => ErrorKind::UnsupportedDataType,
            Self::GdalError(_) | Self::IoError(_) | Self::RowNotRead { .. } => ErrorKind::Io,
            Self::ProjError(_) | Self::ProjCreateError(_) => ErrorKind::Projection,
            Self::ThreadPoolError(_) => ErrorKind::ThreadPool,
            Self::RunFinished(_) => ErrorKind::RunFinished,
        }
    }
}
