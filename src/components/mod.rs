pub mod backends;
pub mod band;
pub mod bounds;
pub mod file;
pub mod metadata;
pub mod reader;
pub mod subset;
pub mod transforms;
pub mod writer;

pub use backends::{
    gdal_backend::{LocalImage, PlanetScene},
    memory::MemoryDataset,
};
pub use band::{BandInfo, BandReader, PixelType, RasterBuffer};
pub use bounds::{PixelCorners, PixelWindow};
pub use file::{Dataset, DatasetSource};
pub use metadata::RasterMetadata;
pub use reader::WindowedValueStream;
pub use subset::{GeoEngine, GeometryEngine, SubsetResolver};
pub use transforms::GeoTransform;
pub use writer::OutputRasterWriter;
