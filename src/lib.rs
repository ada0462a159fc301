pub mod algorithms;
pub mod buffer;
pub mod components;
pub mod config;
pub mod crs_geo;
pub mod errors;
pub mod indexes;
pub mod intersection;
pub mod pipeline;

pub use algorithms::Algorithm;
pub use components::{Dataset, DatasetSource, PixelWindow, RasterMetadata};
pub use config::{JobConfig, ReadMode, RunConfig, SourceConfig, Subset};
pub use errors::{BandMathError, ErrorKind, Result};
pub use indexes::Indexes;
pub use pipeline::{CancellationFlag, ProcessingPipeline, RunOutcome, RunState, RunStatus};

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use gdal::{raster::GdalType, spatial_ref::SpatialRef, DriverManager};

    pub fn utm_wkt() -> String {
        SpatialRef::from_epsg(32633).unwrap().to_wkt().unwrap()
    }

    /// GeoTIFF in UTM 33N with one band per entry of `bands`.
    pub fn write_geotiff<T: GdalType + Copy>(
        path: &Path,
        size: (usize, usize),
        transform: [f64; 6],
        bands: Vec<Vec<T>>,
    ) {
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut dataset = driver
            .create_with_band_type::<T, _>(path, size.0, size.1, bands.len())
            .unwrap();
        dataset.set_geo_transform(&transform).unwrap();
        dataset.set_projection(&utm_wkt()).unwrap();
        for (index, cells) in bands.into_iter().enumerate() {
            let mut buffer = gdal::raster::Buffer::new(size, cells);
            dataset
                .rasterband(index + 1)
                .unwrap()
                .write((0, 0), size, &mut buffer)
                .unwrap();
        }
    }
}
