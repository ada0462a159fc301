use std::{fmt::Debug, sync::Arc};

use crate::{
    components::{
        band::{BandInfo, BandReader, RasterBuffer},
        bounds::PixelWindow,
        metadata::RasterMetadata,
        transforms::GeoTransform,
    },
    errors::{BandMathError, Result},
};

/// An opened, read only raster.
///
/// Band numbers are 1-based, like gdal's.
pub trait Dataset: Debug {
    /// Name of the image, used to name outputs.
    fn description(&self) -> String;
    /// (width, height)
    fn size(&self) -> (usize, usize);
    fn num_bands(&self) -> usize;
    /// Empty when the dataset has no spatial reference.
    fn crs(&self) -> String;
    fn transform(&self) -> Result<GeoTransform>;
    fn band_info(&self, band: usize) -> Result<BandInfo>;
    fn read_window(&self, band: usize, window: &PixelWindow) -> Result<RasterBuffer>;
    /// Reader for `band` that can be handed to worker threads.
    fn band_reader(&self, band: usize) -> Result<Arc<dyn BandReader>>;

    fn read_bands(&self, bands: &[usize], window: &PixelWindow) -> Result<Vec<RasterBuffer>> {
        bands
            .iter()
            .map(|band| self.read_window(*band, window))
            .collect()
    }

    fn check_band(&self, band: usize) -> Result<()> {
        let total = self.num_bands();
        if band == 0 || band > total {
            return Err(BandMathError::BandOutOfRange { band, total });
        }
        Ok(())
    }

    fn metadata(&self) -> Result<RasterMetadata> {
        let (width, height) = self.size();
        Ok(RasterMetadata {
            description: self.description(),
            transform: self.transform()?,
            crs: self.crs(),
            width,
            height,
            num_bands: self.num_bands(),
        })
    }
}

/// Somewhere a [Dataset] can be opened from.
pub trait DatasetSource: Debug {
    fn name(&self) -> String;
    fn open(&self) -> Result<Box<dyn Dataset>>;
}
