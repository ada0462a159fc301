use geo::{LineString, MultiPolygon, Polygon};

use crate::{
    components::{bounds::PixelWindow, transforms::GeoTransform},
    crs_geo::CrsGeometry,
    errors::{BandMathError, Result},
};

/// Georeferencing and shape of an opened dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub description: String,
    pub transform: GeoTransform,
    /// Empty when the dataset carries no georeference.
    pub crs: String,
    pub width: usize,
    pub height: usize,
    pub num_bands: usize,
}

impl RasterMetadata {
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn full_window(&self) -> PixelWindow {
        PixelWindow::full(self.size())
    }

    /// Ground polygon covered by the raster, in its own crs.
    pub fn footprint(&self) -> Result<CrsGeometry<MultiPolygon<f64>>> {
        if self.crs.trim().is_empty() {
            return Err(BandMathError::MissingSpatialReference(
                self.description.clone(),
            ));
        }
        let (width, height) = (self.width as f64, self.height as f64);
        let ring: Vec<_> = [(0., 0.), (width, 0.), (width, height), (0., height), (0., 0.)]
            .into_iter()
            .map(|(col, row)| self.transform.pixel_to_ground(col, row))
            .collect();
        let footprint = Polygon::new(LineString::new(ring), vec![]);
        Ok(CrsGeometry::new(
            self.crs.as_str(),
            MultiPolygon::new(vec![footprint]),
        ))
    }
}
