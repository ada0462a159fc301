use std::fmt::Debug;

use gdal::vector::Geometry;
use geo::{Coord, MultiPolygon};
use log::info;

use crate::{
    components::{
        bounds::{PixelCorners, PixelWindow},
        metadata::RasterMetadata,
    },
    crs_geo::CrsGeometry,
    errors::{BandMathError, Result},
    intersection::Intersection,
};

/// Polygons with the reference system they are expressed in.
pub type Region = CrsGeometry<MultiPolygon<f64>>;

/// Vector operations needed to turn a query polygon into a window.
pub trait GeometryEngine: Debug {
    fn parse_polygon(&self, wkt: &str, crs: &str) -> Result<Region>;
    fn reproject(&self, region: Region, crs: &str) -> Result<Region>;
    /// Areal intersection, in the crs of `lhs`.
    fn intersection(&self, lhs: &Region, rhs: &Region) -> Result<Region>;
}

/// Parses with gdal, reprojects with proj and intersects with geo.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoEngine;

impl GeometryEngine for GeoEngine {
    fn parse_polygon(&self, wkt: &str, crs: &str) -> Result<Region> {
        let geometry = Geometry::from_wkt(wkt)
            .and_then(|geometry| geometry.to_geo())
            .map_err(|err| BandMathError::InvalidGeometry(format!("{wkt}: {err}")))?;
        let polygons = match geometry {
            geo::Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
            geo::Geometry::MultiPolygon(polygons) => polygons,
            other => {
                return Err(BandMathError::InvalidGeometry(format!(
                    "expected a polygon, got {other:?}"
                )))
            }
        };
        if polygons.0.is_empty() {
            return Err(BandMathError::InvalidGeometry(format!(
                "{wkt}: polygon is empty"
            )));
        }
        Ok(CrsGeometry::new(crs, polygons))
    }

    fn reproject(&self, region: Region, crs: &str) -> Result<Region> {
        region.with_crs(crs)
    }

    fn intersection(&self, lhs: &Region, rhs: &Region) -> Result<Region> {
        Intersection::intersection(lhs, rhs)
    }
}

/// Finds the pixel window of a raster covered by a query polygon.
#[derive(Debug, Clone, Default)]
pub struct SubsetResolver<E = GeoEngine> {
    engine: E,
}

impl<E: GeometryEngine> SubsetResolver<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Fails with `InvalidGeometry` unless `wkt` is a polygon, without
    /// looking at any raster.
    pub fn check_query(&self, wkt: &str, crs: &str) -> Result<()> {
        self.engine.parse_polygon(wkt, crs).map(|_| ())
    }

    /// Window of `metadata` covering the intersection of its footprint
    /// with the `wkt` polygon expressed in `crs`.
    pub fn resolve(&self, metadata: &RasterMetadata, wkt: &str, crs: &str) -> Result<PixelWindow> {
        let corners = self.envelope_corners(metadata, wkt, crs)?;
        let window = corners.clamp_to(metadata.size());
        if window.is_empty() {
            return Err(BandMathError::NoIntersection(format!(
                "subset {corners} of {} is empty",
                metadata.description
            )));
        }
        info!("resolved subset {window} of {}", metadata.description);
        Ok(window)
    }

    /// Same as [SubsetResolver::resolve], as `x_UL,y_UL,x_BR,y_BR` corners.
    pub fn resolve_corners(
        &self,
        metadata: &RasterMetadata,
        wkt: &str,
        crs: &str,
    ) -> Result<PixelCorners> {
        self.resolve(metadata, wkt, crs)
            .map(|window| PixelCorners::from(&window))
    }

    /// Envelope of the intersection in pixel space, before clamping.
    ///
    /// Both corners are rounded up, the upper left one (min x, max y)
    /// as well as the bottom right one (max x, min y).
    fn envelope_corners(
        &self,
        metadata: &RasterMetadata,
        wkt: &str,
        crs: &str,
    ) -> Result<PixelCorners> {
        let query = self.engine.parse_polygon(wkt, crs)?;
        let footprint = metadata.footprint()?;
        let query = self.engine.reproject(query, footprint.crs())?;
        let intersection = self.engine.intersection(&footprint, &query)?;
        let envelope = intersection.bounding_rect().ok_or_else(|| {
            BandMathError::NoIntersection(format!(
                "intersection with {} has no envelope",
                metadata.description
            ))
        })?;
        let (min, max) = (envelope.min(), envelope.max());
        let transform = &metadata.transform;
        let upper_left = transform.ground_to_pixel(Coord { x: min.x, y: max.y })?;
        let bottom_right = transform.ground_to_pixel(Coord { x: max.x, y: min.y })?;
        Ok(PixelCorners {
            x_ul: upper_left.x.ceil() as i64,
            y_ul: upper_left.y.ceil() as i64,
            x_br: bottom_right.x.ceil() as i64,
            y_br: bottom_right.y.ceil() as i64,
        })
    }
}
