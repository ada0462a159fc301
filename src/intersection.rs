use geo::dimensions::Dimensions;
use geo::{Area, BooleanOps, HasDimensions, MultiPolygon, Polygon};

use crate::errors::{BandMathError, Result};

pub trait Intersection {
    type Output;
    fn intersection(&self, rhs: &Self) -> Result<Self::Output>;
}

/// Keep only areal intersections, points and lines where
/// the geometries merely touch do not count.
fn areal(intersection: MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
    if intersection.dimensions() != Dimensions::TwoDimensional
        || intersection.unsigned_area() <= 0.
    {
        return Err(BandMathError::NoIntersection(
            "There is no areal intersection between geometries".to_string(),
        ));
    }
    Ok(intersection)
}

impl Intersection for Polygon<f64> {
    type Output = MultiPolygon<f64>;
    fn intersection(&self, rhs: &Self) -> Result<MultiPolygon<f64>> {
        areal(<Self as BooleanOps>::intersection(self, rhs))
    }
}

impl Intersection for MultiPolygon<f64> {
    type Output = MultiPolygon<f64>;
    fn intersection(&self, rhs: &Self) -> Result<MultiPolygon<f64>> {
        areal(<Self as BooleanOps>::intersection(self, rhs))
    }
}
