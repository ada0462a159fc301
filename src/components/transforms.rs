use geo::{AffineTransform, Coord};
use shrinkwraprs::Shrinkwrap;

use crate::{
    components::bounds::PixelWindow,
    errors::{BandMathError, Result},
};

/// Affine map from pixel to ground coordinates.
///
/// Coefficients follow gdal order when converted with
/// [GeoTransform::from_gdal] and [GeoTransform::to_gdal]:
/// `(origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height)`.
/// Pixel width and height are never zero, pixel height is
/// negative for north up imagery.
#[derive(Shrinkwrap, Debug, Clone, Copy)]
pub struct GeoTransform(AffineTransform);

impl PartialEq for GeoTransform {
    fn eq(&self, other: &Self) -> bool {
        self.to_gdal() == other.to_gdal()
    }
}

impl GeoTransform {
    pub fn from_gdal(gdal_transform: [f64; 6]) -> Result<Self> {
        let [xoff, a, b, yoff, d, e] = gdal_transform;
        if a == 0. || e == 0. || gdal_transform.iter().any(|coef| !coef.is_finite()) {
            return Err(BandMathError::InvalidTransform(gdal_transform));
        }
        Ok(Self(AffineTransform::new(a, b, xoff, d, e, yoff)))
    }

    /// What gdal reports for a dataset without georeferencing.
    pub fn identity() -> Self {
        Self(AffineTransform::identity())
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        let t = &self.0;
        [t.xoff(), t.a(), t.b(), t.yoff(), t.d(), t.e()]
    }

    pub fn origin(&self) -> Coord {
        Coord {
            x: self.0.xoff(),
            y: self.0.yoff(),
        }
    }

    /// (pixel_width, pixel_height)
    pub fn resolution(&self) -> (f64, f64) {
        (self.0.a(), self.0.e())
    }

    pub fn pixel_to_ground(&self, col: f64, row: f64) -> Coord {
        self.0.apply(Coord { x: col, y: row })
    }

    /// Fractional pixel coordinates of a ground point.
    ///
    /// Without rotation terms this is the offset from the origin divided
    /// by the pixel size, not the product with the inverted coefficients.
    pub fn ground_to_pixel(&self, ground: Coord) -> Result<Coord> {
        let t = &self.0;
        if t.b() == 0. && t.d() == 0. {
            return Ok(Coord {
                x: (ground.x - t.xoff()) / t.a(),
                y: (ground.y - t.yoff()) / t.e(),
            });
        }
        let inverse = t
            .inverse()
            .ok_or(BandMathError::InvalidTransform(self.to_gdal()))?;
        Ok(inverse.apply(ground))
    }

    /// Transform of a raster holding only `window`.
    ///
    /// Only the origin moves, by whole pixel steps along each axis;
    /// rotation terms are copied unchanged.
    pub fn for_window(&self, window: &PixelWindow) -> Self {
        let mut gdal_transform = self.to_gdal();
        gdal_transform[0] += window.x_offset as f64 * gdal_transform[1];
        gdal_transform[3] += window.y_offset as f64 * gdal_transform[5];
        let [xoff, a, b, yoff, d, e] = gdal_transform;
        Self(AffineTransform::new(a, b, xoff, d, e, yoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const UTM: [f64; 6] = [500_000., 10., 0., 4_600_000., 0., -10.];

    #[rstest]
    fn gdal_order_round_trips() {
        let transform = GeoTransform::from_gdal(UTM).unwrap();
        assert_eq!(transform.to_gdal(), UTM);
        assert_eq!(transform.resolution(), (10., -10.));
        assert_eq!(transform.origin(), Coord { x: 500_000., y: 4_600_000. });
    }

    #[rstest]
    #[case([0., 0., 0., 0., 0., -1.])]
    #[case([0., 1., 0., 0., 0., 0.])]
    #[case([f64::NAN, 1., 0., 0., 0., -1.])]
    fn rejects_degenerate_pixel_size(#[case] gdal_transform: [f64; 6]) {
        assert!(matches!(
            GeoTransform::from_gdal(gdal_transform),
            Err(BandMathError::InvalidTransform(_))
        ));
    }

    #[rstest]
    fn pixel_ground_inverse() {
        let transform = GeoTransform::from_gdal(UTM).unwrap();
        let ground = transform.pixel_to_ground(3., 7.);
        assert_eq!(ground, Coord { x: 500_030., y: 4_599_930. });
        assert_eq!(
            transform.ground_to_pixel(ground).unwrap(),
            Coord { x: 3., y: 7. }
        );
    }

    #[rstest]
    #[case([-180., 0.1, 0., 90., 0., -0.1], Coord { x: -179.5, y: 89. }, Coord { x: 5., y: 10. })]
    #[case([600_000., 0.3, 0., 0., 0., -0.3], Coord { x: 600_000.6, y: -0.3 }, Coord { x: 1.9999999999223899, y: 1. })]
    fn north_up_pixels_divide_by_resolution(
        #[case] gdal_transform: [f64; 6],
        #[case] ground: Coord,
        #[case] expected: Coord,
    ) {
        let transform = GeoTransform::from_gdal(gdal_transform).unwrap();
        assert_eq!(transform.ground_to_pixel(ground).unwrap(), expected);
    }

    #[rstest]
    fn rotated_pixels_use_inverse() {
        let transform = GeoTransform::from_gdal([100., 2., 0.5, 200., 0.25, -3.]).unwrap();
        let pixel = transform
            .ground_to_pixel(transform.pixel_to_ground(4., 6.))
            .unwrap();
        assert!((pixel.x - 4.).abs() < 1e-9);
        assert!((pixel.y - 6.).abs() < 1e-9);
    }

    #[rstest]
    fn window_moves_origin_only() {
        let transform = GeoTransform::from_gdal([100., 2., 0.5, 200., 0.25, -3.]).unwrap();
        let window = PixelWindow::new(4, 5, 10, 10);
        assert_eq!(
            transform.for_window(&window).to_gdal(),
            [108., 2., 0.5, 185., 0.25, -3.]
        );
        assert_eq!(transform.for_window(&PixelWindow::new(0, 0, 1, 1)), transform);
    }
}
