use num::Zero;

#[derive(Debug, Clone, PartialEq)]
pub struct Buffer<T, const ND: usize> {
    // Row-major
    data: Box<[T]>,
    shape: [usize; ND],
}

impl<T: Zero + Clone, const ND: usize> Buffer<T, ND> {
    pub fn new_zeroed(shape: [usize; ND]) -> Self {
        Self {
            data: vec![T::zero(); shape.iter().product()].into_boxed_slice(),
            shape,
        }
    }
}

/// Values of every selected band for one window row, `(band, x)`.
pub type BandRows = Buffer<f64, 2>;

impl BandRows {
    pub fn width(&self) -> usize {
        self.shape[1]
    }

    /// Row of the `index`-th selected band (0-based, selection order).
    pub fn band(&self, index: usize) -> &[f64] {
        let width = self.width();
        &self.data[index * width..(index + 1) * width]
    }

    pub fn band_mut(&mut self, index: usize) -> &mut [f64] {
        let width = self.width();
        &mut self.data[index * width..(index + 1) * width]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn band_rows_are_addressed_by_band_then_x() {
        let mut rows = BandRows::new_zeroed([2, 3]);
        rows.band_mut(1).copy_from_slice(&[4., 5., 6.]);
        assert_eq!(rows.band(0), &[0., 0., 0.]);
        assert_eq!(rows.band(1)[2], 6.);
        assert_eq!(rows.width(), 3);
    }
}
