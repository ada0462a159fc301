use std::{fmt::Display, ops::Range, str::FromStr};

use crate::errors::{BandMathError, Result};

/// Pixel bounds of the processing window.
///
/// Defined by:
///     - `offset`: coords of top left pixel of the window,
///         with origin at top left pixel of raster.
///     - `shape`: (width, height) a.k.a. columns and rows.
///
/// A window built through [PixelWindow::full] or [PixelCorners::clamp_to]
/// always fits inside the raster it was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelWindow {
    pub x_offset: usize,
    pub y_offset: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(x_offset: usize, y_offset: usize, width: usize, height: usize) -> Self {
        Self {
            x_offset,
            y_offset,
            width,
            height,
        }
    }

    /// Window covering a whole raster of `size` (width, height).
    pub fn full(size: (usize, usize)) -> Self {
        Self::new(0, 0, size.0, size.1)
    }

    /// (width, height)
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Pixel area of the window.
    pub fn size(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn fits(&self, raster_size: (usize, usize)) -> bool {
        self.x_offset + self.width <= raster_size.0 && self.y_offset + self.height <= raster_size.1
    }

    /// Absolute raster rows covered by the window.
    pub fn rows(&self) -> Range<usize> {
        self.y_offset..self.y_offset + self.height
    }

    /// One row high window at absolute raster row `row`.
    pub fn row(&self, row: usize) -> Self {
        Self::new(self.x_offset, row, self.width, 1)
    }
}

impl Display for PixelWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x_offset, self.y_offset
        )
    }
}

/// Upper left and bottom right pixel corners of a subset.
///
/// Corners may fall outside the raster (or be negative) when they come
/// from rounding ground coordinates; [PixelCorners::clamp_to] brings them
/// back inside. Parsed from text as `x_UL,y_UL,x_BR,y_BR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelCorners {
    pub x_ul: i64,
    pub y_ul: i64,
    pub x_br: i64,
    pub y_br: i64,
}

impl PixelCorners {
    /// Clamp corners against a raster of `raster_size` (width, height).
    ///
    /// Corners in the wrong order collapse to an empty window.
    pub fn clamp_to(&self, raster_size: (usize, usize)) -> PixelWindow {
        let (width, height) = (raster_size.0 as i64, raster_size.1 as i64);
        let x_ul = num::clamp(self.x_ul, 0, width);
        let y_ul = num::clamp(self.y_ul, 0, height);
        let x_br = num::clamp(self.x_br, 0, width);
        let y_br = num::clamp(self.y_br, 0, height);
        PixelWindow::new(
            x_ul as usize,
            y_ul as usize,
            (x_br - x_ul).max(0) as usize,
            (y_br - y_ul).max(0) as usize,
        )
    }

    /// Strict conversion for caller supplied corners: they must be ordered
    /// and lie inside the raster.
    pub fn to_window(&self, raster_size: (usize, usize)) -> Result<PixelWindow> {
        if self.x_ul < 0 || self.y_ul < 0 {
            return Err(BandMathError::InvalidSubset(format!(
                "upper left corner ({}, {}) is negative",
                self.x_ul, self.y_ul
            )));
        }
        if self.x_ul >= self.x_br {
            return Err(BandMathError::InvalidSubset(format!(
                "x_UL '{}' is greater or equal than x_BR '{}'",
                self.x_ul, self.x_br
            )));
        }
        if self.y_ul >= self.y_br {
            return Err(BandMathError::InvalidSubset(format!(
                "y_UL '{}' is greater or equal than y_BR '{}'",
                self.y_ul, self.y_br
            )));
        }
        if self.x_br as usize > raster_size.0 || self.y_br as usize > raster_size.1 {
            return Err(BandMathError::InvalidSubset(format!(
                "bottom right corner ({}, {}) is outside image of {}x{}",
                self.x_br, self.y_br, raster_size.0, raster_size.1
            )));
        }
        Ok(self.clamp_to(raster_size))
    }
}

impl From<&PixelWindow> for PixelCorners {
    fn from(window: &PixelWindow) -> Self {
        Self {
            x_ul: window.x_offset as i64,
            y_ul: window.y_offset as i64,
            x_br: (window.x_offset + window.width) as i64,
            y_br: (window.y_offset + window.height) as i64,
        }
    }
}

impl Display for PixelCorners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.x_ul, self.y_ul, self.x_br, self.y_br)
    }
}

impl FromStr for PixelCorners {
    type Err = BandMathError;

    fn from_str(s: &str) -> Result<Self> {
        let coords = s
            .split(',')
            .map(|value| {
                value.trim().parse::<u32>().map_err(|_| {
                    BandMathError::InvalidSubset(format!("coordinate '{value}' is not a number"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        match coords.as_slice() {
            &[x_ul, y_ul, x_br, y_br] => Ok(Self {
                x_ul: x_ul.into(),
                y_ul: y_ul.into(),
                x_br: x_br.into(),
                y_br: y_br.into(),
            }),
            _ => Err(BandMathError::InvalidSubset(format!(
                "need four coordinates, received {}",
                coords.len()
            ))),
        }
    }
}
