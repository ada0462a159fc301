use std::{rc::Rc, str::FromStr};

use itertools::Itertools;

use crate::errors::{BandMathError, Result};

/// Ordered, 1-based band numbers selected for a run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Indexes {
    selection: Rc<[usize]>,
}

impl<const N: usize> From<[usize; N]> for Indexes {
    fn from(value: [usize; N]) -> Self {
        Indexes {
            selection: Rc::from(value),
        }
    }
}

impl From<Vec<usize>> for Indexes {
    fn from(value: Vec<usize>) -> Self {
        Indexes {
            selection: Rc::from(value),
        }
    }
}

impl FromStr for Indexes {
    type Err = BandMathError;

    /// Band numbers separated by commas, `1,2`.
    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(|value| {
                let value = value.trim();
                if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
                    return Err(BandMathError::InvalidBandIndexes(format!(
                        "band '{value}' is not a number"
                    )));
                }
                value
                    .parse::<usize>()
                    .map_err(|err| BandMathError::InvalidBandIndexes(err.to_string()))
            })
            .collect::<Result<Vec<_>>>()
            .map(Indexes::from)
    }
}

impl Indexes {
    pub fn as_slice(&self) -> &[usize] {
        self.selection.as_ref()
    }

    pub fn len(&self) -> usize {
        self.selection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selection.is_empty()
    }

    /// Every band must exist in a raster of `num_bands` bands.
    pub fn check(&self, num_bands: usize) -> Result<()> {
        match self
            .selection
            .iter()
            .find(|band| **band == 0 || **band > num_bands)
        {
            Some(band) => Err(BandMathError::BandOutOfRange {
                band: *band,
                total: num_bands,
            }),
            None => Ok(()),
        }
    }

    /// `B1-B2` style label used in output names.
    pub fn label(&self) -> String {
        self.selection.iter().map(|band| format!("B{band}")).join("-")
    }
}
