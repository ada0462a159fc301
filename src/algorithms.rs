use std::{fmt::Display, str::FromStr};

use crate::{
    buffer::BandRows,
    components::band::PixelType,
    errors::{BandMathError, Result},
};

/// Fixed properties of an [Algorithm].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: &'static str,
    pub bands_read: usize,
    pub bands_out: usize,
    pub data_type: PixelType,
}

/// Per pixel function from the values of `bands_read` bands to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// 255 where the band is positive, 0 elsewhere.
    Mask,
    /// `(b1 - b2) / (b1 + b2)`, 0 where the sum is 0.
    #[serde(rename = "norm-diff", alias = "normalize_difference")]
    NormalizedDifference,
}

const MASK: AlgorithmDescriptor = AlgorithmDescriptor {
    name: "mask",
    description: "Calculate the mask, 255 for pixels > 0",
    arguments: "Number of one band",
    bands_read: 1,
    bands_out: 1,
    data_type: PixelType::U8,
};

const NORMALIZED_DIFFERENCE: AlgorithmDescriptor = AlgorithmDescriptor {
    name: "norm-diff",
    description: "Calculate normalized difference",
    arguments: "Numbers of two bands",
    bands_read: 2,
    bands_out: 1,
    data_type: PixelType::F32,
};

pub fn mask(value: f64) -> f64 {
    if value > 0. {
        255.
    } else {
        0.
    }
}

pub fn normalized_difference(band1: f64, band2: f64) -> f64 {
    let sum = band1 + band2;
    if sum == 0. {
        0.
    } else {
        (band1 - band2) / sum
    }
}

impl Algorithm {
    pub const ALL: [Algorithm; 2] = [Algorithm::Mask, Algorithm::NormalizedDifference];

    pub fn descriptor(&self) -> &'static AlgorithmDescriptor {
        match self {
            Self::Mask => &MASK,
            Self::NormalizedDifference => &NORMALIZED_DIFFERENCE,
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }

    pub fn bands_read(&self) -> usize {
        self.descriptor().bands_read
    }

    pub fn bands_out(&self) -> usize {
        self.descriptor().bands_out
    }

    pub fn data_type(&self) -> PixelType {
        self.descriptor().data_type
    }

    /// Output for one pixel, `values` in band selection order.
    pub fn compute(&self, values: &[f64]) -> f64 {
        match self {
            Self::Mask => mask(values[0]),
            Self::NormalizedDifference => normalized_difference(values[0], values[1]),
        }
    }

    /// Fill `out` with the output of every pixel of `rows`.
    pub fn compute_row(&self, rows: &BandRows, out: &mut [f64]) {
        match self {
            Self::Mask => out
                .iter_mut()
                .zip(rows.band(0))
                .for_each(|(out, value)| *out = mask(*value)),
            Self::NormalizedDifference => out
                .iter_mut()
                .zip(rows.band(0).iter().zip(rows.band(1)))
                .for_each(|(out, (band1, band2))| *out = normalized_difference(*band1, *band2)),
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = BandMathError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mask" => Ok(Self::Mask),
            "norm-diff" | "normalize_difference" => Ok(Self::NormalizedDifference),
            other => Err(BandMathError::UnknownAlgorithm(other.to_string())),
        }
    }
}
