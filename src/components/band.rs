use std::{fmt::Display, str::FromStr};

use num_traits::AsPrimitive;

use crate::{
    components::bounds::PixelWindow,
    errors::{BandMathError, Result},
};

/// Pixel data types a band can be decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PixelType {
    U8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl PixelType {
    /// Bytes per cell.
    pub fn size(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

impl Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::U8 => "Byte",
            Self::U16 => "UInt16",
            Self::I16 => "Int16",
            Self::U32 => "UInt32",
            Self::I32 => "Int32",
            Self::F32 => "Float32",
            Self::F64 => "Float64",
        };
        f.write_str(name)
    }
}

impl FromStr for PixelType {
    type Err = BandMathError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Byte" | "UInt8" => Ok(Self::U8),
            "UInt16" => Ok(Self::U16),
            "Int16" => Ok(Self::I16),
            "UInt32" => Ok(Self::U32),
            "Int32" => Ok(Self::I32),
            "Float32" => Ok(Self::F32),
            "Float64" => Ok(Self::F64),
            other => Err(BandMathError::UnsupportedDataType(other.to_string())),
        }
    }
}

/// What must match between bands read together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandInfo {
    pub data_type: PixelType,
    /// (width, height) of the native storage block.
    pub block_size: (usize, usize),
}

/// Cells of one band window, typed as stored.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! from_ne_bytes {
    ($bytes:expr, $t:ty) => {
        $bytes
            .chunks_exact(std::mem::size_of::<$t>())
            .map(|cell| {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(cell);
                <$t>::from_ne_bytes(raw)
            })
            .collect()
    };
}

fn widen<T: AsPrimitive<f64>>(cells: &[T], out: &mut [f64]) {
    out.iter_mut()
        .zip(cells)
        .for_each(|(cell, value)| *cell = value.as_());
}

impl RasterBuffer {
    /// Decode native endian raw bytes as cells of `data_type`.
    pub fn from_bytes(data_type: PixelType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % data_type.size() != 0 {
            return Err(BandMathError::UnsupportedDataType(format!(
                "{} bytes do not split into {data_type} cells",
                bytes.len()
            )));
        }
        Ok(match data_type {
            PixelType::U8 => Self::U8(bytes.to_vec()),
            PixelType::U16 => Self::U16(from_ne_bytes!(bytes, u16)),
            PixelType::I16 => Self::I16(from_ne_bytes!(bytes, i16)),
            PixelType::U32 => Self::U32(from_ne_bytes!(bytes, u32)),
            PixelType::I32 => Self::I32(from_ne_bytes!(bytes, i32)),
            PixelType::F32 => Self::F32(from_ne_bytes!(bytes, f32)),
            PixelType::F64 => Self::F64(from_ne_bytes!(bytes, f64)),
        })
    }

    pub fn data_type(&self) -> PixelType {
        match self {
            Self::U8(_) => PixelType::U8,
            Self::U16(_) => PixelType::U16,
            Self::I16(_) => PixelType::I16,
            Self::U32(_) => PixelType::U32,
            Self::I32(_) => PixelType::I32,
            Self::F32(_) => PixelType::F32,
            Self::F64(_) => PixelType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::U8(cells) => cells.len(),
            Self::U16(cells) => cells.len(),
            Self::I16(cells) => cells.len(),
            Self::U32(cells) => cells.len(),
            Self::I32(cells) => cells.len(),
            Self::F32(cells) => cells.len(),
            Self::F64(cells) => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen every cell into `out`, no scaling or nodata substitution.
    pub fn decode_into(&self, out: &mut [f64]) {
        match self {
            Self::U8(cells) => widen(cells, out),
            Self::U16(cells) => widen(cells, out),
            Self::I16(cells) => widen(cells, out),
            Self::U32(cells) => widen(cells, out),
            Self::I32(cells) => widen(cells, out),
            Self::F32(cells) => widen(cells, out),
            Self::F64(cells) => widen(cells, out),
        }
    }

    pub fn to_cells(&self) -> Vec<f64> {
        let mut cells = vec![0.; self.len()];
        self.decode_into(&mut cells);
        cells
    }

    /// Copy of the cells inside `window` of a buffer holding a
    /// `raster_width` wide raster.
    pub fn crop(&self, raster_width: usize, window: &PixelWindow) -> Self {
        fn rows<T: Copy>(cells: &[T], raster_width: usize, window: &PixelWindow) -> Vec<T> {
            window
                .rows()
                .flat_map(|row| {
                    let start = row * raster_width + window.x_offset;
                    cells[start..start + window.width].iter().copied()
                })
                .collect()
        }
        match self {
            Self::U8(cells) => Self::U8(rows(cells, raster_width, window)),
            Self::U16(cells) => Self::U16(rows(cells, raster_width, window)),
            Self::I16(cells) => Self::I16(rows(cells, raster_width, window)),
            Self::U32(cells) => Self::U32(rows(cells, raster_width, window)),
            Self::I32(cells) => Self::I32(rows(cells, raster_width, window)),
            Self::F32(cells) => Self::F32(rows(cells, raster_width, window)),
            Self::F64(cells) => Self::F64(rows(cells, raster_width, window)),
        }
    }
}

/// Reads windows of a single band.
///
/// Readers can be moved to worker threads of the fan out read mode.
pub trait BandReader: Send + Sync + std::fmt::Debug {
    fn read_window(&self, window: &PixelWindow) -> Result<RasterBuffer>;
}
