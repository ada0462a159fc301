use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use gdal::{
    raster::{Buffer, GdalType},
    Dataset as GdalDataset, DriverManager,
};
use log::{debug, info};
use num_traits::AsPrimitive;

use crate::{
    algorithms::Algorithm,
    components::{band::PixelType, bounds::PixelWindow, metadata::RasterMetadata},
    errors::{BandMathError, Result},
    indexes::Indexes,
};

/// `{image}{_subset}_{algorithm}_{B1-B2}_work{id}.tif`
pub fn output_name(
    image: &str,
    subset: bool,
    algorithm: Algorithm,
    bands: &Indexes,
    worker_id: u32,
) -> String {
    let subset = if subset { "_subset" } else { "" };
    format!(
        "{image}{subset}_{}_{}_work{worker_id}.tif",
        algorithm.name(),
        bands.label()
    )
}

/// Sidecar gdal writes next to an image, `image.tif.aux.xml`.
pub fn aux_path(path: &Path) -> PathBuf {
    let mut aux = OsString::from(path.as_os_str());
    aux.push(".aux.xml");
    PathBuf::from(aux)
}

fn remove_previous(path: &Path) -> Result<()> {
    for file in [path.to_path_buf(), aux_path(path)] {
        if file.exists() {
            debug!("removing previous {}", file.display());
            fs::remove_file(&file).map_err(|err| BandMathError::OutputCreationFailed {
                path: file.display().to_string(),
                reason: err.to_string(),
            })?;
        }
    }
    Ok(())
}

/// Single owner of the output image, filled one window row at a time.
#[derive(Debug)]
pub struct OutputRasterWriter {
    path: PathBuf,
    dataset: GdalDataset,
    data_type: PixelType,
    size: (usize, usize),
    bands: usize,
    rows_written: usize,
}

impl OutputRasterWriter {
    /// Replace whatever is at `path` with an image holding `window` of
    /// the input, georeferenced like it.
    pub fn create(
        path: impl Into<PathBuf>,
        driver: &str,
        algorithm: Algorithm,
        metadata: &RasterMetadata,
        window: &PixelWindow,
    ) -> Result<Self> {
        let path = path.into();
        remove_previous(&path)?;
        let data_type = algorithm.data_type();
        let bands = algorithm.bands_out();
        let creation_failed = |err: gdal::errors::GdalError| BandMathError::OutputCreationFailed {
            path: path.display().to_string(),
            reason: err.to_string(),
        };
        let driver = DriverManager::get_driver_by_name(driver).map_err(creation_failed)?;
        let (width, height) = window.shape();
        let mut dataset = match data_type {
            PixelType::U8 => driver.create_with_band_type::<u8, _>(&path, width, height, bands),
            PixelType::U16 => driver.create_with_band_type::<u16, _>(&path, width, height, bands),
            PixelType::I16 => driver.create_with_band_type::<i16, _>(&path, width, height, bands),
            PixelType::U32 => driver.create_with_band_type::<u32, _>(&path, width, height, bands),
            PixelType::I32 => driver.create_with_band_type::<i32, _>(&path, width, height, bands),
            PixelType::F32 => driver.create_with_band_type::<f32, _>(&path, width, height, bands),
            PixelType::F64 => driver.create_with_band_type::<f64, _>(&path, width, height, bands),
        }
        .map_err(creation_failed)?;
        dataset
            .set_geo_transform(&metadata.transform.for_window(window).to_gdal())
            .map_err(creation_failed)?;
        if !metadata.crs.is_empty() {
            dataset
                .set_projection(&metadata.crs)
                .map_err(creation_failed)?;
        }
        info!(
            "created {} ({width}x{height}, {bands} x {data_type})",
            path.display()
        );
        Ok(Self {
            path,
            dataset,
            data_type,
            size: (width, height),
            bands,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    fn write_typed<T>(&self, row: usize, values: &[f64]) -> Result<()>
    where
        T: GdalType + Copy + 'static,
        f64: AsPrimitive<T>,
    {
        let width = self.size.0;
        let cells: Vec<T> = values.iter().map(|value| value.as_()).collect();
        for band in 1..=self.bands {
            let mut buffer = Buffer::new((width, 1), cells.clone());
            self.dataset
                .rasterband(band)?
                .write((0, row as isize), (width, 1), &mut buffer)?;
        }
        Ok(())
    }

    /// Write the output values of window row `row` (0 is the window's top).
    pub fn write_row(&mut self, row: usize, values: &[f64]) -> Result<()> {
        let (width, height) = self.size;
        if values.len() != width || row >= height {
            return Err(BandMathError::InvalidSubset(format!(
                "row {row} of {} values does not fit output of {width}x{height}",
                values.len()
            )));
        }
        match self.data_type {
            PixelType::U8 => self.write_typed::<u8>(row, values),
            PixelType::U16 => self.write_typed::<u16>(row, values),
            PixelType::I16 => self.write_typed::<i16>(row, values),
            PixelType::U32 => self.write_typed::<u32>(row, values),
            PixelType::I32 => self.write_typed::<i32>(row, values),
            PixelType::F32 => self.write_typed::<f32>(row, values),
            PixelType::F64 => self.write_typed::<f64>(row, values),
        }?;
        self.rows_written += 1;
        Ok(())
    }

    /// Mark 0 as nodata on every band, flush and close.
    pub fn finish(mut self) -> Result<PathBuf> {
        for band in 1..=self.bands {
            self.dataset.rasterband(band)?.set_no_data_value(Some(0.))?;
        }
        self.dataset.flush_cache()?;
        info!(
            "finished {} after {} rows",
            self.path.display(),
            self.rows_written
        );
        Ok(self.path)
    }
}
