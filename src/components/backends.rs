use std::{fmt::Debug, path::PathBuf, sync::Arc};

use log::{debug, info, warn};

use crate::{
    components::{
        band::{BandInfo, BandReader, PixelType, RasterBuffer},
        bounds::PixelWindow,
        file::{Dataset, DatasetSource},
        transforms::GeoTransform,
    },
    errors::{BandMathError, Result},
};

/// Implementations for gdal
pub mod gdal_backend {
    use super::*;
    use gdal::{
        raster::{GdalDataType, GdalType, RasterBand},
        Dataset as GdalDataset, DatasetOptions, GdalOpenFlags,
    };

    pub(crate) fn pixel_type(data_type: GdalDataType) -> Result<PixelType> {
        match data_type {
            GdalDataType::UInt8 => Ok(PixelType::U8),
            GdalDataType::UInt16 => Ok(PixelType::U16),
            GdalDataType::Int16 => Ok(PixelType::I16),
            GdalDataType::UInt32 => Ok(PixelType::U32),
            GdalDataType::Int32 => Ok(PixelType::I32),
            GdalDataType::Float32 => Ok(PixelType::F32),
            GdalDataType::Float64 => Ok(PixelType::F64),
            other => Err(BandMathError::UnsupportedDataType(format!("{other:?}"))),
        }
    }

    fn read_typed<T: GdalType + Copy>(band: &RasterBand, window: &PixelWindow) -> Result<Vec<T>> {
        let buffer = band.read_as::<T>(
            (window.x_offset as isize, window.y_offset as isize),
            window.shape(),
            window.shape(),
            None,
        )?;
        Ok(buffer.data().to_vec())
    }

    fn read_buffer(band: &RasterBand, window: &PixelWindow) -> Result<RasterBuffer> {
        Ok(match pixel_type(band.band_type())? {
            PixelType::U8 => RasterBuffer::U8(read_typed(band, window)?),
            PixelType::U16 => RasterBuffer::U16(read_typed(band, window)?),
            PixelType::I16 => RasterBuffer::I16(read_typed(band, window)?),
            PixelType::U32 => RasterBuffer::U32(read_typed(band, window)?),
            PixelType::I32 => RasterBuffer::I32(read_typed(band, window)?),
            PixelType::F32 => RasterBuffer::F32(read_typed(band, window)?),
            PixelType::F64 => RasterBuffer::F64(read_typed(band, window)?),
        })
    }

    /// How to (re)open a gdal dataset.
    #[derive(Debug)]
    struct OpenSpec {
        path: String,
        open_options: Vec<String>,
    }

    impl OpenSpec {
        fn open(&self) -> Result<GdalDataset> {
            let open_options: Vec<&str> = self.open_options.iter().map(String::as_str).collect();
            let options = DatasetOptions {
                open_flags: GdalOpenFlags::GDAL_OF_RASTER,
                open_options: (!open_options.is_empty()).then_some(open_options.as_slice()),
                ..Default::default()
            };
            Ok(GdalDataset::open_ex(&self.path, options)?)
        }
    }

    #[derive(Debug)]
    pub struct GdalFile {
        name: String,
        spec: Arc<OpenSpec>,
        dataset: GdalDataset,
    }

    impl GdalFile {
        fn open(name: String, spec: OpenSpec) -> Result<Self> {
            let dataset = spec
                .open()
                .map_err(|err| BandMathError::SourceOpenFailed {
                    source_name: name.clone(),
                    reason: err.to_string(),
                })?;
            info!(
                "opened '{}' ({}x{}, {} bands)",
                name,
                dataset.raster_size().0,
                dataset.raster_size().1,
                dataset.raster_count()
            );
            Ok(Self {
                name,
                spec: Arc::new(spec),
                dataset,
            })
        }
    }

    impl Dataset for GdalFile {
        fn description(&self) -> String {
            self.name.clone()
        }
        fn size(&self) -> (usize, usize) {
            self.dataset.raster_size()
        }
        fn num_bands(&self) -> usize {
            self.dataset.raster_count()
        }
        fn crs(&self) -> String {
            self.dataset.projection()
        }
        fn transform(&self) -> Result<GeoTransform> {
            match self.dataset.geo_transform() {
                Ok(gdal_transform) => GeoTransform::from_gdal(gdal_transform),
                Err(err) => {
                    warn!("'{}' has no geotransform ({err}), using identity", self.name);
                    Ok(GeoTransform::identity())
                }
            }
        }
        fn band_info(&self, band: usize) -> Result<BandInfo> {
            self.check_band(band)?;
            let raster_band = self.dataset.rasterband(band)?;
            Ok(BandInfo {
                data_type: pixel_type(raster_band.band_type())?,
                block_size: raster_band.block_size(),
            })
        }
        fn read_window(&self, band: usize, window: &PixelWindow) -> Result<RasterBuffer> {
            self.check_band(band)?;
            read_buffer(&self.dataset.rasterband(band)?, window)
        }
        fn band_reader(&self, band: usize) -> Result<Arc<dyn BandReader>> {
            self.check_band(band)?;
            Ok(Arc::new(GdalBandReader(Arc::clone(&self.spec), band)))
        }
    }

    /// Opens its own handle on every read, so it can live on any thread.
    #[derive(Debug)]
    struct GdalBandReader(Arc<OpenSpec>, usize);

    impl BandReader for GdalBandReader {
        fn read_window(&self, window: &PixelWindow) -> Result<RasterBuffer> {
            let dataset = self.0.open()?;
            debug!("reading band {} of '{}' at {window}", self.1, self.0.path);
            read_buffer(&dataset.rasterband(self.1)?, window)
        }
    }

    /// Image on local storage, or anything else gdal opens from a path.
    #[derive(Debug, Clone)]
    pub struct LocalImage {
        pub path: PathBuf,
    }

    impl LocalImage {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }
    }

    impl DatasetSource for LocalImage {
        /// File stem of the image.
        fn name(&self) -> String {
            self.path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
        }

        fn open(&self) -> Result<Box<dyn Dataset>> {
            let spec = OpenSpec {
                path: self.path.to_string_lossy().into_owned(),
                open_options: Vec::new(),
            };
            Ok(Box::new(GdalFile::open(self.name(), spec)?))
        }
    }

    /// Scene served by the Planet Labs API through gdal's `PLScenes` driver.
    #[derive(Clone, serde::Serialize, serde::Deserialize)]
    pub struct PlanetScene {
        pub scene: String,
        pub product_type: String,
        pub api_key: Option<String>,
    }

    impl Debug for PlanetScene {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("PlanetScene")
                .field("scene", &self.scene)
                .field("product_type", &self.product_type)
                .field("api_key", &self.api_key.as_ref().map(|_| "***"))
                .finish()
        }
    }

    impl DatasetSource for PlanetScene {
        fn name(&self) -> String {
            self.scene.clone()
        }

        fn open(&self) -> Result<Box<dyn Dataset>> {
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| BandMathError::SourceOpenFailed {
                    source_name: self.name(),
                    reason: "API key for Planet Labs is not defined".to_string(),
                })?;
            let spec = OpenSpec {
                path: "PLScenes:".to_string(),
                open_options: vec![
                    "VERSION=V0".to_string(),
                    format!("API_KEY={api_key}"),
                    format!("SCENE={}", self.scene),
                    format!("PRODUCT_TYPE={}", self.product_type),
                ],
            };
            Ok(Box::new(GdalFile::open(self.name(), spec)?))
        }
    }
}

/// Pure in memory datasets.
pub mod memory {
    use super::*;

    #[derive(Debug, Clone)]
    struct MemoryBand {
        cells: Arc<RasterBuffer>,
        block_size: (usize, usize),
    }

    /// Dataset held in memory, band by band.
    ///
    /// New bands default to one row high blocks, like gdal's `MEM` driver.
    #[derive(Debug, Clone)]
    pub struct MemoryDataset {
        description: String,
        size: (usize, usize),
        transform: GeoTransform,
        crs: String,
        bands: Vec<MemoryBand>,
    }

    impl MemoryDataset {
        pub fn new(description: impl Into<String>, size: (usize, usize)) -> Self {
            Self {
                description: description.into(),
                size,
                transform: GeoTransform::identity(),
                crs: String::new(),
                bands: Vec::new(),
            }
        }

        pub fn with_transform(mut self, transform: GeoTransform) -> Self {
            self.transform = transform;
            self
        }

        pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
            self.crs = crs.into();
            self
        }

        pub fn with_band(self, cells: RasterBuffer) -> Result<Self> {
            let block_size = (self.size.0, 1);
            self.with_blocked_band(cells, block_size)
        }

        /// Band from native endian raw bytes.
        pub fn with_band_bytes(self, data_type: PixelType, bytes: &[u8]) -> Result<Self> {
            self.with_band(RasterBuffer::from_bytes(data_type, bytes)?)
        }

        pub fn with_blocked_band(
            mut self,
            cells: RasterBuffer,
            block_size: (usize, usize),
        ) -> Result<Self> {
            let expected = self.size.0 * self.size.1;
            if cells.len() != expected {
                return Err(BandMathError::SourceOpenFailed {
                    source_name: self.description,
                    reason: format!(
                        "band {} has {} cells, expected {expected}",
                        self.bands.len() + 1,
                        cells.len()
                    ),
                });
            }
            self.bands.push(MemoryBand {
                cells: Arc::new(cells),
                block_size,
            });
            Ok(self)
        }

        fn band(&self, band: usize) -> Result<&MemoryBand> {
            self.check_band(band)?;
            Ok(&self.bands[band - 1])
        }
    }

    #[derive(Debug)]
    struct MemoryBandReader {
        band: MemoryBand,
        size: (usize, usize),
    }

    fn crop(cells: &RasterBuffer, size: (usize, usize), window: &PixelWindow) -> Result<RasterBuffer> {
        if !window.fits(size) {
            return Err(BandMathError::InvalidSubset(format!(
                "window {window} is outside image of {}x{}",
                size.0, size.1
            )));
        }
        Ok(cells.crop(size.0, window))
    }

    impl BandReader for MemoryBandReader {
        fn read_window(&self, window: &PixelWindow) -> Result<RasterBuffer> {
            crop(&self.band.cells, self.size, window)
        }
    }

    impl Dataset for MemoryDataset {
        fn description(&self) -> String {
            self.description.clone()
        }
        fn size(&self) -> (usize, usize) {
            self.size
        }
        fn num_bands(&self) -> usize {
            self.bands.len()
        }
        fn crs(&self) -> String {
            self.crs.clone()
        }
        fn transform(&self) -> Result<GeoTransform> {
            Ok(self.transform)
        }
        fn band_info(&self, band: usize) -> Result<BandInfo> {
            let band = self.band(band)?;
            Ok(BandInfo {
                data_type: band.cells.data_type(),
                block_size: band.block_size,
            })
        }
        fn read_window(&self, band: usize, window: &PixelWindow) -> Result<RasterBuffer> {
            crop(&self.band(band)?.cells, self.size, window)
        }
        fn band_reader(&self, band: usize) -> Result<Arc<dyn BandReader>> {
            Ok(Arc::new(MemoryBandReader {
                band: self.band(band)?.clone(),
                size: self.size,
            }))
        }
    }

    impl DatasetSource for MemoryDataset {
        fn name(&self) -> String {
            self.description.clone()
        }

        fn open(&self) -> Result<Box<dyn Dataset>> {
            Ok(Box::new(self.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{gdal_backend::LocalImage, memory::MemoryDataset, *};
    use crate::testing::write_geotiff;
    use rstest::rstest;

    #[rstest]
    fn memory_band_reads_window() {
        let dataset = MemoryDataset::new("mem", (3, 2))
            .with_band(RasterBuffer::I16(vec![1, -2, 3, -4, 5, -6]))
            .unwrap();
        let window = PixelWindow::new(1, 0, 2, 2);
        assert_eq!(
            dataset.read_window(1, &window).unwrap(),
            RasterBuffer::I16(vec![-2, 3, 5, -6])
        );
        let reader = dataset.band_reader(1).unwrap();
        assert_eq!(
            reader.read_window(&window.row(1)).unwrap(),
            RasterBuffer::I16(vec![5, -6])
        );
        assert_eq!(
            dataset.band_info(1).unwrap(),
            BandInfo {
                data_type: PixelType::I16,
                block_size: (3, 1)
            }
        );
    }

    #[rstest]
    #[case(0)]
    #[case(2)]
    fn memory_band_out_of_range(#[case] band: usize) {
        let dataset = MemoryDataset::new("mem", (1, 1))
            .with_band(RasterBuffer::U8(vec![1]))
            .unwrap();
        assert!(matches!(
            dataset.band_info(band),
            Err(BandMathError::BandOutOfRange { total: 1, .. })
        ));
    }

    #[rstest]
    fn memory_band_from_bytes() {
        let bytes: Vec<u8> = [10u16, 20, 30, 40]
            .iter()
            .flat_map(|value| value.to_ne_bytes())
            .collect();
        let dataset = MemoryDataset::new("mem", (2, 2))
            .with_band_bytes(PixelType::U16, &bytes)
            .unwrap();
        assert_eq!(
            dataset
                .read_window(1, &PixelWindow::full((2, 2)))
                .unwrap()
                .to_cells(),
            vec![10., 20., 30., 40.]
        );
        assert!(MemoryDataset::new("mem", (2, 2))
            .with_band_bytes(PixelType::U16, &bytes[..4])
            .is_err());
    }

    #[rstest]
    fn local_image_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.tif");
        let transform = [500_000., 10., 0., 4_600_000., 0., -10.];
        write_geotiff::<u16>(&path, (4, 3), transform, vec![(0..12).collect(), vec![7; 12]]);

        let source = LocalImage::new(&path);
        assert_eq!(source.name(), "scene");
        let dataset = source.open().unwrap();
        let metadata = dataset.metadata().unwrap();
        assert_eq!(metadata.size(), (4, 3));
        assert_eq!(metadata.num_bands, 2);
        assert_eq!(metadata.transform.to_gdal(), transform);
        assert!(!metadata.crs.is_empty());
        assert_eq!(dataset.band_info(2).unwrap().data_type, PixelType::U16);

        let window = PixelWindow::new(1, 1, 2, 2);
        assert_eq!(
            dataset.read_window(1, &window).unwrap(),
            RasterBuffer::U16(vec![5, 6, 9, 10])
        );
        let reader = dataset.band_reader(1).unwrap();
        assert_eq!(
            reader.read_window(&window).unwrap(),
            dataset.read_window(1, &window).unwrap()
        );
    }

    #[rstest]
    fn missing_local_image() {
        let err = LocalImage::new("/nonexistent/scene.tif").open().unwrap_err();
        assert!(matches!(err, BandMathError::SourceOpenFailed { .. }));
    }

    #[rstest]
    fn planet_scene_needs_key() {
        let source = gdal_backend::PlanetScene {
            scene: "20160421_110213_0c53".to_string(),
            product_type: "analytic".to_string(),
            api_key: None,
        };
        let err = source.open().unwrap_err();
        assert!(err.to_string().contains("API key"), "{err}");
    }
}
