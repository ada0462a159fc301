use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{info, warn};

use crate::{
    components::{
        bounds::PixelWindow,
        file::Dataset,
        reader::{check_compatible, WindowedValueStream},
        subset::{GeoEngine, SubsetResolver},
        writer::{output_name, OutputRasterWriter},
    },
    config::{JobConfig, RunConfig, Subset},
    errors::{BandMathError, Result},
};

/// Stop request shared between a run and whoever may cancel it.
///
/// Polled by the run after every written row.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Configured,
    SubsetResolved,
    Validated,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// What a run that did not fail produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub path: PathBuf,
    pub window: PixelWindow,
    pub rows_written: usize,
    pub elapsed: Duration,
}

/// One input raster to one output raster.
///
/// Moves through `Configured -> SubsetResolved -> Validated -> Running`
/// and ends `Completed`, `Cancelled` or `Failed`. Every check happens
/// before the output file is touched.
#[derive(Debug)]
pub struct ProcessingPipeline {
    dataset: Box<dyn Dataset>,
    job: JobConfig,
    cancellation: CancellationFlag,
    resolver: SubsetResolver<GeoEngine>,
    state: RunState,
    window: Option<PixelWindow>,
}

impl ProcessingPipeline {
    pub fn new(dataset: Box<dyn Dataset>, job: JobConfig, cancellation: CancellationFlag) -> Self {
        Self {
            dataset,
            job,
            cancellation,
            resolver: SubsetResolver::default(),
            state: RunState::Configured,
            window: None,
        }
    }

    /// Open the configured source and set up a run over it.
    ///
    /// A region subset whose polygon does not parse fails before the
    /// source is opened.
    pub fn open(config: RunConfig, cancellation: CancellationFlag) -> Result<Self> {
        if let Some(Subset::Region { wkt, crs }) = &config.job.subset {
            SubsetResolver::<GeoEngine>::default().check_query(wkt, crs)?;
        }
        let dataset = config.source.source().open()?;
        Ok(Self::new(dataset, config.job, cancellation))
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn window(&self) -> Option<PixelWindow> {
        self.window
    }

    pub fn dataset(&self) -> &dyn Dataset {
        self.dataset.as_ref()
    }

    fn fail<T>(&mut self, err: BandMathError) -> Result<T> {
        warn!("run on {} failed: {err}", self.dataset.description());
        self.state = RunState::Failed;
        Err(err)
    }

    fn subset_window(&self) -> Result<PixelWindow> {
        let metadata = self.dataset.metadata()?;
        match &self.job.subset {
            None => Ok(metadata.full_window()),
            Some(Subset::Region { wkt, crs }) => self.resolver.resolve(&metadata, wkt, crs),
            Some(Subset::Pixels(corners)) => corners.to_window(metadata.size()),
        }
    }

    /// Window to process, the whole image unless a subset was asked for.
    pub fn resolve(&mut self) -> Result<PixelWindow> {
        match (self.state, self.window) {
            (RunState::Configured, _) => {}
            (state, _) if state.is_finished() => return Err(BandMathError::RunFinished(state)),
            (_, Some(window)) => return Ok(window),
            (state, None) => return Err(BandMathError::RunFinished(state)),
        }
        match self.subset_window() {
            Ok(window) => {
                self.window = Some(window);
                self.state = RunState::SubsetResolved;
                Ok(window)
            }
            Err(err) => self.fail(err),
        }
    }

    fn check_bands(&self) -> Result<()> {
        let algorithm = self.job.algorithm;
        let bands = &self.job.bands;
        if bands.len() != algorithm.bands_read() {
            return Err(BandMathError::BandCountMismatch {
                algorithm: algorithm.name(),
                expected: algorithm.bands_read(),
                got: bands.len(),
            });
        }
        check_compatible(self.dataset.as_ref(), bands).map(|_| ())
    }

    /// Band numbers exist, match the algorithm and are compatible.
    pub fn validate(&mut self) -> Result<PixelWindow> {
        let window = self.resolve()?;
        if self.state != RunState::SubsetResolved {
            return Ok(window);
        }
        match self.check_bands() {
            Ok(()) => {
                self.state = RunState::Validated;
                Ok(window)
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        let job = &self.job;
        self.job.output_dir.join(output_name(
            &self.dataset.description(),
            job.subset.is_some(),
            job.algorithm,
            &job.bands,
            job.worker_id,
        ))
    }

    fn stream(&self, window: PixelWindow, path: PathBuf) -> Result<RunOutcome> {
        let start = Instant::now();
        let algorithm = self.job.algorithm;
        let metadata = self.dataset.metadata()?;
        let mut writer =
            OutputRasterWriter::create(path, &self.job.driver, algorithm, &metadata, &window)?;
        let mut rows = WindowedValueStream::new(
            self.dataset.as_ref(),
            self.job.bands.clone(),
            window,
            self.job.read_mode,
        )?;
        let mut output = vec![0.; window.width];
        let mut status = RunStatus::Completed;
        let mut row = 0;
        while let Some(values) = rows.next_row() {
            algorithm.compute_row(&values?, &mut output);
            writer.write_row(row, &output)?;
            row += 1;
            if self.cancellation.is_cancelled() {
                warn!("cancelled after {row} of {} rows", window.height);
                status = RunStatus::Cancelled;
                break;
            }
        }
        let rows_written = writer.rows_written();
        let path = writer.finish()?;
        Ok(RunOutcome {
            status,
            path,
            window,
            rows_written,
            elapsed: start.elapsed(),
        })
    }

    /// Resolve and validate if not done yet, then compute and write
    /// every row of the window.
    pub fn run(&mut self) -> Result<RunOutcome> {
        let window = self.validate()?;
        let path = self.output_path();
        self.state = RunState::Running;
        info!(
            "running {} on bands {} of {}, window {window}",
            self.job.algorithm,
            self.job.bands.label(),
            self.dataset.description()
        );
        match self.stream(window, path) {
            Ok(outcome) => {
                self.state = match outcome.status {
                    RunStatus::Completed => RunState::Completed,
                    RunStatus::Cancelled => RunState::Cancelled,
                };
                info!(
                    "{:?} {} with {} rows in {:?}",
                    outcome.status,
                    outcome.path.display(),
                    outcome.rows_written,
                    outcome.elapsed
                );
                Ok(outcome)
            }
            Err(err) => self.fail(err),
        }
    }

    /// Open, resolve, validate and run in one go.
    pub fn execute(config: RunConfig, cancellation: CancellationFlag) -> Result<RunOutcome> {
        Self::open(config, cancellation)?.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithms::Algorithm,
        components::{
            backends::memory::MemoryDataset,
            band::{BandInfo, BandReader, RasterBuffer},
            bounds::PixelCorners,
            transforms::GeoTransform,
        },
        config::{ReadMode, SourceConfig},
        errors::ErrorKind,
        testing::utm_wkt,
    };
    use gdal::Dataset as GdalDataset;
    use rstest::rstest;
    use std::{path::Path, sync::Arc};

    const TRANSFORM: [f64; 6] = [500_000., 10., 0., 4_600_000., 0., -10.];

    fn scene(size: (usize, usize), bands: Vec<RasterBuffer>) -> MemoryDataset {
        bands.into_iter().fold(
            MemoryDataset::new("scene", size)
                .with_transform(GeoTransform::from_gdal(TRANSFORM).unwrap())
                .with_crs(utm_wkt()),
            |dataset, band| dataset.with_band(band).unwrap(),
        )
    }

    fn read_output<T: gdal::raster::GdalType + Copy>(path: &Path) -> (GdalDataset, Vec<T>) {
        let output = GdalDataset::open(path).unwrap();
        let size = output.raster_size();
        let cells = output
            .rasterband(1)
            .unwrap()
            .read_as::<T>((0, 0), size, size, None)
            .unwrap()
            .data()
            .to_vec();
        (output, cells)
    }

    fn output_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[rstest]
    #[test_log::test]
    fn mask_of_positive_image() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = scene((100, 100), vec![RasterBuffer::U16((1..=10_000).collect())]);
        let job = JobConfig::new(Algorithm::Mask, [1]).with_output_dir(dir.path());
        let mut pipeline =
            ProcessingPipeline::new(Box::new(dataset), job, CancellationFlag::new());
        let outcome = pipeline.run().unwrap();

        assert_eq!(pipeline.state(), RunState::Completed);
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.rows_written, 100);
        assert_eq!(outcome.window, PixelWindow::full((100, 100)));
        assert_eq!(outcome.path, dir.path().join("scene_mask_B1_work0.tif"));

        let (output, cells) = read_output::<u8>(&outcome.path);
        assert_eq!(output.raster_size(), (100, 100));
        assert_eq!(output.geo_transform().unwrap(), TRANSFORM);
        assert_eq!(
            output.rasterband(1).unwrap().band_type(),
            gdal::raster::GdalDataType::UInt8
        );
        assert!(cells.iter().all(|cell| *cell == 255));
    }

    #[rstest]
    #[case(ReadMode::Sequential)]
    #[case(ReadMode::Parallel { threads: 3, batch_rows: 4 })]
    #[test_log::test]
    fn normalized_difference_of_equal_bands(#[case] read_mode: ReadMode) {
        let dir = tempfile::tempdir().unwrap();
        let band: Vec<i16> = (0..60).map(|value| value - 30).collect();
        let dataset = scene(
            (10, 6),
            vec![RasterBuffer::I16(band.clone()), RasterBuffer::I16(band)],
        );
        let job = JobConfig::new(Algorithm::NormalizedDifference, [1, 2])
            .with_output_dir(dir.path())
            .with_worker_id(7)
            .with_read_mode(read_mode);
        let outcome = ProcessingPipeline::new(Box::new(dataset), job, CancellationFlag::new())
            .run()
            .unwrap();

        assert_eq!(outcome.path, dir.path().join("scene_norm-diff_B1-B2_work7.tif"));
        let (_, cells) = read_output::<f32>(&outcome.path);
        assert_eq!(cells.len(), 60);
        assert!(cells.iter().all(|cell| *cell == 0.));
    }

    #[rstest]
    #[test_log::test]
    fn parallel_output_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = scene(
            (7, 9),
            vec![
                RasterBuffer::F64((0..63).map(|value| value as f64 * 1.5).collect()),
                RasterBuffer::F64((0..63).map(|value| 40. - value as f64).collect()),
            ],
        );
        let run = |read_mode, worker_id| {
            let job = JobConfig::new(Algorithm::NormalizedDifference, [2, 1])
                .with_output_dir(dir.path())
                .with_worker_id(worker_id)
                .with_read_mode(read_mode);
            let outcome =
                ProcessingPipeline::new(Box::new(dataset.clone()), job, CancellationFlag::new())
                    .run()
                    .unwrap();
            read_output::<f32>(&outcome.path).1
        };
        assert_eq!(
            run(ReadMode::Parallel { threads: 2, batch_rows: 2 }, 1),
            run(ReadMode::Sequential, 0)
        );
    }

    /// Cancels its run once `row` has been read.
    #[derive(Debug)]
    struct CancelAtRow {
        inner: MemoryDataset,
        row: usize,
        cancellation: CancellationFlag,
    }

    impl Dataset for CancelAtRow {
        fn description(&self) -> String {
            self.inner.description()
        }
        fn size(&self) -> (usize, usize) {
            self.inner.size()
        }
        fn num_bands(&self) -> usize {
            self.inner.num_bands()
        }
        fn crs(&self) -> String {
            self.inner.crs()
        }
        fn transform(&self) -> Result<GeoTransform> {
            self.inner.transform()
        }
        fn band_info(&self, band: usize) -> Result<BandInfo> {
            self.inner.band_info(band)
        }
        fn read_window(&self, band: usize, window: &PixelWindow) -> Result<RasterBuffer> {
            if window.y_offset == self.row {
                self.cancellation.cancel();
            }
            self.inner.read_window(band, window)
        }
        fn band_reader(&self, band: usize) -> Result<Arc<dyn BandReader>> {
            self.inner.band_reader(band)
        }
    }

    #[rstest]
    #[test_log::test]
    fn cancellation_keeps_written_rows() {
        let dir = tempfile::tempdir().unwrap();
        let cancellation = CancellationFlag::new();
        let dataset = CancelAtRow {
            inner: scene((5, 10), vec![RasterBuffer::U8(vec![7; 50])]),
            row: 3,
            cancellation: cancellation.clone(),
        };
        let job = JobConfig::new(Algorithm::Mask, [1]).with_output_dir(dir.path());
        let mut pipeline = ProcessingPipeline::new(Box::new(dataset), job, cancellation);
        let outcome = pipeline.run().unwrap();

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(pipeline.state(), RunState::Cancelled);
        assert_eq!(outcome.rows_written, 4);
        let (output, cells) = read_output::<u8>(&outcome.path);
        assert_eq!(output.raster_size(), (5, 10));
        assert!(cells[..20].iter().all(|cell| *cell == 255));
        assert!(cells[20..].iter().all(|cell| *cell == 0));
        assert!(matches!(
            pipeline.run(),
            Err(BandMathError::RunFinished(RunState::Cancelled))
        ));
    }

    #[rstest]
    #[case(Algorithm::Mask, vec![3], ErrorKind::BandOutOfRange)]
    #[case(Algorithm::Mask, vec![1, 2], ErrorKind::BandCountMismatch)]
    #[case(Algorithm::NormalizedDifference, vec![1, 2], ErrorKind::IncompatibleBands)]
    #[case(Algorithm::NormalizedDifference, vec![0, 1], ErrorKind::BandOutOfRange)]
    #[test_log::test]
    fn invalid_bands_create_no_output(
        #[case] algorithm: Algorithm,
        #[case] bands: Vec<usize>,
        #[case] kind: ErrorKind,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let dataset = scene(
            (4, 4),
            vec![RasterBuffer::U8(vec![1; 16]), RasterBuffer::U16(vec![1; 16])],
        );
        let job = JobConfig::new(algorithm, bands).with_output_dir(dir.path());
        let mut pipeline =
            ProcessingPipeline::new(Box::new(dataset), job, CancellationFlag::new());
        let err = pipeline.run().unwrap_err();
        assert_eq!(err.kind(), kind);
        assert_eq!(pipeline.state(), RunState::Failed);
        assert_eq!(output_files(dir.path()), 0);
    }

    #[rstest]
    #[test_log::test]
    fn pixel_subset_shifts_origin() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = scene((8, 8), vec![RasterBuffer::U8((0..64).collect())]);
        let corners: PixelCorners = "2,3,6,8".parse().unwrap();
        let job = JobConfig::new(Algorithm::Mask, [1])
            .with_output_dir(dir.path())
            .with_subset(Subset::Pixels(corners));
        let mut pipeline =
            ProcessingPipeline::new(Box::new(dataset), job, CancellationFlag::new());
        assert_eq!(pipeline.resolve().unwrap(), PixelWindow::new(2, 3, 4, 5));
        assert_eq!(pipeline.state(), RunState::SubsetResolved);
        pipeline.validate().unwrap();
        assert_eq!(pipeline.state(), RunState::Validated);
        let outcome = pipeline.run().unwrap();

        assert_eq!(outcome.path, dir.path().join("scene_subset_mask_B1_work0.tif"));
        let (output, cells) = read_output::<u8>(&outcome.path);
        assert_eq!(output.raster_size(), (4, 5));
        assert_eq!(
            output.geo_transform().unwrap(),
            [500_020., 10., 0., 4_599_970., 0., -10.]
        );
        assert_eq!(cells.len(), 20);
        assert!(cells.iter().all(|cell| *cell == 255));
    }

    #[rstest]
    #[test_log::test]
    fn region_subset() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = scene((8, 8), vec![RasterBuffer::U8(vec![0; 64])]);
        let wkt = "POLYGON ((500015 4599925, 500055 4599925, 500055 4599985, 500015 4599985, 500015 4599925))";
        let job = JobConfig::new(Algorithm::Mask, [1])
            .with_output_dir(dir.path())
            .with_subset(Subset::Region {
                wkt: wkt.to_string(),
                crs: utm_wkt(),
            });
        let outcome = ProcessingPipeline::new(Box::new(dataset), job, CancellationFlag::new())
            .run()
            .unwrap();
        assert_eq!(outcome.window, PixelWindow::new(2, 2, 4, 6));
        let (_, cells) = read_output::<u8>(&outcome.path);
        assert!(cells.iter().all(|cell| *cell == 0));
    }

    #[rstest]
    #[case(Subset::region("POLYGON ((14 41, 16 41, 16 42, 14 41))"), String::new(), ErrorKind::MissingSpatialReference)]
    #[case(Subset::region("POLYGON ((14 41, 16"), utm_wkt(), ErrorKind::InvalidGeometry)]
    #[case(Subset::Pixels(PixelCorners { x_ul: 2, y_ul: 0, x_br: 9, y_br: 4 }), utm_wkt(), ErrorKind::InvalidSubset)]
    #[test_log::test]
    fn subset_failures_create_no_output(
        #[case] subset: Subset,
        #[case] crs: String,
        #[case] kind: ErrorKind,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let dataset = scene((8, 8), vec![RasterBuffer::U8(vec![1; 64])]).with_crs(crs);
        let job = JobConfig::new(Algorithm::Mask, [1])
            .with_output_dir(dir.path())
            .with_subset(subset);
        let mut pipeline =
            ProcessingPipeline::new(Box::new(dataset), job, CancellationFlag::new());
        assert_eq!(pipeline.run().unwrap_err().kind(), kind);
        assert_eq!(pipeline.state(), RunState::Failed);
        assert_eq!(output_files(dir.path()), 0);
    }

    #[rstest]
    #[test_log::test]
    fn malformed_region_fails_before_source_is_opened() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            source: SourceConfig::Local {
                path: dir.path().join("missing.tif"),
            },
            job: JobConfig::new(Algorithm::Mask, [1])
                .with_output_dir(dir.path())
                .with_subset(Subset::region("POLYGON ((14 41, 16")),
        };
        let err = ProcessingPipeline::execute(config, CancellationFlag::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGeometry);
        assert_eq!(output_files(dir.path()), 0);
    }
}
