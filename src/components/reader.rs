use std::{
    collections::{BTreeMap, VecDeque},
    fmt::Debug,
    sync::Arc,
};

use log::{debug, info};
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};

use crate::{
    buffer::BandRows,
    components::{
        band::{BandInfo, BandReader, RasterBuffer},
        bounds::PixelWindow,
        file::Dataset,
    },
    config::ReadMode,
    errors::{BandMathError, Result},
    indexes::Indexes,
};

/// Every band must share data type and block size with the first one.
pub fn check_compatible(dataset: &dyn Dataset, bands: &Indexes) -> Result<BandInfo> {
    bands.check(dataset.num_bands())?;
    let infos = bands
        .as_slice()
        .iter()
        .map(|band| dataset.band_info(*band))
        .collect::<Result<Vec<_>>>()?;
    let (first, rest) = infos.split_first().ok_or_else(|| {
        BandMathError::InvalidBandIndexes("no band selected".to_string())
    })?;
    let mismatch = |property| BandMathError::IncompatibleBands {
        image: dataset.description(),
        bands: bands.as_slice().to_vec(),
        property,
    };
    if rest.iter().any(|info| info.data_type != first.data_type) {
        return Err(mismatch("data type"));
    }
    if rest.iter().any(|info| info.block_size != first.block_size) {
        return Err(mismatch("block size"));
    }
    Ok(*first)
}

struct ParallelRows {
    pool: ThreadPool,
    readers: Vec<Arc<dyn BandReader>>,
    batch_rows: usize,
    ready: VecDeque<BandRows>,
}

impl Debug for ParallelRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelRows")
            .field("threads", &self.pool.current_num_threads())
            .field("batch_rows", &self.batch_rows)
            .field("ready", &self.ready.len())
            .finish()
    }
}

impl ParallelRows {
    fn new(
        dataset: &dyn Dataset,
        bands: &Indexes,
        threads: usize,
        batch_rows: usize,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("band-reader-{index}"))
            .build()?;
        let readers = bands
            .as_slice()
            .iter()
            .map(|band| dataset.band_reader(*band))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            pool,
            readers,
            batch_rows: batch_rows.max(1),
            ready: VecDeque::new(),
        })
    }

    /// Read `rows` of every band concurrently, then put them back in
    /// row order.
    fn fill(&mut self, window: &PixelWindow, rows: std::ops::Range<usize>) -> Result<()> {
        let readers = &self.readers;
        let tasks: Vec<(usize, usize)> = rows
            .clone()
            .flat_map(|row| (0..readers.len()).map(move |band| (row, band)))
            .collect();
        debug!("reading {} row/band pairs of rows {rows:?}", tasks.len());
        let mut read: BTreeMap<(usize, usize), RasterBuffer> = self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(|(row, band)| {
                    readers[band]
                        .read_window(&window.row(row))
                        .map(|buffer| ((row, band), buffer))
                })
                .collect::<Result<_>>()
        })?;
        let assembled = assemble_rows(&mut read, rows, readers.len(), window.width)?;
        self.ready.extend(assembled);
        Ok(())
    }
}

/// Rows of `(row, band)` keyed reads, in row order. Every pair must be
/// present.
fn assemble_rows(
    read: &mut BTreeMap<(usize, usize), RasterBuffer>,
    rows: std::ops::Range<usize>,
    num_bands: usize,
    width: usize,
) -> Result<Vec<BandRows>> {
    rows.map(|row| {
        let mut values = BandRows::new_zeroed([num_bands, width]);
        for band in 0..num_bands {
            let buffer = read
                .remove(&(row, band))
                .ok_or(BandMathError::RowNotRead { row, band })?;
            buffer.decode_into(values.band_mut(band));
        }
        Ok(values)
    })
    .collect()
}

#[derive(Debug)]
enum RowSource {
    Sequential,
    Parallel(ParallelRows),
}

/// Row by row values of some bands of a dataset, inside a window.
///
/// Yields `window.height` [BandRows] of `window.width` cells, top to
/// bottom. The stream holds its read position, build a new one to read
/// again.
#[derive(Debug)]
pub struct WindowedValueStream<'a> {
    dataset: &'a dyn Dataset,
    bands: Indexes,
    window: PixelWindow,
    next_row: usize,
    source: RowSource,
}

impl<'a> WindowedValueStream<'a> {
    /// Fails before any read if a band is out of range, bands differ in
    /// data type or block size, or the window does not fit the dataset.
    pub fn new(
        dataset: &'a dyn Dataset,
        bands: Indexes,
        window: PixelWindow,
        mode: ReadMode,
    ) -> Result<Self> {
        let info = check_compatible(dataset, &bands)?;
        if !window.fits(dataset.size()) {
            let (width, height) = dataset.size();
            return Err(BandMathError::InvalidSubset(format!(
                "window {window} does not fit image of {width}x{height}"
            )));
        }
        let source = match mode {
            ReadMode::Sequential => RowSource::Sequential,
            ReadMode::Parallel {
                threads,
                batch_rows,
            } => RowSource::Parallel(ParallelRows::new(dataset, &bands, threads, batch_rows)?),
        };
        info!(
            "streaming bands {} of {} ({}) in {window}, {mode:?}",
            bands.label(),
            dataset.description(),
            info.data_type
        );
        Ok(Self {
            dataset,
            bands,
            window,
            next_row: 0,
            source,
        })
    }

    pub fn window(&self) -> &PixelWindow {
        &self.window
    }

    /// Rows left to yield.
    pub fn remaining(&self) -> usize {
        self.window.height - self.next_row
    }

    pub fn next_row(&mut self) -> Option<Result<BandRows>> {
        if self.next_row >= self.window.height {
            return None;
        }
        let row = self.window.y_offset + self.next_row;
        self.next_row += 1;
        Some(self.read_row(row))
    }

    fn read_row(&mut self, row: usize) -> Result<BandRows> {
        match &mut self.source {
            RowSource::Sequential => {
                let buffers = self
                    .dataset
                    .read_bands(self.bands.as_slice(), &self.window.row(row))?;
                let mut values = BandRows::new_zeroed([buffers.len(), self.window.width]);
                for (band, buffer) in buffers.iter().enumerate() {
                    buffer.decode_into(values.band_mut(band));
                }
                debug!("read row {row}");
                Ok(values)
            }
            RowSource::Parallel(parallel) => {
                if parallel.ready.is_empty() {
                    let end = (row + parallel.batch_rows).min(self.window.rows().end);
                    parallel.fill(&self.window, row..end)?;
                }
                parallel.ready.pop_front().ok_or_else(|| {
                    BandMathError::InvalidSubset(format!("row {row} is outside {}", self.window))
                })
            }
        }
    }
}

impl Iterator for WindowedValueStream<'_> {
    type Item = Result<BandRows>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}
