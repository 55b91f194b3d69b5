//! Offline patch extraction.
//!
//! Every record of the coordinate list is queued before any worker starts.
//! Workers pull records from the shared queue, open their own slide reader
//! for each record and write `<index>.<ext>` into the output directory.
//! Outcomes flow back over a completion channel to the calling thread, the
//! only place that counts progress.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use chrono::Local;
use crossbeam_channel::{Receiver, unbounded};
use image::DynamicImage;
use tracing::{debug, error, info, warn};

use crate::{
    config::{ExtractConfig, FailurePolicy},
    coords::parse_coordinates,
    error::{GridError, Result},
    slide::RasterSlideOpener,
    traits::{SlideOpener, SlideReader},
    types::{Coordinate, PatchOrigin},
};

/// Name of the coordinate list copy written next to the patches
pub const LIST_FILE: &str = "list.txt";

const PROGRESS_INTERVAL: usize = 100;

/// Summary of an extraction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub total: usize,
    pub completed: usize,
    /// Indices of the records that failed, ascending. Only filled under
    /// [`FailurePolicy::Skip`].
    pub failed: Vec<usize>,
}

impl ExtractionReport {
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

/// Samples patches with a pool of worker threads.
///
/// Readers never cross threads: each item opens its own through the
/// shared `O`, so only the opener needs to be `Send + Sync` and
/// `SlideReader` implementations are free to hold non-`Sync` state.
pub struct PatchExtractor<O: SlideOpener> {
    config: ExtractConfig,
    opener: O,
}

impl PatchExtractor<RasterSlideOpener> {
    /// Extractor reading `<slide_dir>/<slide_id>.<slide_extension>` rasters
    pub fn from_config(config: ExtractConfig) -> Self {
        let opener = RasterSlideOpener::new(&config.slide_dir, &config.slide_extension);
        Self { config, opener }
    }
}

impl<O: SlideOpener> PatchExtractor<O> {
    pub fn new(config: ExtractConfig, opener: O) -> Self {
        Self { config, opener }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    pub fn patch_path(&self, index: usize) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}.{}", index, self.config.patch_format.extension()))
    }

    /// Sample and store the patch of a single record.
    pub fn extract_one(&self, index: usize, coordinate: &Coordinate) -> Result<PathBuf> {
        let reader = self.opener.open(&coordinate.slide_id)?;
        let size = self.config.patch_size;
        let origin = PatchOrigin::of(coordinate, size);

        let region = reader.read_region(origin, self.config.level, (size, size))?;
        let patch = DynamicImage::ImageRgba8(region).to_rgb8();

        let path = self.patch_path(index);
        patch.save_with_format(&path, self.config.patch_format.image_format())?;
        debug!(
            "Wrote {} from {} at ({}, {})",
            path.display(),
            coordinate.slide_id,
            origin.x,
            origin.y
        );
        Ok(path)
    }

    /// Extract every record of the coordinate list.
    ///
    /// The list is parsed in full before any work is scheduled, so a
    /// malformed line fails the run without writing a single patch.
    pub fn run(&self) -> Result<ExtractionReport> {
        self.config.validate()?;

        let content = fs::read_to_string(&self.config.coords_path)?;
        let coordinates = parse_coordinates(&content)?;

        fs::create_dir_all(&self.config.output_dir)?;
        fs::write(self.config.output_dir.join(LIST_FILE), &content)?;

        let workers = self.config.num_workers.min(coordinates.len());
        info!(
            "Extracting {} patches of {}px at level {} with {} workers",
            coordinates.len(),
            self.config.patch_size,
            self.config.level,
            workers
        );

        let (task_tx, task_rx) = unbounded::<(usize, &Coordinate)>();
        for task in coordinates.iter().enumerate() {
            // The receiver outlives this loop, sending cannot fail
            let _ = task_tx.send(task);
        }
        drop(task_tx);

        let (done_tx, done_rx) = unbounded::<(usize, Result<PathBuf>)>();
        let stop = AtomicBool::new(false);

        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let task_rx = task_rx.clone();
                    let done_tx = done_tx.clone();
                    let stop = &stop;
                    scope.spawn(move || {
                        for (index, coordinate) in task_rx.iter() {
                            if stop.load(Ordering::Relaxed) {
                                break;
                            }
                            let outcome = self.extract_one(index, coordinate);
                            if done_tx.send((index, outcome)).is_err() {
                                break;
                            }
                        }
                    })
                })
                .collect();
            drop(done_tx);

            let report = self.aggregate(coordinates.len(), &done_rx, &stop);

            let panicked = handles
                .into_iter()
                .map(|handle| handle.join())
                .filter(|joined| joined.is_err())
                .count();
            if panicked > 0 {
                error!("{} extraction workers panicked", panicked);
                return Err(GridError::WorkerPanicked);
            }
            report
        })
    }

    fn aggregate(
        &self,
        total: usize,
        done_rx: &Receiver<(usize, Result<PathBuf>)>,
        stop: &AtomicBool,
    ) -> Result<ExtractionReport> {
        let mut report = ExtractionReport {
            total,
            ..Default::default()
        };
        let mut first_failure = None;

        for (index, outcome) in done_rx.iter() {
            match outcome {
                Ok(_) => {
                    report.completed += 1;
                    if report.completed % PROGRESS_INTERVAL == 0 {
                        info!(
                            "{} : {} patches processed",
                            Local::now().format("%Y-%m-%d %H:%M:%S"),
                            report.completed
                        );
                    }
                }
                Err(err) => match self.config.on_error {
                    FailurePolicy::Abort => {
                        stop.store(true, Ordering::Relaxed);
                        if first_failure.is_none() {
                            error!("Item {} failed, stopping extraction: {}", index, err);
                            first_failure = Some(GridError::ItemFailed {
                                index,
                                source: Box::new(err),
                            });
                        }
                    }
                    FailurePolicy::Skip => {
                        warn!("Skipping item {}: {}", index, err);
                        report.failed.push(index);
                    }
                },
            }
        }

        if let Some(err) = first_failure {
            return Err(err);
        }
        report.failed.sort_unstable();
        info!(
            "Extraction finished: {} of {} patches written, {} failed",
            report.completed,
            report.total,
            report.failed.len()
        );
        Ok(report)
    }
}
