//! Batch processing of recorded stereo pairs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use findfish_calib::StereoUndistorter;
use findfish_track::{MarkerDecoder, MarkerDetector};
use rayon::prelude::*;

use crate::config::ProcessorConfig;
use crate::error::ProcessError;
use crate::pipeline::{RunSummary, StreamProcessor};
use crate::scan::{recording_tag, scan_subdirs};
use crate::sequence::{ImageSequenceSink, ImageSequenceSource};

/// Left and right recordings sharing a tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoPair {
    pub tag: String,
    pub left: PathBuf,
    pub right: PathBuf,
}

/// Result of one pair.
#[derive(Debug)]
pub struct PairReport {
    pub tag: String,
    pub result: Result<RunSummary, ProcessError>,
}

impl PairReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

type DecoderFactory = Arc<dyn Fn() -> Box<dyn MarkerDecoder> + Send + Sync>;

/// Group recording directories by tag. A tag needs exactly two
/// recordings; the first in name order is the left one.
pub fn pair_recordings(dirs: &[PathBuf]) -> Vec<VideoPair> {
    let mut groups: BTreeMap<String, Vec<&PathBuf>> = BTreeMap::new();
    for dir in dirs {
        if let Some(tag) = recording_tag(dir) {
            groups.entry(tag).or_default().push(dir);
        }
    }
    groups
        .into_iter()
        .filter_map(|(tag, mut members)| {
            if members.len() != 2 {
                log::warn!("{tag}: expected 2 recordings, found {}", members.len());
                return None;
            }
            members.sort();
            Some(VideoPair {
                tag,
                left: members[0].clone(),
                right: members[1].clone(),
            })
        })
        .collect()
}

/// Runs a [`StreamProcessor`] per pair on the rayon pool.
///
/// For pair `<tag>` the synced frames go to `<out_dir>/<tag>_sync/` and the
/// events to `<out_dir>/DE_<tag>.json`. A failed pair is logged and does
/// not stop the others.
pub struct VideoPairCoordinator {
    undistorter: Arc<StereoUndistorter>,
    config: ProcessorConfig,
    out_dir: PathBuf,
    decoder: DecoderFactory,
}

impl VideoPairCoordinator {
    /// Coordinator using QR markers.
    pub fn new(
        undistorter: Arc<StereoUndistorter>,
        config: ProcessorConfig,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            undistorter,
            config,
            out_dir: out_dir.into(),
            decoder: Arc::new(|| Box::new(findfish_track::QrDecoder) as Box<dyn MarkerDecoder>),
        }
    }

    /// Replace the marker decoder. `factory` is called twice per pair.
    pub fn with_decoder<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn MarkerDecoder> + Send + Sync + 'static,
    {
        self.decoder = Arc::new(factory);
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Pairs found among the subdirectories of `videos`.
    pub fn discover(&self, videos: &Path) -> Result<Vec<VideoPair>, ProcessError> {
        let dirs = scan_subdirs(videos)?;
        let pairs = pair_recordings(&dirs);
        log::info!("{} pairs in {}", pairs.len(), videos.display());
        Ok(pairs)
    }

    pub fn sync_dir(&self, tag: &str) -> PathBuf {
        self.out_dir.join(format!("{tag}_sync"))
    }

    pub fn events_path(&self, tag: &str) -> PathBuf {
        self.out_dir.join(format!("DE_{tag}.json"))
    }

    /// Process one pair and write its outputs.
    pub fn process_pair(&self, pair: &VideoPair) -> Result<RunSummary, ProcessError> {
        log::info!("processing {}", pair.tag);
        let mut left = ImageSequenceSource::open(&pair.left, self.config.fps)?;
        let mut right = ImageSequenceSource::open(&pair.right, self.config.fps)?;
        let mut sink = ImageSequenceSink::new(self.sync_dir(&pair.tag), &self.config.frame_extension);

        let markers = [
            MarkerDetector::boxed((self.decoder)()),
            MarkerDetector::boxed((self.decoder)()),
        ];
        let mut processor = StreamProcessor::new(self.undistorter.clone(), &self.config, markers);
        let summary = processor.run(&mut left, &mut right, &mut sink)?;

        let events = processor.into_event_log();
        let path = self.events_path(&pair.tag);
        events.write_json(&path)?;
        log::info!("{}: {} events in {}", pair.tag, events.len(), path.display());
        Ok(summary)
    }

    /// Process all pairs in parallel. Reports follow the order of `pairs`.
    pub fn run(&self, pairs: &[VideoPair]) -> Vec<PairReport> {
        pairs
            .par_iter()
            .map(|pair| {
                let result = self.process_pair(pair);
                if let Err(e) = &result {
                    log::error!("{}: {e}", pair.tag);
                }
                PairReport {
                    tag: pair.tag.clone(),
                    result,
                }
            })
            .collect()
    }
}
