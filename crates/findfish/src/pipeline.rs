//! Two-stream synchronisation and processing loop.

use std::sync::Arc;

use findfish_calib::StereoUndistorter;
use findfish_core::{hconcat, Frame};
use findfish_track::{ActivityTracker, MarkerDetector};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::ProcessorConfig;
use crate::error::ProcessError;
use crate::events::{EventLog, StreamSide};
use crate::stream::{FrameReader, FrameSink, FrameSource};

/// Where a run stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// Per stream: whether its marker has been seen.
    Waiting { left: bool, right: bool },
    /// Both markers seen; `offset` is the shared index of the later one.
    Streaming { offset: u64 },
    Finished,
}

/// Outcome of a successful run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Shared frame index at which both streams were synced.
    pub offset: u64,
    pub frames_written: u64,
    /// Offset-adjusted index of the last written frame.
    pub last_frame: u64,
}

/// Drives one pair of streams.
///
/// Each stream owns its marker detector and activity tracker. Frames are
/// read from a stream while its marker is missing, or once both markers
/// have been seen, so the stream that shows its marker first waits for the
/// other. Only synced frames reach the trackers and the sink.
#[derive(Debug)]
pub struct StreamProcessor {
    undistorter: Arc<StereoUndistorter>,
    markers: [MarkerDetector; 2],
    trackers: [ActivityTracker; 2],
    max_empty_reads: u32,
    phase: SyncPhase,
}

impl StreamProcessor {
    pub fn new(
        undistorter: Arc<StereoUndistorter>,
        config: &ProcessorConfig,
        markers: [MarkerDetector; 2],
    ) -> Self {
        Self {
            undistorter,
            markers,
            trackers: [
                ActivityTracker::new(config.tracker.clone()),
                ActivityTracker::new(config.tracker.clone()),
            ],
            max_empty_reads: config.max_empty_reads,
            phase: SyncPhase::Waiting {
                left: false,
                right: false,
            },
        }
    }

    /// Processor with a QR marker detector on each stream.
    pub fn with_qr(undistorter: Arc<StereoUndistorter>, config: &ProcessorConfig) -> Self {
        Self::new(undistorter, config, [MarkerDetector::qr(), MarkerDetector::qr()])
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn marker(&self, side: StreamSide) -> &MarkerDetector {
        &self.markers[side.index()]
    }

    pub fn tracker(&self, side: StreamSide) -> &ActivityTracker {
        &self.trackers[side.index()]
    }

    fn synced(&self) -> bool {
        self.markers.iter().all(MarkerDetector::detected_marker)
    }

    /// Process both streams until either is exhausted.
    ///
    /// Fails with [`ProcessError::NeverSynced`] when the streams end before
    /// both markers were seen; nothing is written to `sink` in that case.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn run(
        &mut self,
        left: &mut dyn FrameSource,
        right: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<RunSummary, ProcessError> {
        let mut readers = [
            FrameReader::new(left, self.max_empty_reads),
            FrameReader::new(right, self.max_empty_reads),
        ];
        let mut current: [Option<Frame>; 2] = [None, None];
        let mut offset = None;
        let mut last_frame = 0;
        let mut written = 0u64;
        let mut index = 0u64;

        'frames: loop {
            let synced = self.synced();
            for side in StreamSide::BOTH {
                let i = side.index();
                let waiting = !self.markers[i].detected_marker();
                if !(waiting || synced || current[i].is_none()) {
                    continue;
                }
                let Some(frame) = readers[i].next_frame()? else {
                    log::info!("{side} stream exhausted at frame {index}");
                    break 'frames;
                };
                if waiting {
                    self.markers[i].check_frame(&frame, index);
                }
                current[i] = Some(self.undistorter.undistort(&frame, i)?);
            }

            if self.synced() {
                let off = *offset.get_or_insert_with(|| {
                    log::info!("streams synced at frame {index}");
                    index
                });
                self.phase = SyncPhase::Streaming { offset: off };
                let adjusted = index - off;
                if let [Some(l), Some(r)] = &mut current {
                    self.trackers[0].process(l, adjusted);
                    self.trackers[1].process(r, adjusted);
                    sink.write_frame(&hconcat(l, r)?)?;
                    written += 1;
                    last_frame = adjusted;
                }
            } else {
                self.phase = SyncPhase::Waiting {
                    left: self.markers[0].detected_marker(),
                    right: self.markers[1].detected_marker(),
                };
            }
            index += 1;
        }

        self.phase = SyncPhase::Finished;
        let Some(offset) = offset else {
            log::error!("no sync marker pair found in {index} frames");
            return Err(ProcessError::NeverSynced { frames: index });
        };
        for tracker in &mut self.trackers {
            tracker.finish(last_frame);
        }
        sink.finish()?;
        log::info!("wrote {written} synced frames (offset {offset})");
        Ok(RunSummary {
            offset,
            frames_written: written,
            last_frame,
        })
    }

    /// Markers and activity intervals of both streams, tagged by side.
    pub fn into_event_log(self) -> EventLog {
        let mut log = EventLog::default();
        for (side, marker) in StreamSide::BOTH.into_iter().zip(&self.markers) {
            log.add_marker(side, marker);
        }
        for (side, tracker) in StreamSide::BOTH.into_iter().zip(self.trackers) {
            for interval in tracker.into_intervals() {
                log.add_interval(side, &interval);
            }
        }
        log
    }
}
