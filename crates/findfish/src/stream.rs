//! Frame source and sink seams plus the bounded-retry reader.

use std::path::PathBuf;

use findfish_core::{Frame, ImageError};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("cannot open stream {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("cannot write frame to {path}: {reason}")]
    Write { path: PathBuf, reason: String },
    #[error(transparent)]
    Frame(#[from] ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Stream metadata. `frame_count` is `None` when unknown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub frame_count: Option<u64>,
    pub fps: f64,
    pub width: usize,
    pub height: usize,
    pub codec: String,
}

/// Sequential frame input.
pub trait FrameSource: Send {
    fn info(&self) -> StreamInfo;

    /// Next frame, or `Ok(None)` for an empty read. An empty read is not the
    /// end of the stream by itself; see [`FrameReader`].
    fn read_frame(&mut self) -> Result<Option<Frame>, StreamError>;
}

/// Sequential frame output.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StreamError>;

    fn finish(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
}

/// Reads frames from a source, retrying empty reads.
///
/// The stream ends once `frame_count` reads have been made, or after
/// `max_empty_reads` consecutive empty reads.
pub struct FrameReader<'a> {
    source: &'a mut dyn FrameSource,
    frame_count: Option<u64>,
    max_empty_reads: u32,
    reads: u64,
    exhausted: bool,
}

impl<'a> FrameReader<'a> {
    pub fn new(source: &'a mut dyn FrameSource, max_empty_reads: u32) -> Self {
        let frame_count = source.info().frame_count;
        Self {
            source,
            frame_count,
            max_empty_reads: max_empty_reads.max(1),
            reads: 0,
            exhausted: false,
        }
    }

    /// Reads attempted so far, empty ones included.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        if self.exhausted {
            return Ok(None);
        }
        let mut empty = 0;
        loop {
            if self.frame_count.is_some_and(|n| self.reads >= n) {
                self.exhausted = true;
                return Ok(None);
            }
            self.reads += 1;
            match self.source.read_frame()? {
                Some(frame) if !frame.is_empty() => return Ok(Some(frame)),
                _ => {
                    empty += 1;
                    if empty >= self.max_empty_reads {
                        log::warn!("{empty} empty reads in a row; stream likely exhausted");
                        self.exhausted = true;
                        return Ok(None);
                    }
                    log::debug!("empty read {} of {}, retrying", empty, self.max_empty_reads);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use findfish_core::PixelFormat;

    /// Source replaying a script of full (`true`) and empty (`false`) reads.
    struct Scripted {
        script: Vec<bool>,
        next: usize,
        count: Option<u64>,
    }

    impl FrameSource for Scripted {
        fn info(&self) -> StreamInfo {
            StreamInfo {
                frame_count: self.count,
                fps: 25.0,
                width: 2,
                height: 2,
                codec: "raw".into(),
            }
        }

        fn read_frame(&mut self) -> Result<Option<Frame>, StreamError> {
            let full = self.script.get(self.next).copied().unwrap_or(false);
            self.next += 1;
            Ok(full.then(|| Frame::new(2, 2, PixelFormat::Gray8)))
        }
    }

    #[test]
    fn empty_reads_are_retried() {
        let mut src = Scripted {
            script: vec![true, false, false, true],
            next: 0,
            count: Some(4),
        };
        let mut reader = FrameReader::new(&mut src, 30);
        assert!(reader.next_frame().unwrap().is_some());
        assert!(reader.next_frame().unwrap().is_some());
        assert_eq!(reader.reads(), 4);
        assert!(reader.next_frame().unwrap().is_none());
        assert!(reader.is_exhausted());
    }

    #[test]
    fn frame_count_bounds_retries() {
        let mut src = Scripted {
            script: vec![true, false, false, false],
            next: 0,
            count: Some(3),
        };
        let mut reader = FrameReader::new(&mut src, 30);
        assert!(reader.next_frame().unwrap().is_some());
        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.reads(), 3);
    }

    #[test]
    fn unknown_length_stops_after_empty_run() {
        let mut src = Scripted {
            script: vec![true],
            next: 0,
            count: None,
        };
        let mut reader = FrameReader::new(&mut src, 5);
        assert!(reader.next_frame().unwrap().is_some());
        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.reads(), 6);
        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.reads(), 6);
    }
}
