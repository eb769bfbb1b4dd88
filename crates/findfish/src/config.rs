use std::path::Path;

use findfish_track::TrackerSettings;
use serde::{Deserialize, Serialize};

use crate::error::ProcessError;

/// Settings for processing video pairs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub tracker: TrackerSettings,
    /// Consecutive empty reads before a stream is treated as exhausted.
    pub max_empty_reads: u32,
    /// Frame rate reported for image-sequence streams.
    pub fps: f64,
    /// File extension of written frames.
    pub frame_extension: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerSettings::default(),
            max_empty_reads: 30,
            fps: 30.0,
            frame_extension: "png".to_string(),
        }
    }
}

impl ProcessorConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ProcessError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ProcessError> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proc.json");
        std::fs::write(&path, r#"{"tracker": {"min_threshold": 180}, "fps": 24.0}"#).unwrap();
        let cfg = ProcessorConfig::load_json(&path).unwrap();
        assert_eq!(cfg.tracker.min_threshold, 180);
        assert_eq!(cfg.tracker.blur_size, 9);
        assert_eq!(cfg.fps, 24.0);
        assert_eq!(cfg.max_empty_reads, 30);

        cfg.write_json(&path).unwrap();
        assert_eq!(ProcessorConfig::load_json(&path).unwrap(), cfg);
    }
}
