//! Detected-event record written next to each processed pair.

use std::fmt;
use std::path::Path;

use findfish_track::{ActivityInterval, MarkerDetector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which camera of the pair a record belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamSide {
    Left,
    Right,
}

impl StreamSide {
    pub const BOTH: [StreamSide; 2] = [StreamSide::Left, StreamSide::Right];

    /// Camera index used by the calibration (0 = left).
    pub fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for StreamSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named JSON objects collected in insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct EventLog {
    name: String,
    objects: Vec<(String, Map<String, Value>)>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new("DetectedEvents")
    }
}

impl EventLog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn add_object(&mut self, name: impl Into<String>, fields: Map<String, Value>) {
        self.objects.push((name.into(), fields));
    }

    /// `Event_Activity_<stream>_<id>` with the interval bounds. An open
    /// interval has a null `frame_end`.
    pub fn add_interval(&mut self, stream: StreamSide, interval: &ActivityInterval) {
        let mut fields = Map::new();
        fields.insert("stream".into(), stream.as_str().into());
        fields.insert("frame_start".into(), interval.start.into());
        fields.insert("frame_end".into(), interval.end.into());
        self.add_object(format!("Event_Activity_{stream}_{}", interval.id), fields);
    }

    /// `Event_QRCode_<stream>` with the payload fields and the frame. Skipped
    /// when the detector never latched.
    pub fn add_marker(&mut self, stream: StreamSide, marker: &MarkerDetector) {
        let Some(frame) = marker.state().start() else {
            return;
        };
        let mut fields: Map<String, Value> = marker
            .fields()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        fields.insert("frame".into(), frame.into());
        self.add_object(format!("Event_QRCode_{stream}"), fields);
    }

    /// `{"<name>": [{"<object>": {...}}, ...]}`.
    pub fn build(&self) -> Value {
        let array = self
            .objects
            .iter()
            .map(|(name, fields)| {
                let mut obj = Map::new();
                obj.insert(name.clone(), Value::Object(fields.clone()));
                Value::Object(obj)
            })
            .collect();
        let mut root = Map::new();
        root.insert(self.name.clone(), Value::Array(array));
        Value::Object(root)
    }

    /// Compact JSON text.
    pub fn to_json_string(&self) -> String {
        self.build().to_string()
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_string())
    }
}
