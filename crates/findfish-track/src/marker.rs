//! One-shot sync marker detection.

use std::collections::BTreeMap;
use std::fmt;

use findfish_core::{Frame, GrayImageView};
use serde::{Deserialize, Serialize};

/// Decodes the payload of a marker visible in a grayscale image.
pub trait MarkerDecoder: Send {
    fn decode(&self, img: &GrayImageView<'_>) -> Option<String>;
}

impl<F> MarkerDecoder for F
where
    F: Fn(&GrayImageView<'_>) -> Option<String> + Send,
{
    fn decode(&self, img: &GrayImageView<'_>) -> Option<String> {
        self(img)
    }
}

/// Sync anchor of one stream. Start and end latch once, together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    found: bool,
    start: Option<u64>,
    end: Option<u64>,
}

impl SyncState {
    /// Latch the marker at `frame_index`. Returns `false` if already latched.
    pub fn latch(&mut self, frame_index: u64) -> bool {
        if self.found {
            return false;
        }
        self.found = true;
        self.start = Some(frame_index);
        self.end = Some(frame_index);
        true
    }

    pub fn found(&self) -> bool {
        self.found
    }

    pub fn start(&self) -> Option<u64> {
        self.start
    }

    pub fn end(&self) -> Option<u64> {
        self.end
    }

    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }
}

/// Split a `geo:lat,long;key=value;...` payload into fields.
///
/// Whitespace is ignored. The first occurrence of a key wins.
pub fn parse_geo_uri(payload: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let clean: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    for part in clean.split(';').filter(|p| !p.is_empty()) {
        let part = match part.find("geo:") {
            Some(at) => {
                let coords = &part[at + 4..];
                let mut values = coords.split(',');
                if let Some(lat) = values.next().filter(|v| !v.is_empty()) {
                    fields.entry("lat".to_string()).or_insert_with(|| lat.to_string());
                }
                if let Some(long) = values.next().filter(|v| !v.is_empty()) {
                    fields.entry("long".to_string()).or_insert_with(|| long.to_string());
                }
                coords
            }
            None => part,
        };
        let tokens: Vec<&str> = part.split('=').collect();
        for kv in tokens.chunks_exact(2) {
            fields
                .entry(kv[0].to_string())
                .or_insert_with(|| kv[1].to_string());
        }
    }
    fields
}

/// Watches a stream for its sync marker.
pub struct MarkerDetector {
    decoder: Box<dyn MarkerDecoder>,
    state: SyncState,
    payload: Option<String>,
    fields: BTreeMap<String, String>,
}

impl fmt::Debug for MarkerDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerDetector")
            .field("state", &self.state)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

impl MarkerDetector {
    pub fn new(decoder: impl MarkerDecoder + 'static) -> Self {
        Self::boxed(Box::new(decoder))
    }

    pub fn boxed(decoder: Box<dyn MarkerDecoder>) -> Self {
        Self {
            decoder,
            state: SyncState::default(),
            payload: None,
            fields: BTreeMap::new(),
        }
    }

    /// Detector backed by the built-in QR decoder.
    #[cfg(feature = "qr")]
    pub fn qr() -> Self {
        Self::new(crate::qr::QrDecoder)
    }

    /// Try to decode a marker in `frame`. The first success latches the
    /// state at `frame_index`; later calls are no-ops. Returns `true` when
    /// this call latched.
    pub fn check_frame(&mut self, frame: &Frame, frame_index: u64) -> bool {
        if self.state.found() || frame.is_empty() {
            return false;
        }
        let gray = frame.to_gray();
        let Some(payload) = self.decoder.decode(&gray.view()).filter(|p| !p.is_empty()) else {
            return false;
        };
        self.state.latch(frame_index);
        self.fields = parse_geo_uri(&payload);
        log::info!("sync marker at frame {frame_index}: {payload}");
        self.payload = Some(payload);
        true
    }

    /// True once start and end are both set.
    pub fn detected_marker(&self) -> bool {
        self.state.is_complete()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Parsed payload fields, empty before detection.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}
