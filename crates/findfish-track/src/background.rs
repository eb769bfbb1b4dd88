//! Sample-based background model in the spirit of a KNN subtractor.
//!
//! Every pixel keeps a small bank of past intensities. A pixel is background
//! when enough bank entries lie close to its current value. Banks are
//! refreshed round-robin so the model follows slow scene changes over
//! roughly `history` frames.

use findfish_core::{GrayImage, GrayImageView};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnParams {
    /// Bank entries per pixel.
    pub samples: usize,
    /// Close entries required for a background decision.
    pub knn: usize,
    /// Squared intensity distance under which an entry counts as close.
    pub dist2_threshold: f64,
    /// Approximate number of frames a bank spans.
    pub history: usize,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            samples: 7,
            knn: 2,
            dist2_threshold: 400.0,
            history: 500,
        }
    }
}

#[derive(Clone, Debug)]
pub struct KnnSubtractor {
    params: KnnParams,
    width: usize,
    height: usize,
    bank: Vec<u8>,
    frames: u64,
    slot: usize,
}

impl KnnSubtractor {
    pub fn new(params: KnnParams) -> Self {
        Self {
            params,
            width: 0,
            height: 0,
            bank: Vec::new(),
            frames: 0,
            slot: 0,
        }
    }

    pub fn params(&self) -> &KnnParams {
        &self.params
    }

    /// Frames consumed since the model was (re)initialised.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn reset(&mut self, img: &GrayImageView<'_>) {
        let n = self.params.samples.max(1);
        self.width = img.width;
        self.height = img.height;
        self.bank = img
            .data
            .iter()
            .flat_map(|&v| std::iter::repeat_n(v, n))
            .collect();
        self.frames = 0;
        self.slot = 0;
    }

    /// Classify `img` against the model and update it. Foreground pixels are
    /// 255, background 0. The first frame, and any frame with a new size,
    /// seeds the model and yields an empty mask.
    pub fn apply(&mut self, img: &GrayImageView<'_>) -> GrayImage {
        let mut mask = GrayImage::new(img.width, img.height);
        if self.bank.is_empty() || img.width != self.width || img.height != self.height {
            self.reset(img);
            self.frames = 1;
            return mask;
        }

        let n = self.params.samples.max(1);
        let knn = self.params.knn.max(1);
        let thr = self.params.dist2_threshold;
        for (i, (&v, out)) in img.data.iter().zip(mask.data.iter_mut()).enumerate() {
            let bank = &self.bank[i * n..(i + 1) * n];
            let close = bank
                .iter()
                .filter(|&&s| {
                    let d = v as f64 - s as f64;
                    d * d < thr
                })
                .take(knn)
                .count();
            if close < knn {
                *out = 255;
            }
        }

        self.frames += 1;
        let period = (self.params.history / n).max(1) as u64;
        if self.frames % period == 0 {
            let slot = self.slot;
            for (i, &v) in img.data.iter().enumerate() {
                self.bank[i * n + slot] = v;
            }
            self.slot = (slot + 1) % n;
        }
        mask
    }
}

impl Default for KnnSubtractor {
    fn default() -> Self {
        Self::new(KnnParams::default())
    }
}
