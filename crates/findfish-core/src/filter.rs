//! Grayscale filters: Gaussian blur, thresholding and binary morphology.

use std::collections::VecDeque;

use crate::image::{GrayImage, GrayImageView};

/// Normalized 1D Gaussian taps. A non-positive `sigma` derives one from `ksize`.
pub fn gaussian_kernel(ksize: usize, sigma: f64) -> Vec<f64> {
    let ksize = ksize.max(1) | 1;
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let half = (ksize / 2) as f64;
    let mut taps: Vec<f64> = (0..ksize)
        .map(|i| {
            let d = i as f64 - half;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.iter_mut().for_each(|t| *t /= sum);
    taps
}

#[inline]
fn reflect101(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - 2 - i };
    }
    i as usize
}

/// Separable Gaussian blur with reflect-101 borders.
pub fn gaussian_blur(src: &GrayImageView<'_>, ksize: usize, sigma: f64) -> GrayImage {
    let (w, h) = (src.width, src.height);
    if w == 0 || h == 0 {
        return GrayImage::new(w, h);
    }
    let taps = gaussian_kernel(ksize, sigma);
    let half = (taps.len() / 2) as isize;

    let mut tmp = vec![0f32; w * h];
    for y in 0..h {
        let row = &src.data[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0.0;
            for (k, t) in taps.iter().enumerate() {
                let xi = reflect101(x as isize + k as isize - half, w);
                acc += *t * row[xi] as f64;
            }
            tmp[y * w + x] = acc as f32;
        }
    }

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, t) in taps.iter().enumerate() {
                let yi = reflect101(y as isize + k as isize - half, h);
                acc += *t * tmp[yi * w + x] as f64;
            }
            out.data[y * w + x] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// `dst = src > thresh ? max_value : 0`.
pub fn threshold_binary(src: &GrayImageView<'_>, thresh: u8, max_value: u8) -> GrayImage {
    GrayImage {
        width: src.width,
        height: src.height,
        data: src
            .data
            .iter()
            .map(|&v| if v > thresh { max_value } else { 0 })
            .collect(),
    }
}

/// Otsu threshold over every pixel of the image.
pub fn otsu_threshold(src: &GrayImageView<'_>) -> u8 {
    if src.data.is_empty() {
        return 127;
    }

    let mut hist = [0u64; 256];
    for &v in src.data {
        hist[v as usize] += 1;
    }
    let occupied: Vec<usize> = (0..256).filter(|&i| hist[i] > 0).collect();
    match occupied.as_slice() {
        [only] => return *only as u8,
        [lo, hi] => return ((lo + hi) / 2) as u8,
        _ => {}
    }

    let total = src.data.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;
    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }
        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;
        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }
    best_t
}

/// Flat structuring element stored as one horizontal span per row offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructuringElement {
    // (dy, dx_lo, dx_hi) relative to the anchor at the element centre.
    spans: Vec<(isize, isize, isize)>,
}

impl StructuringElement {
    /// Filled ellipse inscribed in a `width x height` box.
    pub fn ellipse(width: usize, height: usize) -> Self {
        let (cx, cy) = ((width / 2) as isize, (height / 2) as isize);
        let r = cy.max(1) as f64;
        let c = cx as f64;
        let mut spans = Vec::with_capacity(height);
        for i in 0..height as isize {
            let dy = i - cy;
            if dy.abs() > cy {
                continue;
            }
            let dx = if cy == 0 {
                cx
            } else {
                (c * ((r * r - (dy * dy) as f64).max(0.0) / (r * r)).sqrt()).round() as isize
            };
            spans.push((dy, -dx, dx));
        }
        Self { spans }
    }

    /// Vertical line of `height` pixels.
    pub fn column(height: usize) -> Self {
        let cy = (height / 2) as isize;
        Self {
            spans: (0..height.max(1) as isize).map(|i| (i - cy, 0, 0)).collect(),
        }
    }

    pub fn rect(width: usize, height: usize) -> Self {
        let (cx, cy) = ((width / 2) as isize, (height / 2) as isize);
        let w = width.max(1) as isize;
        Self {
            spans: (0..height.max(1) as isize)
                .map(|i| (i - cy, -cx, w - 1 - cx))
                .collect(),
        }
    }
}

// Running max/min of `row` over windows [x+lo, x+hi], clipped to the row.
fn sliding_extreme(row: &[u8], lo: isize, hi: isize, take_max: bool, out: &mut [u8]) {
    let n = row.len() as isize;
    let better = |a: u8, b: u8| if take_max { a >= b } else { a <= b };
    let mut window: VecDeque<usize> = VecDeque::new();
    let mut next = 0isize;
    for x in 0..n {
        let (a, b) = ((x + lo).max(0), (x + hi).min(n - 1));
        while next <= b {
            let v = row[next as usize];
            while window.back().is_some_and(|&j| better(v, row[j])) {
                window.pop_back();
            }
            window.push_back(next as usize);
            next += 1;
        }
        while window.front().is_some_and(|&j| (j as isize) < a) {
            window.pop_front();
        }
        out[x as usize] = match window.front() {
            Some(&j) if a <= b => row[j],
            _ if take_max => 0,
            _ => 255,
        };
    }
}

fn morph(src: &GrayImageView<'_>, se: &StructuringElement, take_max: bool) -> GrayImage {
    let (w, h) = (src.width, src.height);
    let init = if take_max { 0 } else { 255 };
    let mut out = GrayImage::filled(w, h, init);
    let mut line = vec![0u8; w];
    for y in 0..h as isize {
        for &(dy, lo, hi) in &se.spans {
            let sy = y + dy;
            if sy < 0 || sy >= h as isize {
                continue;
            }
            let sy = sy as usize;
            sliding_extreme(&src.data[sy * w..(sy + 1) * w], lo, hi, take_max, &mut line);
            let dst = &mut out.data[y as usize * w..(y as usize + 1) * w];
            for (d, &v) in dst.iter_mut().zip(&line) {
                *d = if take_max { (*d).max(v) } else { (*d).min(v) };
            }
        }
    }
    out
}

pub fn dilate(src: &GrayImageView<'_>, se: &StructuringElement) -> GrayImage {
    morph(src, se, true)
}

pub fn erode(src: &GrayImageView<'_>, se: &StructuringElement) -> GrayImage {
    morph(src, se, false)
}

/// Morphological closing (dilate then erode).
pub fn close(src: &GrayImageView<'_>, se: &StructuringElement) -> GrayImage {
    let dilated = dilate(src, se);
    erode(&dilated.view(), se)
}
