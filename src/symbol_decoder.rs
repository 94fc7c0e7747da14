// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Two-tier symbol decoder (C5): a fast (detector-based) path and a
//! precise (multi-threshold) fallback for extracting a packet's three
//! layers from one RGB frame.
//!
//! Ported from `original_source/recv/recv.py::fast_decode`/`precise_decode`:
//! the fast path there is a single cheap detector call per frame; the
//! precise path retries grayscale, Otsu-thresholded, and a sweep of fixed
//! thresholds (`range(32, 192+1, 16)`) before giving up. This crate runs
//! each of the three color channels through that pipeline independently
//! (§4.8's "per-channel" design) rather than decoding the composite frame
//! directly, since each channel carries its own, separately
//! error-corrected Data Matrix symbol.

use image::{GenericImageView, GrayImage, RgbImage};
use tracing::debug;

use crate::packet::Layers;
use crate::rasterize::{BoundingBox, SymbolDetector, SymbolReader};

/// Threshold levels tried by the precise path's strategy (c), matching
/// `original_source/recv/recv.py`'s `range(32, 192+1, 16)`.
const PRECISE_THRESHOLDS: std::ops::RangeInclusive<u16> = 32..=192;
const PRECISE_THRESHOLD_STEP: u16 = 16;

/// Sigma used for the "light" 3x3 Gaussian blur applied before decoding at
/// each swept threshold in precise strategy (c).
const PRECISE_BLUR_SIGMA: f32 = 0.6;

/// Split an RGB frame into its three single-channel images, in R, G, B
/// order (the order the dense datamatrix's layers were composed in, see
/// [`crate::render::compose`]).
pub fn split_channels(frame: &RgbImage) -> [GrayImage; 3] {
    let (width, height) = frame.dimensions();
    let mut channels = [GrayImage::new(width, height), GrayImage::new(width, height), GrayImage::new(width, height)];
    for y in 0..height {
        for x in 0..width {
            let px = frame.get_pixel(x, y).0;
            for (c, channel) in channels.iter_mut().enumerate() {
                channel.put_pixel(x, y, image::Luma([px[c]]));
            }
        }
    }
    channels
}

/// Binary threshold: pixels `>= level` become white, the rest black.
fn binary_threshold(image: &GrayImage, level: u8) -> GrayImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        px.0[0] = if px.0[0] >= level { 255 } else { 0 };
    }
    out
}

/// Otsu's method: pick the threshold that minimizes intra-class pixel
/// variance, then binarize at it.
fn otsu_threshold(image: &GrayImage) -> GrayImage {
    let mut histogram = [0u32; 256];
    for px in image.pixels() {
        histogram[px.0[0] as usize] += 1;
    }

    let total: u32 = histogram.iter().sum();
    if total == 0 {
        return image.clone();
    }

    let sum_all: f64 = histogram.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut sum_background = 0.0;
    let mut weight_background = 0u32;
    let mut best_level = 0u8;
    let mut best_variance = 0.0;

    for (level, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += level as f64 * count as f64;
        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (sum_all - sum_background) / weight_foreground as f64;

        let between_class_variance = weight_background as f64
            * weight_foreground as f64
            * (mean_background - mean_foreground).powi(2);

        if between_class_variance > best_variance {
            best_variance = between_class_variance;
            best_level = level as u8;
        }
    }

    binary_threshold(image, best_level)
}

/// Decode strategy used by [`decode_precise_channel`]: grayscale, Otsu, or
/// a swept-threshold-plus-blur.
fn decode_precise_channel<R: SymbolReader>(reader: &R, channel: &GrayImage) -> Option<Vec<u8>> {
    // (a) Convert-as-is (no-op here: the channel is already single-channel
    // grayscale) and decode directly.
    if let Some(bytes) = reader.decode(channel) {
        return Some(bytes);
    }

    // (b) Otsu thresholding.
    let otsu = otsu_threshold(channel);
    if let Some(bytes) = reader.decode(&otsu) {
        return Some(bytes);
    }

    // (c) Sweep fixed thresholds, lightly blurring each before decode.
    let mut t = *PRECISE_THRESHOLDS.start();
    while t <= *PRECISE_THRESHOLDS.end() {
        let thresholded = binary_threshold(channel, t as u8);
        let blurred = image::imageops::blur(&thresholded, PRECISE_BLUR_SIGMA);
        if let Some(bytes) = reader.decode(&blurred) {
            return Some(bytes);
        }
        t += PRECISE_THRESHOLD_STEP;
    }

    None
}

/// A two-tier decoder over some [`SymbolDetector`] + [`SymbolReader`]
/// backend.
pub struct TwoTierDecoder<B> {
    backend: B,
}

impl<B: SymbolDetector + SymbolReader> TwoTierDecoder<B> {
    /// Build a decoder around `backend`.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Decode `frame` at the given mode (0 = fast, 1 = precise per
    /// [`crate::rewind::MAX_MODE`]), returning the packet's three layers.
    pub fn decode(&self, frame: &RgbImage, mode: u8) -> Option<Layers> {
        let layers = if mode == 0 { self.decode_fast(frame) } else { self.decode_precise(frame) }?;

        if !preserves_empty_tail_invariant(&layers) {
            debug!("rejecting frame: empty-tail invariant violated across channels");
            return None;
        }

        Some(layers)
    }

    fn decode_fast(&self, frame: &RgbImage) -> Option<Layers> {
        let (width, height) = frame.dimensions();
        let [r, g, b] = split_channels(frame);

        let mut decoded: [Option<Vec<u8>>; 3] = [None, None, None];
        for (i, channel) in [&r, &g, &b].into_iter().enumerate() {
            let bbox = self.backend.detect(channel)?;
            let crop_box = bbox.clamp(width, height).unwrap_or(BoundingBox { x1: 0, y1: 0, x2: width, y2: height });
            let crop = crop_box.crop(channel);
            decoded[i] = self.backend.decode(&crop);
        }

        let [d0, d1, d2] = decoded;
        Some((d0?, d1?, d2?))
    }

    fn decode_precise(&self, frame: &RgbImage) -> Option<Layers> {
        let [r, g, b] = split_channels(frame);
        let d0 = decode_precise_channel(&self.backend, &r)?;
        let d1 = decode_precise_channel(&self.backend, &g)?;
        let d2 = decode_precise_channel(&self.backend, &b)?;
        Some((d0, d1, d2))
    }
}

/// A layer "decodes to empty bytes" when it carries nothing past its
/// 2-byte index prefix. This is legitimate only for the tail of the
/// channel order (R, G, B) — once one layer is payload-empty, every layer
/// after it must be too, matching the right-padding produced by
/// [`crate::packet::makepacket`] on the file's last, possibly-short block.
fn preserves_empty_tail_invariant(layers: &Layers) -> bool {
    const INDEX_PREFIX_LEN: usize = 2;
    let empties = [layers.0.len() <= INDEX_PREFIX_LEN, layers.1.len() <= INDEX_PREFIX_LEN, layers.2.len() <= INDEX_PREFIX_LEN];

    let mut seen_empty = false;
    for empty in empties {
        if seen_empty && !empty {
            return false;
        }
        seen_empty |= empty;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_channels_preserves_per_pixel_values() {
        let mut frame = RgbImage::new(1, 1);
        frame.put_pixel(0, 0, image::Rgb([10, 20, 30]));
        let [r, g, b] = split_channels(&frame);
        assert_eq!(r.get_pixel(0, 0).0[0], 10);
        assert_eq!(g.get_pixel(0, 0).0[0], 20);
        assert_eq!(b.get_pixel(0, 0).0[0], 30);
    }

    #[test]
    fn binary_threshold_splits_at_level() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, image::Luma([10]));
        img.put_pixel(1, 0, image::Luma([200]));
        let out = binary_threshold(&img, 128);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn empty_tail_invariant_allows_trailing_empties() {
        let layers = (vec![0, 1, 2, 3], vec![0, 1], vec![0, 1]);
        assert!(preserves_empty_tail_invariant(&layers));
    }

    #[test]
    fn empty_tail_invariant_rejects_gap() {
        // Middle channel empty, last channel non-empty: a decode error, not
        // a legitimate short final block.
        let layers = (vec![0, 1, 2, 3], vec![0, 1], vec![0, 1, 9]);
        assert!(!preserves_empty_tail_invariant(&layers));
    }

    #[test]
    fn empty_tail_invariant_allows_all_full() {
        let layers = (vec![0, 1, 2], vec![0, 1, 2], vec![0, 1, 2]);
        assert!(preserves_empty_tail_invariant(&layers));
    }
}
