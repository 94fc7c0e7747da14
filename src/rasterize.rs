// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Interfaces the core consumes from the barcode rasterizer and detector.
//!
//! `spec.md` §1 explicitly treats the Data Matrix rasterizer and the
//! camera-side detector as replaceable external libraries, outside the
//! core's budget. This module defines the three small capabilities the
//! core (C1, C5) actually calls, plus one concrete implementation
//! (`RxingBackend`) backed by the `rxing` crate (a pure-Rust ZXing port
//! with Data Matrix read/write support) so the crate is runnable without
//! requiring callers to bring their own barcode library.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{GenericImageView, GrayImage};

use crate::sizeclass::SizeClassInfo;

/// A pixel-space bounding quadrilateral, axis-aligned for simplicity (the
/// detector backends used here report an upright box; a true perspective
/// quad would need four corner points instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    /// Left edge, inclusive.
    pub x1: u32,
    /// Top edge, inclusive.
    pub y1: u32,
    /// Right edge, exclusive.
    pub x2: u32,
    /// Bottom edge, exclusive.
    pub y2: u32,
}

impl BoundingBox {
    /// Clamp this box to the bounds of an image of size `(width, height)`,
    /// returning `None` if the clamp would produce a degenerate
    /// (zero-area or inverted) box. Per §9's open question, callers that
    /// get `None` back should fall back to decoding the full frame.
    #[must_use]
    pub fn clamp(&self, width: u32, height: u32) -> Option<Self> {
        let x1 = self.x1.min(width);
        let y1 = self.y1.min(height);
        let x2 = self.x2.min(width);
        let y2 = self.y2.min(height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self { x1, y1, x2, y2 })
    }

    /// Crop `image` to this box.
    #[must_use]
    pub fn crop(&self, image: &GrayImage) -> GrayImage {
        image::imageops::crop_imm(image, self.x1, self.y1, self.x2 - self.x1, self.y2 - self.y1).to_image()
    }
}

/// Turns a byte string into a single-channel Data Matrix bitmap.
pub trait Rasterizer {
    /// Rasterize `data` into an `size.dots x size.dots` single-channel
    /// bitmap (black/white, stored as 0/255 luma).
    fn rasterize(&self, data: &[u8], size: SizeClassInfo) -> anyhow::Result<GrayImage>;
}

/// Locates a Data Matrix symbol's bounding box in a single-channel frame
/// without fully decoding it (the "fast" detection step, §4.8).
pub trait SymbolDetector {
    /// Return the symbol's bounding box if one is found.
    fn detect(&self, channel: &GrayImage) -> Option<BoundingBox>;
}

/// Decodes a single-channel image (ideally already cropped to one symbol)
/// into its encoded byte payload.
pub trait SymbolReader {
    /// Decode `channel`, returning `None` if no symbol could be read.
    fn decode(&self, channel: &GrayImage) -> Option<Vec<u8>>;
}

/// Rasterizer/detector/reader backed by the `rxing` crate's Data Matrix
/// encoder and reader.
#[derive(Debug, Default, Clone, Copy)]
pub struct RxingBackend;

impl Rasterizer for RxingBackend {
    fn rasterize(&self, data: &[u8], size: SizeClassInfo) -> anyhow::Result<GrayImage> {
        use rxing::{BarcodeFormat, Writer};
        use rxing::common::BitMatrix;
        use rxing::datamatrix::encoder::DataMatrixWriter;

        let writer = DataMatrixWriter {};
        let dots = size.dots as i32;
        // rxing's Data Matrix API is text-based (`&str` in, `getText() -> String`
        // out), which isn't binary-safe for arbitrary packet bytes (the striped
        // index prefix and raw file content, including a SHA3-256 digest, are not
        // valid UTF-8 in general). Route through base64 so every byte survives.
        let matrix: BitMatrix = writer
            .encode(
                &STANDARD.encode(data),
                &BarcodeFormat::DATA_MATRIX,
                dots,
                dots,
            )
            .map_err(|e| anyhow::anyhow!("data matrix encode failed: {e}"))?;

        let mut image = GrayImage::new(size.dots, size.dots);
        for y in 0..size.dots {
            for x in 0..size.dots {
                let bit = matrix.get(x, y);
                image.put_pixel(x, y, image::Luma([if bit { 0 } else { 255 }]));
            }
        }
        Ok(image)
    }
}

/// Attempt a quick decode of `channel` and, on success, return the bounding
/// box implied by the detector's reported finder-pattern points (falls back
/// to the full frame when no points are reported).
fn rxing_detect_and_decode(channel: &GrayImage, try_harder: bool) -> Option<(BoundingBox, Vec<u8>)> {
    use rxing::{
        common::HybridBinarizer, BarcodeFormat, BinaryBitmap, DecodeHintType, DecodeHintValue,
        DecodingHintDictionary, Luma8LuminanceSource, Reader,
    };
    use rxing::datamatrix::DataMatrixReader;

    let (width, height) = channel.dimensions();
    let source = Luma8LuminanceSource::new(channel.clone().into_raw(), width, height);
    let mut bitmap = BinaryBitmap::new(HybridBinarizer::new(source));

    let mut hints: DecodingHintDictionary = DecodingHintDictionary::new();
    hints.insert(DecodeHintType::TRY_HARDER, DecodeHintValue::TryHarder(try_harder));
    hints.insert(
        DecodeHintType::POSSIBLE_FORMATS,
        DecodeHintValue::PossibleFormats([BarcodeFormat::DATA_MATRIX].into_iter().collect()),
    );

    let mut reader = DataMatrixReader::default();
    let result = reader.decode_with_hints(&mut bitmap, &hints).ok()?;

    let points = result.getResultPoints();
    let bbox = if points.is_empty() {
        BoundingBox { x1: 0, y1: 0, x2: width, y2: height }
    } else {
        let xs = points.iter().map(rxing::ResultPoint::getX);
        let ys = points.iter().map(rxing::ResultPoint::getY);
        let (min_x, max_x) = xs.fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let (min_y, max_y) = ys.fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
        BoundingBox {
            x1: min_x.floor().max(0.0) as u32,
            y1: min_y.floor().max(0.0) as u32,
            x2: (max_x.ceil() as u32).max(1),
            y2: (max_y.ceil() as u32).max(1),
        }
    };

    let bytes = STANDARD.decode(result.getText()).ok()?;
    Some((bbox, bytes))
}

impl SymbolDetector for RxingBackend {
    fn detect(&self, channel: &GrayImage) -> Option<BoundingBox> {
        rxing_detect_and_decode(channel, false).map(|(bbox, _)| bbox)
    }
}

impl SymbolReader for RxingBackend {
    fn decode(&self, channel: &GrayImage) -> Option<Vec<u8>> {
        rxing_detect_and_decode(channel, true).map(|(_, bytes)| bytes)
    }
}
