// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! DDM renderer (C1): compose three layer-barcodes into one RGB image,
//! upscaled to a target pixel size with nearest-neighbor filtering only.
//!
//! Ported from `original_source/.../core.py::dense_datamatrix`
//! (`Image.merge("RGB", submatrices)`); the teacher's `save_data_frame`
//! shows the idiom for building an `image::RgbImage` from raw channel data
//! and saving it as a frame.

use image::{imageops::FilterType, GrayImage, RgbImage};

use crate::packet::Layers;
use crate::rasterize::Rasterizer;
use crate::sizeclass::SizeClassInfo;

/// Compose three single-channel rasterized layers into one RGB image:
/// channel R holds `layers.0`, G holds `layers.1`, B holds `layers.2`.
pub fn compose(layers: (&GrayImage, &GrayImage, &GrayImage)) -> RgbImage {
    let (r, g, b) = layers;
    debug_assert_eq!(r.dimensions(), g.dimensions());
    debug_assert_eq!(r.dimensions(), b.dimensions());

    let (width, height) = r.dimensions();
    let mut out = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let px = [r.get_pixel(x, y).0[0], g.get_pixel(x, y).0[0], b.get_pixel(x, y).0[0]];
            out.put_pixel(x, y, image::Rgb(px));
        }
    }
    out
}

/// Rasterize the three packet layers and compose them into one dense
/// datamatrix image at the symbol's native resolution (`size.dots` square).
pub fn render_packet<R: Rasterizer>(rasterizer: &R, layers: &Layers, size: SizeClassInfo) -> anyhow::Result<RgbImage> {
    let r = rasterizer.rasterize(&layers.0, size)?;
    let g = rasterizer.rasterize(&layers.1, size)?;
    let b = rasterizer.rasterize(&layers.2, size)?;
    Ok(compose((&r, &g, &b)))
}

/// Largest multiple of `dots` not exceeding `shorter_side`. This is the
/// upscale target `T` from §4.4/§6: big enough to fill the display's
/// shorter side, an exact multiple of the symbol size so nearest-neighbor
/// upscaling keeps cell boundaries crisp.
pub fn upscale_target(dots: u32, shorter_side: u32) -> u32 {
    if dots == 0 {
        return 0;
    }
    (shorter_side / dots) * dots
}

/// Upscale a native-resolution dense datamatrix image to `target` pixels a
/// side. Nearest-neighbor only — any smoothing blurs cell boundaries and
/// defeats the decoder.
#[must_use]
pub fn upscale(image: &RgbImage, target: u32) -> RgbImage {
    if target == image.width() && target == image.height() {
        return image.clone();
    }
    image::imageops::resize(image, target, target, FilterType::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upscale_target_floors_to_multiple() {
        assert_eq!(upscale_target(96, 1080), 96 * 11);
        assert_eq!(upscale_target(96, 95), 0);
        assert_eq!(upscale_target(96, 96), 96);
    }

    #[test]
    fn compose_maps_channels_in_rgb_order() {
        let mut r = GrayImage::new(2, 2);
        let mut g = GrayImage::new(2, 2);
        let mut b = GrayImage::new(2, 2);
        r.put_pixel(0, 0, image::Luma([10]));
        g.put_pixel(0, 0, image::Luma([20]));
        b.put_pixel(0, 0, image::Luma([30]));
        let out = compose((&r, &g, &b));
        assert_eq!(out.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn upscale_preserves_pixelation_without_blending() {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        img.put_pixel(1, 0, image::Rgb([0, 255, 0]));
        img.put_pixel(0, 1, image::Rgb([0, 0, 255]));
        img.put_pixel(1, 1, image::Rgb([255, 255, 255]));
        let up = upscale(&img, 4);
        // Nearest-neighbor: each 1x1 source cell becomes a solid 2x2 block,
        // no intermediate colors are introduced.
        assert_eq!(up.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(up.get_pixel(1, 0).0, [255, 0, 0]);
        assert_eq!(up.get_pixel(2, 0).0, [0, 255, 0]);
    }
}
