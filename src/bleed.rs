//! Mirrored bleed synthesis.
//!
//! The card is resized to its exact trim size in pixels and framed by a
//! margin built from its own edges: edge strips flipped outward, corner
//! blocks rotated by 180 degrees.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::path::Path;

use crate::error::{Error, Result};

/// Raster pair drawn for one card.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    /// Card plus mirrored margin, `bleed_px` wider on every side.
    pub bleed: RgbImage,
    /// The card at its trim size.
    pub card: RgbImage,
}

/// Pixel geometry the synthesizer works to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub card_w: u32,
    pub card_h: u32,
    pub bleed: u32,
}

impl Target {
    pub fn bleed_size(&self) -> (u32, u32) {
        (self.card_w + 2 * self.bleed, self.card_h + 2 * self.bleed)
    }
}

/// Decode `path` and synthesize its bleed. The file handle is closed before
/// this returns.
pub fn load(path: &Path, target: Target) -> Result<ProcessedImage> {
    let source = image::open(path).map_err(|source| Error::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(synthesize(&source, target))
}

pub fn synthesize(source: &DynamicImage, target: Target) -> ProcessedImage {
    let Target { card_w, card_h, .. } = target;
    let rgb = source.to_rgb8();
    let card = if rgb.dimensions() == (card_w, card_h) {
        rgb
    } else {
        imageops::resize(&rgb, card_w, card_h, FilterType::Lanczos3)
    };
    let bleed = mirror_bleed(&card, target.bleed);
    debug_assert_eq!(bleed.dimensions(), target.bleed_size());
    ProcessedImage { bleed, card }
}

/// Frame `card` with a `b`-pixel mirrored margin.
///
/// Edge bands take only the strip along the card's full length and corner
/// cells only the `b` x `b` block, so every output pixel is written once.
pub fn mirror_bleed(card: &RgbImage, b: u32) -> RgbImage {
    let (w, h) = card.dimensions();
    // strips are cut from the card itself
    let b = b.min(w).min(h);
    let mut out = RgbImage::new(w + 2 * b, h + 2 * b);
    paste(&mut out, card, b, b);
    if b == 0 {
        return out;
    }

    let left = imageops::crop_imm(card, 0, 0, b, h).to_image();
    let right = imageops::crop_imm(card, w - b, 0, b, h).to_image();
    let top = imageops::crop_imm(card, 0, 0, w, b).to_image();
    let bottom = imageops::crop_imm(card, 0, h - b, w, b).to_image();
    paste(&mut out, &imageops::flip_horizontal(&left), 0, b);
    paste(&mut out, &imageops::flip_horizontal(&right), b + w, b);
    paste(&mut out, &imageops::flip_vertical(&top), b, 0);
    paste(&mut out, &imageops::flip_vertical(&bottom), b, b + h);

    let corners = [
        (0, 0, 0, 0),
        (w - b, 0, b + w, 0),
        (0, h - b, 0, b + h),
        (w - b, h - b, b + w, b + h),
    ];
    for (sx, sy, dx, dy) in corners {
        let block = imageops::crop_imm(card, sx, sy, b, b).to_image();
        paste(&mut out, &imageops::rotate180(&block), dx, dy);
    }
    out
}

fn paste(dst: &mut RgbImage, src: &RgbImage, x: u32, y: u32) {
    imageops::replace(dst, src, x as i64, y as i64);
}
