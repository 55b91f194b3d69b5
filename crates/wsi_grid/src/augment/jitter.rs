use image::{Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::{config::ColorJitterConfig, traits::PhotometricTransform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjustment {
    Brightness,
    Contrast,
    Saturation,
    Hue,
}

/// Random brightness, contrast, saturation and hue perturbation.
///
/// Each call draws one factor per adjustment from its bounds and applies the
/// four adjustments in a freshly shuffled order. An adjustment whose bound is
/// zero is skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorJitter {
    pub config: ColorJitterConfig,
}

impl ColorJitter {
    pub fn new(config: ColorJitterConfig) -> Self {
        Self { config }
    }

    fn factor_range(bound: f32) -> Option<(f32, f32)> {
        (bound > 0.0).then(|| ((1.0 - bound).max(0.0), 1.0 + bound))
    }
}

impl Default for ColorJitter {
    fn default() -> Self {
        Self::new(ColorJitterConfig::default())
    }
}

impl PhotometricTransform for ColorJitter {
    fn apply(&self, image: &mut RgbImage, rng: &mut dyn RngCore) {
        let mut order = [
            Adjustment::Brightness,
            Adjustment::Contrast,
            Adjustment::Saturation,
            Adjustment::Hue,
        ];
        order.shuffle(rng);

        for adjustment in order {
            match adjustment {
                Adjustment::Brightness => {
                    if let Some((lo, hi)) = Self::factor_range(self.config.brightness) {
                        adjust_brightness(image, rng.random_range(lo..=hi));
                    }
                }
                Adjustment::Contrast => {
                    if let Some((lo, hi)) = Self::factor_range(self.config.contrast) {
                        adjust_contrast(image, rng.random_range(lo..=hi));
                    }
                }
                Adjustment::Saturation => {
                    if let Some((lo, hi)) = Self::factor_range(self.config.saturation) {
                        adjust_saturation(image, rng.random_range(lo..=hi));
                    }
                }
                Adjustment::Hue => {
                    if self.config.hue > 0.0 {
                        let hue = self.config.hue;
                        adjust_hue(image, rng.random_range(-hue..=hue));
                    }
                }
            }
        }
    }
}

fn luma(pixel: &Rgb<u8>) -> f32 {
    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Blend every channel toward `target(pixel)` by `1 - factor`
fn blend<F>(image: &mut RgbImage, factor: f32, target: F)
where
    F: Fn(&Rgb<u8>) -> f32,
{
    for pixel in image.pixels_mut() {
        let t = target(pixel);
        for channel in pixel.0.iter_mut() {
            *channel = to_u8(factor * *channel as f32 + (1.0 - factor) * t);
        }
    }
}

pub fn adjust_brightness(image: &mut RgbImage, factor: f32) {
    blend(image, factor, |_| 0.0);
}

pub fn adjust_contrast(image: &mut RgbImage, factor: f32) {
    let count = (image.width() as f64 * image.height() as f64).max(1.0);
    let mean = (image.pixels().map(|p| luma(p) as f64).sum::<f64>() / count) as f32;
    blend(image, factor, |_| mean);
}

pub fn adjust_saturation(image: &mut RgbImage, factor: f32) {
    blend(image, factor, luma);
}

/// Rotate every pixel's hue by `shift` turns, `shift` in `[-0.5, 0.5]`
pub fn adjust_hue(image: &mut RgbImage, shift: f32) {
    for pixel in image.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(pixel);
        *pixel = hsv_to_rgb((h + shift).rem_euclid(1.0), s, v);
    }
}

fn rgb_to_hsv(pixel: &Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = pixel.0.map(|c| c as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };

    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match sector as i32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Rgb([to_u8(r * 255.0), to_u8(g * 255.0), to_u8(b * 255.0)])
}
