use image::{Luma, RgbImage};

use crate::{
    error::{BlueRoofError, Result},
    types::Mask,
};

/// Hue, saturation and value, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

/// Convert an 8-bit RGB triple to HSV with hue expressed as a fraction of a turn.
///
/// Grey pixels (no chroma) get hue 0 and saturation 0.
#[inline]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

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

    Hsv { h: h.rem_euclid(1.0), s, v: max }
}

/// Inclusive hue band plus a saturation floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HueBand {
    pub lower: f32,
    pub upper: f32,
    pub saturation_min: f32,
}

impl HueBand {
    pub fn new(lower: f32, upper: f32, saturation_min: f32) -> Result<Self> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(lower) || !in_unit(upper) {
            return Err(BlueRoofError::InvalidParameters(format!(
                "hue bounds must lie in [0, 1], got [{lower}, {upper}]"
            )));
        }
        if lower > upper {
            return Err(BlueRoofError::InvalidParameters(format!(
                "hue lower bound {lower} exceeds upper bound {upper}"
            )));
        }
        if !in_unit(saturation_min) {
            return Err(BlueRoofError::InvalidParameters(format!(
                "saturation floor must lie in [0, 1], got {saturation_min}"
            )));
        }
        Ok(Self { lower, upper, saturation_min })
    }

    #[inline]
    pub fn contains(&self, hsv: Hsv) -> bool {
        hsv.h >= self.lower && hsv.h <= self.upper && hsv.s >= self.saturation_min
    }

    /// Build the 0/255 mask of pixels inside the band.
    pub fn mask(&self, image: &RgbImage) -> Mask {
        let mut mask = Mask::new(image.width(), image.height());
        for (x, y, pixel) in image.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            if self.contains(rgb_to_hsv(r, g, b)) {
                mask.put_pixel(x, y, Luma([255u8]));
            }
        }
        mask
    }
}

pub(crate) fn foreground_count(mask: &Mask) -> usize {
    mask.pixels().filter(|p| p.0[0] != 0).count()
}
