use image::Luma;
use imageproc::{
    morphology::{self, Mask as StructuringElement},
    region_labelling::{Connectivity, connected_components},
};

use crate::types::Mask;

/// Binary opening with a disk of the given radius. Radius 0 is a no-op.
pub fn open_disk(mask: &Mask, radius: u8) -> Mask {
    if radius == 0 {
        return mask.clone();
    }
    morphology::grayscale_open(mask, &StructuringElement::disk(radius))
}

/// Binary erosion with a disk of the given radius.
///
/// Pixels outside the image are ignored, so blobs touching the border are
/// not eaten from that side.
pub fn erode_disk(mask: &Mask, radius: u8) -> Mask {
    if radius == 0 {
        return mask.clone();
    }
    morphology::grayscale_erode(mask, &StructuringElement::disk(radius))
}

/// Clear 4-connected foreground components with fewer than `min_size` pixels.
pub fn remove_small_objects(mask: &Mask, min_size: usize) -> Mask {
    if min_size <= 1 {
        return mask.clone();
    }
    let labels = connected_components(mask, Connectivity::Four, Luma([0u8]));
    let max_label = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut sizes = vec![0usize; max_label + 1];
    for p in labels.pixels() {
        sizes[p.0[0] as usize] += 1;
    }

    let mut cleaned = mask.clone();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0] as usize;
        if label != 0 && sizes[label] < min_size {
            cleaned.put_pixel(x, y, Luma([0u8]));
        }
    }
    cleaned
}

/// Fill 4-connected background components with fewer than `min_size` pixels.
///
/// Background runs touching the image border count as holes too.
pub fn remove_small_holes(mask: &Mask, min_size: usize) -> Mask {
    let inverted = invert(mask);
    invert(&remove_small_objects(&inverted, min_size))
}

pub fn invert(mask: &Mask) -> Mask {
    let mut result = mask.clone();
    for pixel in result.pixels_mut() {
        pixel.0[0] = if pixel.0[0] == 0 { 255 } else { 0 };
    }
    result
}
