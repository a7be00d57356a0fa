use std::{cmp::Ordering, collections::BinaryHeap};

use image::{ImageBuffer, Luma};
use imageproc::{
    distance_transform::euclidean_squared_distance_transform,
    region_labelling::{Connectivity, connected_components},
};

use crate::{
    algorithms::morphology::{erode_disk, invert},
    error::{BlueRoofError, Result},
    traits::BlobSegmenter,
    types::{LabeledRaster, Mask},
};

/// Relief surface flooded by the watershed, lowest values first.
pub type Surface = ImageBuffer<Luma<f64>, Vec<f64>>;

/// Plain 4-connected labelling of the mask, no blob separation.
#[derive(Debug, Clone, Default)]
pub struct ConnectedComponentSegmenter;

impl BlobSegmenter for ConnectedComponentSegmenter {
    fn segment(&self, mask: &Mask) -> Result<LabeledRaster> {
        Ok(connected_components(mask, Connectivity::Four, Luma([0u8])))
    }
}

/// Splits touching blobs by flooding the negated distance-to-background
/// field from eroded cores.
#[derive(Debug, Clone)]
pub struct WatershedSegmenter {
    pub erosion_radius: u8,
}

impl Default for WatershedSegmenter {
    fn default() -> Self {
        Self { erosion_radius: 10 }
    }
}

impl BlobSegmenter for WatershedSegmenter {
    fn segment(&self, mask: &Mask) -> Result<LabeledRaster> {
        let cores = erode_disk(mask, self.erosion_radius);
        let markers = connected_components(&cores, Connectivity::Eight, Luma([0u8]));

        let surface = negated_distance(mask);
        let basins = watershed(&surface, &markers, mask)?;

        // Shift basins up by one inside the mask so that pixels no marker
        // reached still form their own blob instead of vanishing.
        let mut combined = LabeledRaster::new(mask.width(), mask.height());
        for (x, y, pixel) in combined.enumerate_pixels_mut() {
            if mask.get_pixel(x, y).0[0] != 0 {
                pixel.0[0] = basins.get_pixel(x, y).0[0] + 1;
            }
        }

        let labels = connected_components(&combined, Connectivity::Four, Luma([0u32]));
        tracing::debug!(
            cores = max_label(&markers),
            blobs = max_label(&labels),
            "watershed segmentation"
        );
        Ok(labels)
    }
}

/// Negated Euclidean distance from each mask pixel to the nearest background pixel.
pub fn negated_distance(mask: &Mask) -> Surface {
    let squared = euclidean_squared_distance_transform(&invert(mask));
    let mut surface = Surface::new(mask.width(), mask.height());
    for (x, y, pixel) in surface.enumerate_pixels_mut() {
        pixel.0[0] = -squared.get_pixel(x, y).0[0].sqrt();
    }
    surface
}

pub(crate) fn max_label(labels: &LabeledRaster) -> u32 {
    labels.pixels().map(|p| p.0[0]).max().unwrap_or(0)
}

#[derive(Debug)]
struct FloodItem {
    level: f64,
    age: u64,
    x: u32,
    y: u32,
}

impl PartialEq for FloodItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloodItem {}

impl PartialOrd for FloodItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloodItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: lowest level first, then first-in first-out
        other
            .level
            .total_cmp(&self.level)
            .then_with(|| other.age.cmp(&self.age))
    }
}

/// Marker-controlled watershed over `surface`, restricted to nonzero `mask` pixels.
///
/// Each marker label grows into 4-connected unlabelled mask pixels in order of
/// increasing surface level; ties go to the pixel queued first. Mask pixels
/// unreachable from any marker stay 0, as does everything outside the mask.
pub fn watershed(surface: &Surface, markers: &LabeledRaster, mask: &Mask) -> Result<LabeledRaster> {
    if surface.dimensions() != markers.dimensions() || surface.dimensions() != mask.dimensions() {
        return Err(BlueRoofError::InvalidParameters(format!(
            "watershed inputs differ in size: surface {:?}, markers {:?}, mask {:?}",
            surface.dimensions(),
            markers.dimensions(),
            mask.dimensions()
        )));
    }

    let (width, height) = mask.dimensions();
    let mut labels = LabeledRaster::new(width, height);
    let mut heap = BinaryHeap::new();
    let mut age = 0u64;

    for (x, y, marker) in markers.enumerate_pixels() {
        let label = marker.0[0];
        if label != 0 && mask.get_pixel(x, y).0[0] != 0 {
            labels.put_pixel(x, y, Luma([label]));
            heap.push(FloodItem { level: surface.get_pixel(x, y).0[0], age, x, y });
            age += 1;
        }
    }

    while let Some(FloodItem { x, y, .. }) = heap.pop() {
        let label = labels.get_pixel(x, y).0[0];
        for (nx, ny) in neighbours4(x, y, width, height) {
            if mask.get_pixel(nx, ny).0[0] == 0 || labels.get_pixel(nx, ny).0[0] != 0 {
                continue;
            }
            labels.put_pixel(nx, ny, Luma([label]));
            heap.push(FloodItem { level: surface.get_pixel(nx, ny).0[0], age, x: nx, y: ny });
            age += 1;
        }
    }

    Ok(labels)
}

fn neighbours4(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let x = x as i64;
    let y = y as i64;
    [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
        .into_iter()
        .filter(move |&(nx, ny)| nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64)
        .map(|(nx, ny)| (nx as u32, ny as u32))
}
