use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::imageops;
use serde::{Deserialize, Serialize};

use crate::{
    error::{BlueRoofError, Result},
    traits::ImageSource,
    types::{Affine, Correction, Region, SceneImage},
};

const RASTER_EXTENSIONS: [&str; 5] = ["png", "tif", "tiff", "jpg", "jpeg"];

/// Metadata stored next to each scene as `<image_id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSidecar {
    /// Acquisition time; any RFC 3339 offset is normalised to UTC.
    pub acquired: DateTime<Utc>,
    /// Pixel-to-map transform of the full raster
    pub transform: Affine,
}

/// Catalog imagery laid out on disk.
///
/// ```text
/// <root>/<image_id>.json                sidecar (acquisition time, transform)
/// <root>/<image_id>.corrected.<ext>     colour-corrected pixels, optional
/// <root>/<image_id>.raw.<ext>           uncorrected pixels
/// ```
#[derive(Debug, Clone)]
pub struct SceneDirectory {
    root: PathBuf,
}

impl SceneDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sidecar(&self, image_id: &str) -> Result<SceneSidecar> {
        let path = self.root.join(format!("{image_id}.json"));
        if !path.is_file() {
            return Err(BlueRoofError::not_found(path.display().to_string()));
        }
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|e| {
            BlueRoofError::unsupported(format!("malformed sidecar {}: {e}", path.display()))
        })
    }

    /// Write a sidecar and raster for `image_id`, e.g. when staging downloads.
    pub fn store(
        &self,
        image_id: &str,
        sidecar: &SceneSidecar,
        pixels: &image::RgbImage,
        correction: Correction,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let sidecar_path = self.root.join(format!("{image_id}.json"));
        std::fs::write(sidecar_path, serde_json::to_string_pretty(sidecar)?)?;
        pixels.save(self.root.join(format!("{image_id}.{correction}.png")))?;
        Ok(())
    }

    fn raster_path(&self, image_id: &str, correction: Correction) -> Option<PathBuf> {
        RASTER_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{image_id}.{correction}.{ext}")))
            .find(|path| path.is_file())
    }
}

impl ImageSource for SceneDirectory {
    fn fetch(&self, image_id: &str, region: &Region, correction: Correction) -> Result<SceneImage> {
        let sidecar = self.sidecar(image_id)?;
        let path = match (self.raster_path(image_id, correction), correction) {
            (Some(path), _) => path,
            (None, Correction::Corrected) => {
                return Err(BlueRoofError::CorrectionUnavailable { image_id: image_id.to_string() });
            }
            (None, Correction::Raw) => {
                return Err(BlueRoofError::not_found(format!(
                    "{} raster for image {image_id}",
                    correction
                )));
            }
        };

        let full = image::open(&path)?.to_rgb8();
        let (x0, y0, width, height) = pixel_window(&sidecar.transform, region, full.dimensions())
            .ok_or_else(|| {
                BlueRoofError::unsupported(format!(
                    "region {:?} does not overlap image {image_id}",
                    <[f64; 4]>::from(*region)
                ))
            })?;
        let pixels = imageops::crop_imm(&full, x0, y0, width, height).to_image();

        tracing::debug!(
            image_id,
            %correction,
            path = %path.display(),
            window = ?(x0, y0, width, height),
            "read scene"
        );

        Ok(SceneImage {
            image_id: image_id.to_string(),
            pixels,
            transform: sidecar.transform.shifted(x0 as f64, y0 as f64),
            acquired: sidecar.acquired,
            correction,
        })
    }
}

/// Pixel window `(x, y, width, height)` covering `region`, clamped to the raster.
fn pixel_window(transform: &Affine, region: &Region, (width, height): (u32, u32)) -> Option<(u32, u32, u32, u32)> {
    let inverse = transform.inverse()?;
    let pixels: Vec<_> = region.corners().iter().map(|c| inverse.apply(c.x, c.y)).collect();

    let min_col = pixels.iter().map(|p| p.x).fold(f64::INFINITY, f64::min).floor();
    let max_col = pixels.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max).ceil();
    let min_row = pixels.iter().map(|p| p.y).fold(f64::INFINITY, f64::min).floor();
    let max_row = pixels.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max).ceil();

    let x0 = min_col.clamp(0.0, width as f64) as u32;
    let x1 = max_col.clamp(0.0, width as f64) as u32;
    let y0 = min_row.clamp(0.0, height as f64) as u32;
    let y1 = max_row.clamp(0.0, height as f64) as u32;

    (x1 > x0 && y1 > y0).then(|| (x0, y0, x1 - x0, y1 - y0))
}
