pub mod builder;

use image::RgbImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    algorithms::{
        ConnectedComponentSegmenter, HueBand, WatershedSegmenter, color::foreground_count,
        open_disk, remove_small_holes, remove_small_objects, segmentation::max_label, vectorize,
    },
    error::Result,
    traits::BlobSegmenter,
    types::{Affine, Feature, LabeledRaster, Mask, SceneImage},
};

/// Tunable thresholds for blue-roof detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DetectorParams {
    #[schemars(description = "Inclusive hue band [lower, upper], as fractions of a full turn")]
    pub hue_range: [f32; 2],
    #[schemars(description = "Minimum saturation (0-1) for a pixel to count as blue")]
    pub saturation_min: f32,
    #[schemars(description = "Split touching roofs with a distance-transform watershed")]
    pub segment_blobs: bool,
    #[schemars(description = "Smallest blob and largest hole, in pixels")]
    pub min_size: usize,
    #[schemars(description = "Disk radius of the noise-removing opening")]
    pub opening_radius: u8,
    #[schemars(description = "Disk radius used to erode blobs down to watershed seeds")]
    pub erosion_radius: u8,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            hue_range: [0.63, 0.67],
            saturation_min: 0.0,
            segment_blobs: true,
            min_size: 120,
            opening_radius: 2,
            erosion_radius: 10,
        }
    }
}

impl DetectorParams {
    /// Thresholds used for per-area analysis runs.
    pub fn tuned() -> Self {
        Self { saturation_min: 0.3, ..Self::default() }
    }
}

/// Hue masking, morphological cleanup, blob labelling and vectorisation.
pub struct BlueRoofDetector {
    params: DetectorParams,
    band: HueBand,
    segmenter: Box<dyn BlobSegmenter>,
}

impl std::fmt::Debug for BlueRoofDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueRoofDetector").field("params", &self.params).finish_non_exhaustive()
    }
}

impl BlueRoofDetector {
    /// Create a new detector builder
    pub fn builder() -> builder::DetectorBuilder {
        builder::DetectorBuilder::new()
    }

    /// Validate `params` and pick the segmenter they ask for.
    pub fn new(params: DetectorParams) -> Result<Self> {
        let [lower, upper] = params.hue_range;
        let band = HueBand::new(lower, upper, params.saturation_min)?;
        let segmenter: Box<dyn BlobSegmenter> = if params.segment_blobs {
            Box::new(WatershedSegmenter { erosion_radius: params.erosion_radius })
        } else {
            Box::new(ConnectedComponentSegmenter)
        };
        Ok(Self { params, band, segmenter })
    }

    /// Swap in a custom segmenter, keeping the colour and cleanup settings.
    pub fn with_segmenter<S>(mut self, segmenter: S) -> Self
    where
        S: BlobSegmenter + 'static,
    {
        self.segmenter = Box::new(segmenter);
        self
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Pixels whose hue lies in the band and whose saturation clears the floor.
    pub fn mask(&self, image: &RgbImage) -> Mask {
        self.band.mask(image)
    }

    /// Opening, then removal of small blobs and small holes.
    pub fn clean(&self, mask: &Mask) -> Mask {
        let opened = open_disk(mask, self.params.opening_radius);
        let without_specks = remove_small_objects(&opened, self.params.min_size);
        remove_small_holes(&without_specks, self.params.min_size)
    }

    /// Run every raster stage and return the final blob labels.
    pub fn label(&self, image: &RgbImage) -> Result<LabeledRaster> {
        // Step 1: Colour mask
        let mask = self.mask(image);

        // Step 2: Morphological cleanup
        let cleaned = self.clean(&mask);

        // Step 3: Separate and label blobs
        let labels = self.segmenter.segment(&cleaned)?;

        tracing::debug!(
            masked = foreground_count(&mask),
            cleaned = foreground_count(&cleaned),
            blobs = max_label(&labels),
            "blue mask stages"
        );
        Ok(labels)
    }

    /// Detect blue blobs in `image` and return them as georeferenced polygons.
    pub fn detect(&self, image: &RgbImage, transform: &Affine) -> Result<Vec<Feature>> {
        let labels = self.label(image)?;

        // Step 4: Vectorise, never emitting background
        Ok(vectorize(&labels, transform, 0))
    }

    pub fn detect_scene(&self, scene: &SceneImage) -> Result<Vec<Feature>> {
        self.detect(&scene.pixels, &scene.transform)
    }

    /// Get information about the detector configuration
    pub fn info(&self) -> String {
        let p = &self.params;
        format!(
            "Detector: hue [{}, {}], saturation >= {}, opening r={}, min size {}, {}",
            p.hue_range[0],
            p.hue_range[1],
            p.saturation_min,
            p.opening_radius,
            p.min_size,
            if p.segment_blobs {
                format!("watershed (erosion r={})", p.erosion_radius)
            } else {
                "connected components".to_string()
            }
        )
    }
}

/// One-shot detection with explicit parameters.
pub fn detect(image: &RgbImage, transform: &Affine, params: &DetectorParams) -> Result<Vec<Feature>> {
    BlueRoofDetector::new(params.clone())?.detect(image, transform)
}
