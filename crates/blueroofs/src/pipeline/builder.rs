use crate::{
    error::Result,
    pipeline::{BlueRoofDetector, DetectorParams},
};

/// Builder for creating detectors with a fluent API
#[derive(Debug, Clone, Default)]
pub struct DetectorBuilder {
    params: DetectorParams,
}

impl DetectorBuilder {
    /// Start from the default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing parameter set
    pub fn from_params(params: DetectorParams) -> Self {
        Self { params }
    }

    /// Start from the thresholds used for area analysis
    pub fn tuned() -> Self {
        Self::from_params(DetectorParams::tuned())
    }

    pub fn hue_range(mut self, lower: f32, upper: f32) -> Self {
        self.params.hue_range = [lower, upper];
        self
    }

    pub fn saturation_min(mut self, saturation_min: f32) -> Self {
        self.params.saturation_min = saturation_min;
        self
    }

    pub fn segment_blobs(mut self, segment_blobs: bool) -> Self {
        self.params.segment_blobs = segment_blobs;
        self
    }

    pub fn min_size(mut self, min_size: usize) -> Self {
        self.params.min_size = min_size;
        self
    }

    pub fn opening_radius(mut self, radius: u8) -> Self {
        self.params.opening_radius = radius;
        self
    }

    pub fn erosion_radius(mut self, radius: u8) -> Self {
        self.params.erosion_radius = radius;
        self
    }

    /// Validate the parameters and build the detector
    pub fn build(self) -> Result<BlueRoofDetector> {
        BlueRoofDetector::new(self.params)
    }
}
