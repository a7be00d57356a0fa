use crate::{
    error::Result,
    types::{Correction, LabeledRaster, Mask, Region, SceneImage},
};

/// Provider of catalog imagery.
///
/// A `Correction::Corrected` request that cannot be served must fail with
/// [`BlueRoofError::CorrectionUnavailable`](crate::BlueRoofError::CorrectionUnavailable)
/// so that callers can retry with raw pixels; every other failure is final.
pub trait ImageSource {
    fn fetch(&self, image_id: &str, region: &Region, correction: Correction) -> Result<SceneImage>;
}

impl<S: ImageSource + ?Sized> ImageSource for &S {
    fn fetch(&self, image_id: &str, region: &Region, correction: Correction) -> Result<SceneImage> {
        (**self).fetch(image_id, region, correction)
    }
}

impl<S: ImageSource + ?Sized> ImageSource for Box<S> {
    fn fetch(&self, image_id: &str, region: &Region, correction: Correction) -> Result<SceneImage> {
        (**self).fetch(image_id, region, correction)
    }
}

/// Trait for turning a cleaned binary mask into labelled blobs
pub trait BlobSegmenter: Send + Sync {
    /// Label the foreground of `mask`; background stays 0
    fn segment(&self, mask: &Mask) -> Result<LabeledRaster>;
}
