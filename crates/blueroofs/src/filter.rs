use geo::{BooleanOps, Intersects};
use geo_types::MultiPolygon;

use crate::{algorithms::repair, types::Feature};

/// Union of a footprint layer, built once and then tested against many candidates.
#[derive(Debug, Clone)]
pub struct FootprintUnion {
    union: MultiPolygon<f64>,
}

impl FootprintUnion {
    pub fn new(footprints: &[Feature]) -> Self {
        Self { union: union_footprints(footprints) }
    }

    pub fn is_empty(&self) -> bool {
        self.union.0.is_empty()
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.union
    }

    pub fn intersects(&self, feature: &Feature) -> bool {
        !self.is_empty() && feature.to_multi_polygon().intersects(&self.union)
    }

    /// Candidates touching the union, in input order.
    pub fn retain(&self, candidates: &[Feature]) -> Vec<Feature> {
        candidates.iter().filter(|c| self.intersects(c)).cloned().collect()
    }
}

/// Merge every footprint into one valid multipolygon.
///
/// Inputs are repaired first and merged pairwise, so each union step works
/// on geometries of similar size.
pub fn union_footprints(footprints: &[Feature]) -> MultiPolygon<f64> {
    let mut layer: Vec<MultiPolygon<f64>> =
        footprints.iter().map(|f| repair(&f.to_multi_polygon())).collect();

    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => a.union(b),
                other => other[0].clone(),
            })
            .collect();
    }

    layer.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

/// Keep the candidates that intersect the union of `footprints`.
pub fn filter(candidates: &[Feature], footprints: &[Feature]) -> Vec<Feature> {
    let union = FootprintUnion::new(footprints);
    let kept = union.retain(candidates);
    tracing::debug!(candidates = candidates.len(), kept = kept.len(), "footprint filter");
    kept
}

/// Footprints with a boolean `blue` property: true when any detection touches them.
pub fn flag_buildings(footprints: &[Feature], detections: &[Feature]) -> Vec<Feature> {
    let detected = FootprintUnion::new(detections);
    footprints
        .iter()
        .map(|footprint| {
            let mut flagged = footprint.clone();
            flagged.set_property("blue", detected.intersects(footprint));
            flagged
        })
        .collect()
}
