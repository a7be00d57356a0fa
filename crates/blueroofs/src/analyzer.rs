use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    error::{BlueRoofError, Result},
    filter::FootprintUnion,
    io::geojson::{self, GeoJsonSource},
    pipeline::{BlueRoofDetector, DetectorParams},
    traits::ImageSource,
    types::{Correction, Feature, Region, SceneImage},
};

/// One analysed image: how many blue roofs it shows, and when it was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRow {
    pub area: String,
    pub image_id: String,
    pub date: NaiveDate,
    pub count: usize,
}

/// Rows from one or more areas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultTable {
    rows: Vec<AnalysisRow>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: AnalysisRow) {
        self.rows.push(row);
    }

    /// Append another table, e.g. to compare several areas.
    pub fn extend(&mut self, other: ResultTable) {
        self.rows.extend(other.rows);
    }

    /// Stable ascending sort by acquisition date.
    pub fn sort_by_date(&mut self) {
        self.rows.sort_by_key(|row| row.date);
    }

    pub fn rows(&self) -> &[AnalysisRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AnalysisRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl FromIterator<AnalysisRow> for ResultTable {
    fn from_iter<I: IntoIterator<Item = AnalysisRow>>(iter: I) -> Self {
        Self { rows: iter.into_iter().collect() }
    }
}

impl IntoIterator for ResultTable {
    type Item = AnalysisRow;
    type IntoIter = std::vec::IntoIter<AnalysisRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Everything produced for a single image.
#[derive(Debug, Clone)]
pub struct ImageAnalysis {
    pub row: AnalysisRow,
    /// Detected roofs after footprint filtering
    pub features: Vec<Feature>,
    pub correction: Correction,
}

/// `"san_juan_old"` -> `"San Juan Old"`.
///
/// Underscores become spaces; each run of letters is capitalised and the
/// rest of the run lowercased.
pub fn format_area_name(name: &str) -> String {
    let mut formatted = String::with_capacity(name.len());
    let mut in_word = false;
    for ch in name.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_alphabetic() {
            if in_word {
                formatted.extend(ch.to_lowercase());
            } else {
                formatted.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            formatted.push(ch);
            in_word = false;
        }
    }
    formatted
}

/// Counts blue roofs across a series of images of one area.
#[derive(Debug)]
pub struct AreaAnalyzer<S> {
    source: S,
    detector: BlueRoofDetector,
}

impl<S: ImageSource> AreaAnalyzer<S> {
    /// Analyzer running the detector with [`DetectorParams::tuned`].
    pub fn new(source: S) -> Result<Self> {
        Ok(Self { source, detector: BlueRoofDetector::new(DetectorParams::tuned())? })
    }

    pub fn with_detector(source: S, detector: BlueRoofDetector) -> Self {
        Self { source, detector }
    }

    pub fn detector(&self) -> &BlueRoofDetector {
        &self.detector
    }

    /// Colour-corrected pixels if the source has them, raw pixels otherwise.
    pub fn fetch_with_fallback(&self, image_id: &str, region: &Region) -> Result<SceneImage> {
        match self.source.fetch(image_id, region, Correction::Corrected) {
            Err(BlueRoofError::CorrectionUnavailable { .. }) => {
                tracing::warn!(image_id, "colour correction unavailable, using raw pixels");
                self.source.fetch(image_id, region, Correction::Raw)
            }
            other => other,
        }
    }

    /// Detect, filter and count blue roofs in one image.
    pub fn analyze_image(
        &self,
        area_name: &str,
        region: &Region,
        image_id: &str,
        footprints: Option<&FootprintUnion>,
    ) -> Result<ImageAnalysis> {
        let scene = self.fetch_with_fallback(image_id, region)?;
        let detected = self.detector.detect_scene(&scene)?;
        let features = match footprints {
            Some(union) => union.retain(&detected),
            None => detected,
        };

        let row = AnalysisRow {
            area: format_area_name(area_name),
            image_id: image_id.to_string(),
            date: scene.acquisition_date(),
            count: features.len(),
        };
        tracing::info!(
            area = %row.area,
            image_id,
            date = %row.date,
            count = row.count,
            correction = %scene.correction,
            "analysed image"
        );

        Ok(ImageAnalysis { row, features, correction: scene.correction })
    }

    /// Analyse every image in order, handing each result to `on_image`.
    ///
    /// The footprint union is built once for the whole area. The first
    /// failing image aborts the area. Rows come back sorted by date.
    pub fn analyze_with<F>(
        &self,
        area_name: &str,
        region: &Region,
        image_ids: &[String],
        footprints: Option<&[Feature]>,
        mut on_image: F,
    ) -> Result<ResultTable>
    where
        F: FnMut(&ImageAnalysis) -> Result<()>,
    {
        let union = footprints.map(FootprintUnion::new);

        let mut table = ResultTable::new();
        for image_id in image_ids {
            let analysis = self.analyze_image(area_name, region, image_id, union.as_ref())?;
            on_image(&analysis)?;
            table.push(analysis.row);
        }
        table.sort_by_date();

        tracing::info!(area = area_name, images = table.len(), "area finished");
        Ok(table)
    }

    /// Analyse every image of one area, loading footprints (if any) up front.
    pub fn analyze(
        &self,
        area_name: &str,
        region: &Region,
        image_ids: &[String],
        footprint_source: Option<&GeoJsonSource>,
    ) -> Result<ResultTable> {
        let footprints = match footprint_source {
            Some(source) => Some(geojson::load(source)?.1),
            None => None,
        };
        self.analyze_with(area_name, region, image_ids, footprints.as_deref(), |_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Affine;
    use chrono::{TimeZone, Utc};
    use image::{Rgb, RgbImage};
    use std::{cell::RefCell, collections::HashMap, io::Write};

    const TARP: Rgb<u8> = Rgb([30, 60, 220]);
    const ROOF: Rgb<u8> = Rgb([120, 115, 110]);

    struct Catalog {
        scenes: HashMap<String, (u32, u32, bool)>, // day, tarp count, corrected available
        requests: RefCell<Vec<(String, Correction)>>,
    }

    impl Catalog {
        fn new(scenes: &[(&str, u32, u32, bool)]) -> Self {
            Self {
                scenes: scenes
                    .iter()
                    .map(|(id, day, tarps, corrected)| (id.to_string(), (*day, *tarps, *corrected)))
                    .collect(),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl ImageSource for Catalog {
        fn fetch(&self, image_id: &str, _region: &Region, correction: Correction) -> Result<SceneImage> {
            self.requests.borrow_mut().push((image_id.to_string(), correction));
            let &(day, tarps, corrected) = self
                .scenes
                .get(image_id)
                .ok_or_else(|| BlueRoofError::not_found(image_id))?;
            if correction == Correction::Corrected && !corrected {
                return Err(BlueRoofError::CorrectionUnavailable { image_id: image_id.into() });
            }

            let mut pixels = RgbImage::from_pixel(50 * tarps.max(1), 50, ROOF);
            for i in 0..tarps {
                for y in 10..40 {
                    for x in (50 * i + 10)..(50 * i + 40) {
                        pixels.put_pixel(x, y, TARP);
                    }
                }
            }
            Ok(SceneImage {
                image_id: image_id.to_string(),
                pixels,
                transform: Affine::north_up(0.0, 50.0, 1.0, 1.0),
                acquired: Utc.with_ymd_and_hms(2017, 10, day, 15, 0, 0).unwrap(),
                correction,
            })
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn region() -> Region {
        Region::new(0.0, 0.0, 200.0, 50.0)
    }

    #[test]
    fn area_names_are_title_cased() {
        assert_eq!(format_area_name("san_juan_old"), "San Juan Old");
        assert_eq!(format_area_name("CAROLINA"), "Carolina");
        assert_eq!(format_area_name("zone_3b"), "Zone 3B");
    }

    #[test]
    fn rows_are_sorted_by_date() {
        let catalog = Catalog::new(&[("late", 20, 2, true), ("early", 3, 1, true), ("mid", 9, 0, true)]);
        let analyzer = AreaAnalyzer::new(&catalog).unwrap();
        let table = analyzer.analyze("old_san_juan", &region(), &ids(&["late", "early", "mid"]), None).unwrap();

        let order: Vec<_> = table.iter().map(|r| (r.image_id.as_str(), r.count)).collect();
        assert_eq!(order, vec![("early", 1), ("mid", 0), ("late", 2)]);
        assert!(table.rows().windows(2).all(|w| w[0].date <= w[1].date));
        assert!(table.iter().all(|r| r.area == "Old San Juan"));
    }

    #[test]
    fn falls_back_to_raw_when_correction_is_unavailable() {
        let catalog = Catalog::new(&[("scene", 1, 1, false)]);
        let analyzer = AreaAnalyzer::new(&catalog).unwrap();
        let analysis = analyzer.analyze_image("a", &region(), "scene", None).unwrap();

        assert_eq!(analysis.correction, Correction::Raw);
        assert_eq!(analysis.row.count, 1);
        assert_eq!(
            *catalog.requests.borrow(),
            vec![("scene".to_string(), Correction::Corrected), ("scene".to_string(), Correction::Raw)]
        );
    }

    #[test]
    fn corrected_pixels_are_used_when_available() {
        let catalog = Catalog::new(&[("scene", 1, 1, true)]);
        let analyzer = AreaAnalyzer::new(&catalog).unwrap();
        let analysis = analyzer.analyze_image("a", &region(), "scene", None).unwrap();
        assert_eq!(analysis.correction, Correction::Corrected);
        assert_eq!(catalog.requests.borrow().len(), 1);
    }

    #[test]
    fn other_failures_abort_the_area() {
        let catalog = Catalog::new(&[("good", 1, 1, true)]);
        let analyzer = AreaAnalyzer::new(&catalog).unwrap();
        let result = analyzer.analyze("a", &region(), &ids(&["good", "missing"]), None);
        assert!(matches!(result, Err(BlueRoofError::NotFound { .. })));
        // no raw retry after a non-correction failure
        assert_eq!(catalog.requests.borrow().last(), Some(&("missing".to_string(), Correction::Corrected)));
    }

    #[test]
    fn footprints_restrict_counts() {
        // one building under the first tarp only (tarp spans x 10..40, y 10..40)
        let buildings = r#"{"type": "FeatureCollection", "features": [{
            "type": "Feature", "properties": {},
            "geometry": {"type": "Polygon", "coordinates": [[[15, 15], [25, 15], [25, 25], [15, 25], [15, 15]]]}
        }]}"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(buildings.as_bytes()).unwrap();
        let source = GeoJsonSource::Local(file.path().to_path_buf());

        let catalog = Catalog::new(&[("scene", 1, 3, true)]);
        let analyzer = AreaAnalyzer::new(&catalog).unwrap();
        let unfiltered = analyzer.analyze("a", &region(), &ids(&["scene"]), None).unwrap();
        let filtered = analyzer.analyze("a", &region(), &ids(&["scene"]), Some(&source)).unwrap();
        assert_eq!(unfiltered.rows()[0].count, 3);
        assert_eq!(filtered.rows()[0].count, 1);
    }

    #[test]
    fn every_image_reaches_the_callback() {
        let catalog = Catalog::new(&[("a", 2, 1, true), ("b", 1, 2, false)]);
        let analyzer = AreaAnalyzer::new(&catalog).unwrap();
        let mut seen = Vec::new();
        analyzer
            .analyze_with("x", &region(), &ids(&["a", "b"]), None, |analysis| {
                seen.push((analysis.row.image_id.clone(), analysis.features.len()));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[test]
    fn tables_concatenate_and_serialize() {
        let row = |area: &str, day| AnalysisRow {
            area: area.into(),
            image_id: format!("{area}-{day}"),
            date: NaiveDate::from_ymd_opt(2017, 10, day).unwrap(),
            count: 1,
        };
        let mut table: ResultTable = [row("A", 5)].into_iter().collect();
        table.extend([row("B", 2)].into_iter().collect());
        table.sort_by_date();
        assert_eq!(table.rows()[0].area, "B");

        let json: serde_json::Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["date"], "2017-10-02");
        assert_eq!(json[1]["image_id"], "A-5");
    }
}
