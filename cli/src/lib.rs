use blueroofs::{DetectorParams, GeoJsonSource, Region};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Plan has no areas")]
    NoAreas,
    #[error("Area '{0}' is listed more than once")]
    DuplicateArea(String),
    #[error("Area '{0}' has no image ids")]
    NoImages(String),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// One area of interest and the catalog images that cover it
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AreaPlan {
    /// Machine name, e.g. `old_san_juan`; rows show it title-cased
    pub name: String,
    /// Bounding box `[min_x, min_y, max_x, max_y]` in geographic coordinates
    #[schemars(with = "[f64; 4]")]
    pub region: Region,
    /// Images to analyse, any order
    pub image_ids: Vec<String>,
    /// Building footprints used to discard detections off any roof
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footprints: Option<GeoJsonSource>,
}

/// Analysis run configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AnalysisPlan {
    /// Directory holding `<id>.json` sidecars and `<id>.{corrected,raw}.<ext>` rasters
    pub scenes_dir: PathBuf,
    /// Where results and GeoJSON layers are written
    pub output_dir: PathBuf,
    /// Detector override; the tuned thresholds are used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<DetectorParams>,
    pub areas: Vec<AreaPlan>,
}

/// On-disk plan formats, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Toml,
    Json,
}

impl PlanFormat {
    pub fn from_path(path: &Path) -> Result<Self, PlanError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(PlanError::UnsupportedFileFormat),
        }
    }

    /// Deserialize and validate; every load goes through here
    pub fn parse(self, content: &str) -> Result<AnalysisPlan, PlanError> {
        let plan: AnalysisPlan = match self {
            Self::Toml => toml::from_str(content)?,
            Self::Json => serde_json::from_str(content)?,
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn render(self, plan: &AnalysisPlan) -> Result<String, PlanError> {
        Ok(match self {
            Self::Toml => toml::to_string_pretty(plan)?,
            Self::Json => serde_json::to_string_pretty(plan)?,
        })
    }
}

impl AnalysisPlan {
    /// Load a plan, picking the format from the file extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let format = PlanFormat::from_path(path)?;
        format.parse(&fs::read_to_string(path)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, PlanError> {
        PlanFormat::Toml.parse(content)
    }

    pub fn from_json(content: &str) -> Result<Self, PlanError> {
        PlanFormat::Json.parse(content)
    }

    /// Write the plan in the format named by the file extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PlanError> {
        let path = path.as_ref();
        let content = PlanFormat::from_path(path)?.render(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, PlanError> {
        PlanFormat::Toml.render(self)
    }

    pub fn to_json(&self) -> Result<String, PlanError> {
        PlanFormat::Json.render(self)
    }

    /// Every area named once, each with at least one image
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.areas.is_empty() {
            return Err(PlanError::NoAreas);
        }
        let mut seen = HashSet::new();
        for area in &self.areas {
            if !seen.insert(area.name.as_str()) {
                return Err(PlanError::DuplicateArea(area.name.clone()));
            }
            if area.image_ids.is_empty() {
                return Err(PlanError::NoImages(area.name.clone()));
            }
        }
        Ok(())
    }

    pub fn detector_params(&self) -> DetectorParams {
        self.detector.clone().unwrap_or_else(DetectorParams::tuned)
    }

    /// JSON schema of the plan format
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisPlan)
    }
}

/// Area name for a one-off detection: the explicit name, else the scene directory's name.
pub fn area_label(explicit: Option<&str>, scenes_dir: &Path) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| {
            scenes_dir
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "scenes".to_string())
}
