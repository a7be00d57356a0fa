//! # Blue Roof Detection
//!
//! Finds blue tarp roofing in satellite imagery and counts it over time.
//! Tarps go up on damaged buildings after a storm, so the count of blue
//! roofs per image is a proxy for how recovery is progressing.
//!
//! ## Core Features
//!
//! - **Colour Masking**: Hue band plus saturation floor in HSV space
//! - **Morphological Cleanup**: Opening, small-object removal, small-hole filling
//! - **Blob Splitting**: Marker-controlled watershed on the distance transform
//! - **Vectorisation**: Labelled rasters to repaired, georeferenced polygons
//! - **Footprint Filtering**: Keep only detections that touch a building
//! - **GeoJSON Support**: Local or remote input, CRS84-tagged output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blueroofs::{AreaAnalyzer, GeoJsonSource, Region, SceneDirectory};
//!
//! let analyzer = AreaAnalyzer::new(SceneDirectory::new("data/scenes"))?;
//! let region = Region::new(-66.12, 18.45, -66.10, 18.47);
//! let footprints = GeoJsonSource::infer("data/old_san_juan_buildings.geojson");
//!
//! let table = analyzer.analyze(
//!     "old_san_juan",
//!     &region,
//!     &["scene-0917".to_string(), "scene-1004".to_string()],
//!     Some(&footprints),
//! )?;
//! for row in table.iter() {
//!     println!("{} {} {}", row.date, row.area, row.count);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Single Image
//!
//! ```rust,no_run
//! use blueroofs::{Affine, BlueRoofDetector, io::geojson};
//!
//! let detector = BlueRoofDetector::builder()
//!     .saturation_min(0.3)
//!     .erosion_radius(8)
//!     .build()?;
//! let image = image::open("tile.png")?.to_rgb8();
//! let roofs = detector.detect(&image, &Affine::north_up(-66.12, 18.47, 1e-5, 1e-5))?;
//! geojson::save(&roofs, "tile_roofs.geojson")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod traits;
pub mod algorithms;
pub mod pipeline;
pub mod filter;
pub mod analyzer;
pub mod io;

// Re-exports for convenience
pub use error::{BlueRoofError, Result};
pub use types::{Affine, Correction, Feature, LabeledRaster, Mask, Region, SceneImage};
pub use traits::*;
pub use algorithms::{repair, vectorize};
pub use pipeline::{BlueRoofDetector, DetectorParams, builder::DetectorBuilder, detect};
pub use filter::{FootprintUnion, filter, flag_buildings};
pub use analyzer::{AnalysisRow, AreaAnalyzer, ImageAnalysis, ResultTable, format_area_name};
pub use io::{CRS84, GeoJsonSource, SceneDirectory, SceneSidecar};
