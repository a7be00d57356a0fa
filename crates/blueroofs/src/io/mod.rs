pub mod geojson;
pub mod scenes;

pub use self::geojson::{CRS84, GeoJsonSource};
pub use self::scenes::{SceneDirectory, SceneSidecar};
