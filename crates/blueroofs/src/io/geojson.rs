use std::{fmt, path::{Path, PathBuf}, str::FromStr};

use geo_types::Geometry;
use geojson::{FeatureCollection, JsonObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::{BlueRoofError, Result},
    types::Feature,
};

/// Coordinate reference system written on every exported collection.
pub const CRS84: &str = "urn:ogc:def:crs:OGC:1.3:CRS84";

/// Where a GeoJSON document lives. Decided once, where the location enters the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GeoJsonSource {
    /// Path on the local filesystem
    Local(PathBuf),
    /// HTTP(S) URL fetched with a blocking GET
    Remote(String),
}

impl GeoJsonSource {
    /// Classify a user-supplied location: `http://` and `https://` are remote, anything else a path.
    pub fn infer(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Remote(location.to_string())
        } else {
            Self::Local(PathBuf::from(location))
        }
    }

    /// Fetch the raw document text.
    pub fn read(&self) -> Result<String> {
        match self {
            Self::Local(path) => {
                if !path.is_file() {
                    return Err(BlueRoofError::not_found(path.display().to_string()));
                }
                Ok(std::fs::read_to_string(path)?)
            }
            Self::Remote(url) => match ureq::get(url).call() {
                Ok(response) => Ok(response.into_string()?),
                Err(ureq::Error::Status(code, _)) => {
                    Err(BlueRoofError::not_found(format!("{url} (HTTP {code})")))
                }
                Err(ureq::Error::Transport(transport)) => {
                    Err(BlueRoofError::Transport(format!("{url}: {transport}")))
                }
            },
        }
    }
}

impl FromStr for GeoJsonSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::infer(s))
    }
}

impl fmt::Display for GeoJsonSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// Load a feature collection, returning the bare geometries alongside
/// property-less features built from them.
pub fn load(source: &GeoJsonSource) -> Result<(Vec<Geometry<f64>>, Vec<Feature>)> {
    let text = source.read()?;
    let (geometries, features) = parse(&text)?;
    tracing::info!(source = %source, features = features.len(), "loaded GeoJSON layer");
    Ok((geometries, features))
}

/// Parse a FeatureCollection document. Input properties are not kept.
pub fn parse(text: &str) -> Result<(Vec<Geometry<f64>>, Vec<Feature>)> {
    let document: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| BlueRoofError::unsupported(format!("document is not valid JSON: {e}")))?;

    let entries = document
        .get("features")
        .and_then(|f| f.as_array())
        .ok_or_else(|| BlueRoofError::unsupported("document has no `features` array"))?;

    let mut geometries = Vec::with_capacity(entries.len());
    let mut features = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let raw = entry
            .get("geometry")
            .filter(|g| !g.is_null())
            .ok_or_else(|| BlueRoofError::unsupported(format!("feature {index} has no geometry")))?;

        let geometry = geojson::Geometry::from_json_value(raw.clone())
            .and_then(Geometry::<f64>::try_from)
            .map_err(|e| BlueRoofError::unsupported(format!("feature {index}: {e}")))?;

        features.push(Feature::new(geometry.clone(), JsonObject::new())?);
        geometries.push(geometry);
    }

    Ok((geometries, features))
}

/// Wrap features in a FeatureCollection tagged with the CRS84 reference system.
pub fn to_feature_collection(features: &[Feature]) -> FeatureCollection {
    let features = features
        .iter()
        .map(|feature| geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(feature.geometry()))),
            id: None,
            properties: Some(feature.properties().clone()),
            foreign_members: None,
        })
        .collect();

    let mut foreign_members = JsonObject::new();
    foreign_members.insert(
        "crs".to_string(),
        serde_json::json!({ "type": "name", "properties": { "name": CRS84 } }),
    );

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    }
}

/// Serialise features to a GeoJSON document string.
pub fn serialize(features: &[Feature]) -> Result<String> {
    Ok(serde_json::to_string(&to_feature_collection(features))?)
}

/// Save features as a pretty-printed GeoJSON file
pub fn save(features: &[Feature], path: impl AsRef<Path>) -> Result<()> {
    let document = serde_json::to_string_pretty(&to_feature_collection(features))?;
    std::fs::write(path, document)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BUILDINGS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "building": "yes" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [-66.0581, 18.4655], [-66.0579, 18.4655],
                        [-66.0579, 18.4657], [-66.0581, 18.4657], [-66.0581, 18.4655]
                    ]]
                }
            },
            {
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[0.1, 0.2], [0.3, 0.2], [0.3, 0.4], [0.1, 0.2]]],
                        [[[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 2.0], [1.0, 1.0]],
                         [[1.2, 1.2], [1.4, 1.2], [1.4, 1.4], [1.2, 1.2]]]
                    ]
                }
            }
        ]
    }"#;

    #[test]
    fn infer_classifies_once() {
        assert_eq!(
            GeoJsonSource::infer("https://example.com/b.geojson"),
            GeoJsonSource::Remote("https://example.com/b.geojson".into())
        );
        assert_eq!(
            GeoJsonSource::infer("data/http-cache/b.geojson"),
            GeoJsonSource::Local(PathBuf::from("data/http-cache/b.geojson"))
        );
    }

    #[test]
    fn parse_drops_properties_keeps_geometry() {
        let (geometries, features) = parse(BUILDINGS).unwrap();
        assert_eq!(geometries.len(), 2);
        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| f.properties().is_empty()));
        assert!(matches!(geometries[0], Geometry::Polygon(_)));
        assert!(matches!(geometries[1], Geometry::MultiPolygon(_)));
    }

    #[test]
    fn round_trip_preserves_coordinates() {
        let (geometries, features) = parse(BUILDINGS).unwrap();
        let document = serialize(&features).unwrap();
        let (reparsed, _) = parse(&document).unwrap();
        assert_eq!(reparsed, geometries);
    }

    #[test]
    fn serialized_document_carries_crs_and_properties() {
        let (_, mut features) = parse(BUILDINGS).unwrap();
        features[0].set_property("blue", true);
        let value: serde_json::Value = serde_json::from_str(&serialize(&features).unwrap()).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["crs"]["type"], "name");
        assert_eq!(value["crs"]["properties"]["name"], CRS84);
        assert_eq!(value["features"][0]["properties"]["blue"], true);
        assert_eq!(value["features"][1]["properties"], serde_json::json!({}));
    }

    #[test]
    fn missing_features_is_unsupported() {
        let err = parse(r#"{"type": "FeatureCollection"}"#).unwrap_err();
        assert!(matches!(err, BlueRoofError::UnsupportedInput(_)));
    }

    #[test]
    fn missing_geometry_is_unsupported() {
        let err = parse(r#"{"features": [{"type": "Feature", "properties": {}}]}"#).unwrap_err();
        assert!(matches!(err, BlueRoofError::UnsupportedInput(_)));
    }

    #[test]
    fn point_geometry_is_unsupported() {
        let doc = r#"{"features": [{"type": "Feature", "properties": {},
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}}]}"#;
        assert!(matches!(parse(doc), Err(BlueRoofError::UnsupportedInput(_))));
    }

    #[test]
    fn load_reads_local_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BUILDINGS.as_bytes()).unwrap();
        let source = GeoJsonSource::Local(file.path().to_path_buf());
        let (geometries, _) = load(&source).unwrap();
        assert_eq!(geometries.len(), 2);
    }

    #[test]
    fn missing_local_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = GeoJsonSource::Local(dir.path().join("absent.geojson"));
        assert!(matches!(load(&source), Err(BlueRoofError::NotFound { .. })));
    }

    /// Serve one canned HTTP response on a loopback port and return its URL.
    fn serve_once(status: &str, body: &'static str) -> String {
        use std::io::{BufRead, BufReader};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let status = status.to_string();
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            // drain the request head
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/geo+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
        });
        format!("http://127.0.0.1:{port}/layers/b.geojson")
    }

    #[test]
    fn remote_404_is_not_found() {
        let url = serve_once("404 Not Found", "missing");
        let source = GeoJsonSource::infer(&url);
        assert!(matches!(source, GeoJsonSource::Remote(_)));
        match load(&source) {
            Err(BlueRoofError::NotFound { resource }) => assert!(resource.contains("HTTP 404")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn remote_200_is_parsed() {
        let url = serve_once("200 OK", BUILDINGS);
        let (geometries, features) = load(&GeoJsonSource::Remote(url)).unwrap();
        assert_eq!(geometries.len(), 2);
        assert_eq!(features.len(), 2);
    }

    #[test]
    fn remote_empty_collection_is_parsed() {
        let url = serve_once("200 OK", r#"{"type": "FeatureCollection", "features": []}"#);
        let (geometries, _) = load(&GeoJsonSource::Remote(url)).unwrap();
        assert!(geometries.is_empty());
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let source = GeoJsonSource::Remote(format!("http://127.0.0.1:{port}/b.geojson"));
        assert!(matches!(load(&source), Err(BlueRoofError::Transport(_))));
    }

    #[test]
    fn save_writes_readable_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        let (geometries, features) = parse(BUILDINGS).unwrap();
        save(&features, &path).unwrap();
        let (reloaded, _) = load(&GeoJsonSource::Local(path)).unwrap();
        assert_eq!(reloaded, geometries);
    }
}
