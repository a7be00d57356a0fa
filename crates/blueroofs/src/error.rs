use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlueRoofError {
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Color-corrected pixels unavailable for image {image_id}")]
    CorrectionUnavailable { image_id: String },

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("Invalid detector parameters: {0}")]
    InvalidParameters(String),

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

impl BlueRoofError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedInput(message.into())
    }
}

pub type Result<T> = std::result::Result<T, BlueRoofError>;
