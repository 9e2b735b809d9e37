//! Error types for the optimizer.

use thiserror::Error;

/// Result type alias using OptimizerError.
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Main error type for a pipeline run.
#[derive(Error, Debug)]
pub enum OptimizerError {
    /// The configuration was rejected before anything was loaded.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The input could not be read as a scene document.
    #[error("Failed to load scene: {0}")]
    Load(#[from] LoadError),

    /// A transformation step rejected the current document state.
    #[error("Step '{step}' failed: {source}")]
    Transform {
        step: &'static str,
        #[source]
        source: StepError,
    },

    /// The document could not be written as GLB.
    #[error("Failed to serialize scene: {0}")]
    Serialize(#[from] SerializeError),
}

/// Configuration values outside their accepted range.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("ratio must be within [0, 1], got {0}")]
    Ratio(f32),

    #[error("error must be a non-negative number, got {0}")]
    ErrorTolerance(f32),

    #[error("weld must be a non-negative number, got {0}")]
    Weld(f32),

    #[error("{field} must be greater than zero")]
    Resolution { field: &'static str },

    #[error("Invalid degrade pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while reading a glTF/GLB input.
#[derive(Error, Debug)]
pub enum LoadError {
    /// I/O error while reading the input or an external resource.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON chunk is not valid glTF JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid GLB container.
    #[error("Invalid GLB: {0}")]
    Glb(String),

    /// A data URI could not be decoded.
    #[error("Invalid data URI: {0}")]
    DataUri(#[from] base64::DecodeError),

    /// A buffer or image could not be located.
    #[error("Resource not found: {0}")]
    MissingResource(String),

    /// The document references something that does not exist or is out of range.
    #[error("Malformed document: {0}")]
    Malformed(String),

    /// A required extension is not supported.
    #[error("Unsupported required extension: {0}")]
    UnsupportedExtension(String),

    /// A compressed buffer view could not be decoded.
    #[error("Failed to decode compressed data: {0}")]
    Decode(String),
}

/// Failures raised by a single transformation step.
#[derive(Error, Debug)]
pub enum StepError {
    /// Geometry the step cannot process.
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Texture decode/encode failure.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The requested output encoding is not available in this build.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Cross references in the document are inconsistent.
    #[error("Invalid document: {0}")]
    Document(String),
}

/// Failures while writing GLB output.
#[derive(Error, Debug)]
pub enum SerializeError {
    /// GLB holds exactly one binary chunk.
    #[error("GLB output requires a single buffer, document has {0}")]
    MultipleBuffers(usize),

    /// The output would not fit the 32-bit GLB length fields.
    #[error("Output of {0} bytes exceeds the GLB size limit")]
    TooLarge(usize),

    /// Geometry compression failed.
    #[error("Failed to encode compressed data: {0}")]
    Encode(String),

    /// Failed to serialize the JSON chunk.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
