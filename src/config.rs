//! Pipeline configuration.
//!
//! Every field is optional; absent fields fall back to the defaults below when
//! the step list is planned. The serialized field names match the keys used by
//! existing JSON configs (`degraderesolution`, `keepmaterials`, ...).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default max texture dimension.
pub const DEFAULT_RESOLUTION: u32 = 1024;
/// Default max dimension for textures matching the degrade pattern.
pub const DEFAULT_DEGRADE_RESOLUTION: u32 = 512;
/// Normal maps are never resized below this.
pub const MIN_NORMAL_RESOLUTION: u32 = 2048;
/// Default simplification ratio.
pub const DEFAULT_RATIO: f32 = 0.0;
/// Default simplification error, relative to mesh extent.
pub const DEFAULT_ERROR: f32 = 0.0001;
/// Default weld tolerance.
pub const DEFAULT_WELD: f32 = 0.0001 / 2.0;

/// Raster encodings available for compressed textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl ImageFormat {
    /// MIME type written to the glTF image.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Avif => "image/avif",
        }
    }

    /// Parse a MIME type.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/webp" => Some(ImageFormat::Webp),
            "image/avif" => Some(ImageFormat::Avif),
            _ => None,
        }
    }
}

/// Optimizer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Max dimension for color and generic textures.
    pub resolution: Option<u32>,
    /// Max dimension for textures matching `degrade`.
    #[serde(rename = "degraderesolution")]
    pub degrade_resolution: Option<u32>,
    /// Pattern selecting textures (by name or URI) for aggressive downscaling.
    pub degrade: Option<String>,
    /// Output encoding for compressed textures. Unset keeps the original.
    pub format: Option<ImageFormat>,
    /// Skip palette reduction of materials.
    #[serde(rename = "keepmaterials")]
    pub keep_materials: bool,
    /// Skip mesh joining.
    #[serde(rename = "keepmeshes")]
    pub keep_meshes: bool,
    /// Enable weld + simplify.
    pub simplify: bool,
    /// Target fraction of indices kept when simplifying.
    pub ratio: Option<f32>,
    /// Max simplification error relative to mesh extent.
    pub error: Option<f32>,
    /// Vertex weld tolerance applied before simplification.
    pub weld: Option<f32>,
}

impl Config {
    /// Load a config from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn resolution(&self) -> u32 {
        self.resolution.unwrap_or(DEFAULT_RESOLUTION)
    }

    pub fn degrade_resolution(&self) -> u32 {
        self.degrade_resolution.unwrap_or(DEFAULT_DEGRADE_RESOLUTION)
    }

    /// Resolution used for normal maps when no degrade pattern is set.
    pub fn normal_resolution(&self) -> u32 {
        self.resolution().max(MIN_NORMAL_RESOLUTION)
    }

    pub fn ratio(&self) -> f32 {
        self.ratio.unwrap_or(DEFAULT_RATIO)
    }

    pub fn error(&self) -> f32 {
        self.error.unwrap_or(DEFAULT_ERROR)
    }

    pub fn weld(&self) -> f32 {
        self.weld.unwrap_or(DEFAULT_WELD)
    }

    /// The degrade pattern, treating an empty string as unset.
    pub fn degrade(&self) -> Option<&str> {
        self.degrade.as_deref().filter(|p| !p.is_empty())
    }

    /// Check value ranges and compile the degrade pattern.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution() == 0 {
            return Err(ConfigError::Resolution { field: "resolution" });
        }
        if self.degrade_resolution() == 0 {
            return Err(ConfigError::Resolution {
                field: "degraderesolution",
            });
        }
        let ratio = self.ratio();
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::Ratio(ratio));
        }
        let error = self.error();
        if !error.is_finite() || error < 0.0 {
            return Err(ConfigError::ErrorTolerance(error));
        }
        let weld = self.weld();
        if !weld.is_finite() || weld < 0.0 {
            return Err(ConfigError::Weld(weld));
        }
        if let Some(pattern) = self.degrade() {
            regex::Regex::new(pattern)?;
        }
        Ok(())
    }
}
