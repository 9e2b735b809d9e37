//! # glTF Optimizer
//!
//! A Rust library for shrinking glTF 2.0 scenes for delivery.
//!
//! ## Overview
//!
//! This library takes a glTF or GLB file and a [`Config`], runs a fixed
//! sequence of transformation steps over an in-memory scene document, and
//! produces a single self-contained GLB:
//!
//! - buffers merged, duplicate data removed, repeated meshes instanced
//! - hierarchy flattened and compatible meshes joined
//! - optional welding and simplification
//! - redundant keyframes and unused data pruned
//! - textures resized and re-encoded
//! - geometry compressed with `EXT_meshopt_compression`
//!
//! ## Quick Start
//!
//! ```ignore
//! use gltf_optimizer::{transform, Config};
//!
//! let config = Config {
//!     simplify: true,
//!     ratio: Some(0.5),
//!     ..Default::default()
//! };
//! let glb = transform("scene.gltf", &config)?;
//! std::fs::write("scene.opt.glb", glb)?;
//! ```
//!
//! ## Composing Steps
//!
//! The step list is a pure function of the configuration ([`plan`]). Callers
//! that need their own flow can read a document, run a [`Pipeline`] with any
//! [`TransformStep`]s, and write it back:
//!
//! ```ignore
//! use gltf_optimizer::{read_path, write_glb, Pipeline, steps};
//!
//! let mut doc = read_path("scene.glb")?;
//! Pipeline::new()
//!     .with_step(steps::Dedup)
//!     .with_step(steps::Prune::default())
//!     .run(&mut doc)?;
//! let glb = write_glb(&doc)?;
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod steps;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use config::{Config, ImageFormat};
pub use document::{Document, DocumentStats};
pub use error::{ConfigError, LoadError, OptimizerError, Result, SerializeError, StepError};
pub use io::{read_path, read_slice, write_glb};
pub use pipeline::{plan, Pipeline, StepSpec, TransformStep};

use std::path::Path;

/// Optimize the glTF/GLB file at `path` and return GLB bytes.
///
/// External buffers and images are resolved relative to the file. The
/// configuration is validated before anything is read.
pub fn transform<P: AsRef<Path>>(path: P, config: &Config) -> Result<Vec<u8>> {
    let pipeline = Pipeline::from_config(config)?;
    let mut doc = read_path(path)?;
    pipeline.run(&mut doc)?;
    Ok(write_glb(&doc)?)
}

/// Optimize a self-contained glTF/GLB held in memory.
pub fn transform_bytes(data: &[u8], config: &Config) -> Result<Vec<u8>> {
    let pipeline = Pipeline::from_config(config)?;
    let mut doc = read_slice(data, None)?;
    pipeline.run(&mut doc)?;
    Ok(write_glb(&doc)?)
}
