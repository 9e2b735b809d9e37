//! Step planning and execution.
//!
//! [`plan`] turns a [`Config`] into an ordered list of [`StepSpec`]s without
//! touching any document. [`Pipeline`] instantiates the steps and applies them
//! to a document, one after another.

use crate::config::{Config, ImageFormat};
use crate::document::{Document, NORMAL_SLOT};
use crate::error::{ConfigError, OptimizerError, Result, StepError};
use crate::steps::{self, TextureSelector, NORMAL_JPEG_QUALITY};
use std::time::Instant;

/// Minimum group size for palette and instancing.
pub const MIN_CLUSTER: usize = 5;

/// A document transformation.
pub trait TransformStep: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Transform the document in place.
    fn apply(&self, doc: &mut Document) -> std::result::Result<(), StepError>;
}

/// Description of one planned step and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum StepSpec {
    Unpartition,
    Palette { min: usize },
    Reorder,
    Dedup,
    Instance { min: usize },
    Flatten,
    Dequantize,
    Join,
    Weld { tolerance: f32 },
    Simplify { ratio: f32, error: f32 },
    Resample { tolerance: f32 },
    Prune { keep_attributes: bool, keep_leaves: bool },
    Sparse { ratio: f32 },
    TextureCompress {
        selector: TextureSelector,
        format: Option<ImageFormat>,
        resize: u32,
        quality: Option<u8>,
    },
    Meshopt,
}

impl StepSpec {
    pub fn name(&self) -> &'static str {
        match self {
            StepSpec::Unpartition => "unpartition",
            StepSpec::Palette { .. } => "palette",
            StepSpec::Reorder => "reorder",
            StepSpec::Dedup => "dedup",
            StepSpec::Instance { .. } => "instance",
            StepSpec::Flatten => "flatten",
            StepSpec::Dequantize => "dequantize",
            StepSpec::Join => "join",
            StepSpec::Weld { .. } => "weld",
            StepSpec::Simplify { .. } => "simplify",
            StepSpec::Resample { .. } => "resample",
            StepSpec::Prune { .. } => "prune",
            StepSpec::Sparse { .. } => "sparse",
            StepSpec::TextureCompress { .. } => "textureCompress",
            StepSpec::Meshopt => "meshopt",
        }
    }

    /// Build the step this spec describes.
    pub fn instantiate(&self) -> std::result::Result<Box<dyn TransformStep>, ConfigError> {
        Ok(match self {
            StepSpec::Unpartition => Box::new(steps::Unpartition),
            StepSpec::Palette { min } => Box::new(steps::Palette { min: *min }),
            StepSpec::Reorder => Box::new(steps::Reorder),
            StepSpec::Dedup => Box::new(steps::Dedup),
            StepSpec::Instance { min } => Box::new(steps::Instance { min: *min }),
            StepSpec::Flatten => Box::new(steps::Flatten),
            StepSpec::Dequantize => Box::new(steps::Dequantize),
            StepSpec::Join => Box::new(steps::Join),
            StepSpec::Weld { tolerance } => Box::new(steps::Weld {
                tolerance: *tolerance,
            }),
            StepSpec::Simplify { ratio, error } => Box::new(steps::Simplify {
                ratio: *ratio,
                error: *error,
            }),
            StepSpec::Resample { tolerance } => Box::new(steps::Resample {
                tolerance: *tolerance,
            }),
            StepSpec::Prune {
                keep_attributes,
                keep_leaves,
            } => Box::new(steps::Prune {
                keep_attributes: *keep_attributes,
                keep_leaves: *keep_leaves,
            }),
            StepSpec::Sparse { ratio } => Box::new(steps::Sparse { ratio: *ratio }),
            StepSpec::TextureCompress {
                selector,
                format,
                resize,
                quality,
            } => Box::new(steps::TextureCompress::new(
                selector,
                *format,
                Some(*resize),
                *quality,
            )?),
            StepSpec::Meshopt => Box::new(steps::MeshoptCompression),
        })
    }
}

/// The ordered step list for a configuration.
pub fn plan(config: &Config) -> Vec<StepSpec> {
    let mut specs = vec![StepSpec::Unpartition];
    if !config.keep_materials {
        specs.push(StepSpec::Palette { min: MIN_CLUSTER });
    }
    specs.extend([
        StepSpec::Reorder,
        StepSpec::Dedup,
        StepSpec::Instance { min: MIN_CLUSTER },
        StepSpec::Flatten,
        StepSpec::Dequantize,
    ]);
    if !config.keep_meshes {
        specs.push(StepSpec::Join);
    }
    if config.simplify {
        specs.push(StepSpec::Weld {
            tolerance: config.weld(),
        });
        specs.push(StepSpec::Simplify {
            ratio: config.ratio(),
            error: config.error(),
        });
    }
    specs.extend([
        StepSpec::Resample {
            tolerance: steps::DEFAULT_RESAMPLE_TOLERANCE,
        },
        StepSpec::Prune {
            keep_attributes: false,
            keep_leaves: false,
        },
        StepSpec::Sparse {
            ratio: steps::DEFAULT_SPARSE_RATIO,
        },
    ]);

    match config.degrade() {
        Some(pattern) => {
            specs.push(StepSpec::TextureCompress {
                selector: TextureSelector::Name {
                    pattern: pattern.to_string(),
                    matching: true,
                },
                format: config.format,
                resize: config.degrade_resolution(),
                quality: None,
            });
            specs.push(StepSpec::TextureCompress {
                selector: TextureSelector::Name {
                    pattern: pattern.to_string(),
                    matching: false,
                },
                format: config.format,
                resize: config.resolution(),
                quality: None,
            });
        }
        None => {
            specs.push(StepSpec::TextureCompress {
                selector: TextureSelector::Slot {
                    slot: NORMAL_SLOT.to_string(),
                    matching: false,
                },
                format: config.format,
                resize: config.resolution(),
                quality: None,
            });
            specs.push(StepSpec::TextureCompress {
                selector: TextureSelector::Slot {
                    slot: NORMAL_SLOT.to_string(),
                    matching: true,
                },
                format: Some(ImageFormat::Jpeg),
                resize: config.normal_resolution(),
                quality: Some(NORMAL_JPEG_QUALITY),
            });
        }
    }
    specs.push(StepSpec::Meshopt);
    specs
}

/// An ordered list of steps.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn TransformStep>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `config` and build its planned steps.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let mut pipeline = Self::new();
        for spec in plan(config) {
            pipeline.push(spec.instantiate()?);
        }
        Ok(pipeline)
    }

    pub fn push(&mut self, step: Box<dyn TransformStep>) {
        self.steps.push(step);
    }

    pub fn with_step(mut self, step: impl TransformStep + 'static) -> Self {
        self.push(Box::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Apply every step in order. The first failure stops the run.
    pub fn run(&self, doc: &mut Document) -> Result<()> {
        let started = Instant::now();
        for step in &self.steps {
            let start = Instant::now();
            step.apply(doc).map_err(|source| OptimizerError::Transform {
                step: step.name(),
                source,
            })?;
            log::debug!("{}: {:.1?}", step.name(), start.elapsed());
        }
        let stats = doc.stats();
        log::info!(
            "Pipeline finished in {:.1?}: {} meshes, {} triangles, {} materials, {} textures",
            started.elapsed(),
            stats.meshes,
            stats.triangles,
            stats.materials,
            stats.textures
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn names(config: &Config) -> Vec<&'static str> {
        plan(config).iter().map(StepSpec::name).collect()
    }

    #[test]
    fn test_default_plan() {
        assert_eq!(
            names(&Config::default()),
            vec![
                "unpartition",
                "palette",
                "reorder",
                "dedup",
                "instance",
                "flatten",
                "dequantize",
                "join",
                "resample",
                "prune",
                "sparse",
                "textureCompress",
                "textureCompress",
                "meshopt",
            ]
        );
    }

    #[test]
    fn test_plan_is_deterministic() {
        let config = Config {
            simplify: true,
            degrade: Some("hair".into()),
            ..Default::default()
        };
        assert_eq!(plan(&config), plan(&config.clone()));
    }

    #[test]
    fn test_keep_flags_remove_steps() {
        let config = Config {
            keep_materials: true,
            keep_meshes: true,
            ..Default::default()
        };
        let names = names(&config);
        assert!(!names.contains(&"palette"));
        assert!(!names.contains(&"join"));
    }

    #[test]
    fn test_simplify_adds_weld_first() {
        let config = Config {
            simplify: true,
            ratio: Some(0.5),
            error: Some(0.01),
            ..Default::default()
        };
        let specs = plan(&config);
        let weld = specs.iter().position(|s| s.name() == "weld").unwrap();
        assert_eq!(specs[weld], StepSpec::Weld { tolerance: 0.00005 });
        assert_eq!(
            specs[weld + 1],
            StepSpec::Simplify {
                ratio: 0.5,
                error: 0.01
            }
        );
        assert!(!names(&Config::default()).contains(&"weld"));
    }

    #[test]
    fn test_degrade_passes() {
        let config = Config {
            degrade: Some("hair|fur".into()),
            degrade_resolution: Some(256),
            format: Some(ImageFormat::Webp),
            ..Default::default()
        };
        let passes: Vec<_> = plan(&config)
            .into_iter()
            .filter(|s| s.name() == "textureCompress")
            .collect();
        assert_eq!(
            passes,
            vec![
                StepSpec::TextureCompress {
                    selector: TextureSelector::Name {
                        pattern: "hair|fur".into(),
                        matching: true
                    },
                    format: Some(ImageFormat::Webp),
                    resize: 256,
                    quality: None,
                },
                StepSpec::TextureCompress {
                    selector: TextureSelector::Name {
                        pattern: "hair|fur".into(),
                        matching: false
                    },
                    format: Some(ImageFormat::Webp),
                    resize: 1024,
                    quality: None,
                },
            ]
        );
    }

    #[test]
    fn test_normal_maps_forced_to_jpeg() {
        let config = Config {
            format: Some(ImageFormat::Png),
            resolution: Some(512),
            ..Default::default()
        };
        let normal_pass = plan(&config)
            .into_iter()
            .rev()
            .find(|s| s.name() == "textureCompress")
            .unwrap();
        assert_eq!(
            normal_pass,
            StepSpec::TextureCompress {
                selector: TextureSelector::Slot {
                    slot: NORMAL_SLOT.into(),
                    matching: true
                },
                format: Some(ImageFormat::Jpeg),
                resize: 2048,
                quality: Some(NORMAL_JPEG_QUALITY),
            }
        );
    }

    #[test]
    fn test_from_config_rejects_invalid_values() {
        let config = Config {
            ratio: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(
            Pipeline::from_config(&config),
            Err(OptimizerError::Config(ConfigError::Ratio(_)))
        ));

        let config = Config {
            degrade: Some("(".into()),
            ..Default::default()
        };
        assert!(matches!(
            Pipeline::from_config(&config),
            Err(OptimizerError::Config(ConfigError::Pattern(_)))
        ));
    }

    #[test]
    fn test_from_config_matches_plan() {
        let config = Config::default();
        let pipeline = Pipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.step_names(), names(&config));
    }

    struct Record(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl TransformStep for Record {
        fn name(&self) -> &'static str {
            self.0
        }

        fn apply(&self, _doc: &mut Document) -> std::result::Result<(), StepError> {
            self.1.lock().unwrap().push(self.0);
            Ok(())
        }
    }

    struct Fail;

    impl TransformStep for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn apply(&self, _doc: &mut Document) -> std::result::Result<(), StepError> {
            Err(StepError::Geometry("broken".into()))
        }
    }

    #[test]
    fn test_run_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .with_step(Record("first", log.clone()))
            .with_step(Fail)
            .with_step(Record("never", log.clone()));
        let mut doc = Document::new();

        let err = pipeline.run(&mut doc).unwrap_err();
        assert!(matches!(err, OptimizerError::Transform { step: "fail", .. }));
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }
}
