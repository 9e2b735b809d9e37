//! glTF Optimizer CLI
//!
//! Optimize glTF/GLB scenes for delivery.

use clap::{Args, Parser, Subcommand};
use gltf_optimizer::{plan, read_path, read_slice, transform, Config, DocumentStats, ImageFormat};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "gltf-optimizer")]
#[command(author, version, about = "Optimize glTF/GLB scenes for delivery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize a scene and write a GLB
    Optimize {
        /// Input glTF or GLB file
        input: PathBuf,

        /// Output file path (defaults to <input>.opt.glb)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: ConfigArgs,
    },

    /// Print the steps a configuration runs
    Plan {
        #[command(flatten)]
        options: ConfigArgs,
    },

    /// Show statistics for a scene
    Info {
        /// Input glTF or GLB file
        input: PathBuf,
    },
}

/// Configuration file plus per-field overrides.
#[derive(Args)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Max texture dimension
    #[arg(long)]
    resolution: Option<u32>,

    /// Max dimension for textures matching --degrade
    #[arg(long)]
    degrade_resolution: Option<u32>,

    /// Pattern selecting textures (by name or URI) for aggressive downscaling
    #[arg(long)]
    degrade: Option<String>,

    /// Texture output format
    #[arg(short, long, value_enum)]
    format: Option<ImageFormat>,

    /// Skip material palette reduction
    #[arg(long)]
    keep_materials: bool,

    /// Skip mesh joining
    #[arg(long)]
    keep_meshes: bool,

    /// Enable weld + simplify
    #[arg(long)]
    simplify: bool,

    /// Target fraction of triangles kept when simplifying (0.0 to 1.0)
    #[arg(long)]
    ratio: Option<f32>,

    /// Max simplification error, relative to mesh extent
    #[arg(long)]
    error: Option<f32>,

    /// Weld tolerance applied before simplification
    #[arg(long)]
    weld: Option<f32>,
}

impl ConfigArgs {
    fn resolve(self) -> Result<Config, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        config.resolution = self.resolution.or(config.resolution);
        config.degrade_resolution = self.degrade_resolution.or(config.degrade_resolution);
        config.degrade = self.degrade.or(config.degrade);
        config.format = self.format.or(config.format);
        config.keep_materials |= self.keep_materials;
        config.keep_meshes |= self.keep_meshes;
        config.simplify |= self.simplify;
        config.ratio = self.ratio.or(config.ratio);
        config.error = self.error.or(config.error);
        config.weld = self.weld.or(config.weld);
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize {
            input,
            output,
            options,
        } => {
            let output = output.unwrap_or_else(|| default_output(&input));
            optimize(&input, &output, options.resolve()?)?;
        }
        Commands::Plan { options } => {
            show_plan(&options.resolve()?);
        }
        Commands::Info { input } => {
            show_info(&input)?;
        }
    }

    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scene".to_string());
    input.with_file_name(format!("{}.opt.glb", stem))
}

fn optimize(input: &Path, output: &Path, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading scene from {:?}...", input);
    let before = read_path(input)?.stats();
    let input_size = fs::metadata(input)?.len();
    print_stats(&before);

    println!("Optimizing ({} steps)...", plan(&config).len());
    let glb = transform(input, &config)?;
    let after = read_slice(&glb, None)?.stats();
    print_stats(&after);

    fs::write(output, &glb)?;
    println!(
        "Exported GLB ({} bytes, {:.1}% of {} bytes) to {:?}",
        glb.len(),
        glb.len() as f64 * 100.0 / input_size.max(1) as f64,
        input_size,
        output
    );
    Ok(())
}

fn show_plan(config: &Config) {
    println!("Steps:");
    for (index, spec) in plan(config).iter().enumerate() {
        println!("  {:>2}. {:?}", index + 1, spec);
    }
}

fn show_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading scene from {:?}...", input);
    let doc = read_path(input)?;

    println!("\nScene Info:");
    if let Some(generator) = &doc.generator {
        println!("  Generator: {}", generator);
    }
    println!("  Scenes: {}", doc.scenes.len());
    println!("  Buffers: {}", doc.buffers.len());
    println!("  Accessors: {}", doc.accessors.len());
    print_stats(&doc.stats());
    if !doc.extensions_used.is_empty() {
        let extensions: Vec<&str> = doc.extensions_used.iter().map(String::as_str).collect();
        println!("  Extensions: {}", extensions.join(", "));
    }
    Ok(())
}

fn print_stats(stats: &DocumentStats) {
    println!(
        "  {} nodes ({} instanced), {} meshes, {} primitives",
        stats.nodes, stats.instanced_nodes, stats.meshes, stats.primitives
    );
    println!(
        "  {} vertices, {} triangles",
        stats.vertices, stats.triangles
    );
    println!(
        "  {} materials, {} textures, {} animations",
        stats.materials, stats.textures, stats.animations
    );
}
