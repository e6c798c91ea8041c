//! cadpipe - CAD toolchain execution and validation CLI
//!
//! Thin front end over `cadpipe-core`: reads CAD source text from a file or
//! stdin, runs the selected pipeline operation, and prints the structured
//! response as pretty JSON.
//!
//! ## Commands
//!
//! - `cadquery execute|validate|export|preview|info`: drive a CadQuery
//!   script through the python interpreter
//! - `openscad render|preview|validate|export`: drive OpenSCAD source
//!   through the compiler binary

use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::to_string_pretty;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cadpipe_core::pipeline::cadquery::ExportFormat;
use cadpipe_core::pipeline::openscad::ScadFormat;
use cadpipe_core::{CadQueryPipeline, EngineConfig, OpenscadPipeline};

#[derive(Parser)]
#[command(name = "cadpipe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Execute and validate CAD source via external engines", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// CadQuery script operations (python interpreter)
    Cadquery {
        #[command(subcommand)]
        action: CadqueryAction,
    },

    /// OpenSCAD source operations (compiler binary)
    Openscad {
        #[command(subcommand)]
        action: OpenscadAction,
    },
}

#[derive(Subcommand)]
enum CadqueryAction {
    /// Run a script and report raw output plus classified diagnostics
    Execute {
        /// Script file (reads stdin if omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Run with measurement statements appended and evaluate validity
    Validate {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Export the model to one or more formats in a single pass
    Export {
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Formats to produce (step, stl, svg)
        #[arg(long, value_parser = ExportFormat::from_str, default_values = ["step", "stl"])]
        format: Vec<ExportFormat>,

        /// Output directory (default: the scratch directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Render an SVG preview
    Preview {
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output SVG path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Measure bounding box, volume, and surface area
    Info {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum OpenscadAction {
    /// Compile source to a binary STL and report its bounding box
    Render {
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output STL path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a PNG preview image
    Preview {
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Image size as 'width,height'
        #[arg(long)]
        size: Option<String>,

        /// Camera as 'tx,ty,tz,rx,ry,rz,dist'
        #[arg(long)]
        camera: Option<String>,

        /// Output PNG path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compile, check manifoldness and dimension sanity
    Validate {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Export to a specific format
    Export {
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output format (stl, binstl, 3mf, amf, off, dxf, svg, csg)
        #[arg(long, value_parser = ScadFormat::from_str, default_value = "stl")]
        format: ScadFormat,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Read source text from a file, or stdin when no file is given.
fn read_source(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("failed to read source from stdin")?;
            Ok(source)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = EngineConfig::from_env();

    match cli.command {
        Commands::Cadquery { action } => {
            let pipeline = CadQueryPipeline::new(config);
            match action {
                CadqueryAction::Execute { file } => {
                    let response = pipeline.execute(&read_source(file)?).await?;
                    println!("{}", to_string_pretty(&response)?);
                }
                CadqueryAction::Validate { file } => {
                    let response = pipeline.validate(&read_source(file)?).await?;
                    println!("{}", to_string_pretty(&response)?);
                }
                CadqueryAction::Export {
                    file,
                    format,
                    output_dir,
                } => {
                    let response = pipeline
                        .export(&read_source(file)?, &format, output_dir.as_deref())
                        .await?;
                    println!("{}", to_string_pretty(&response)?);
                }
                CadqueryAction::Preview { file, output } => {
                    let response = pipeline.preview(&read_source(file)?, output).await?;
                    println!("{}", to_string_pretty(&response)?);
                }
                CadqueryAction::Info { file } => {
                    let response = pipeline.info(&read_source(file)?).await?;
                    println!("{}", to_string_pretty(&response)?);
                }
            }
        }
        Commands::Openscad { action } => {
            let pipeline = OpenscadPipeline::new(config);
            match action {
                OpenscadAction::Render { file, output } => {
                    let response = pipeline.render(&read_source(file)?, output).await?;
                    println!("{}", to_string_pretty(&response)?);
                }
                OpenscadAction::Preview {
                    file,
                    size,
                    camera,
                    output,
                } => {
                    let response = pipeline
                        .preview(
                            &read_source(file)?,
                            size.as_deref(),
                            camera.as_deref(),
                            output,
                        )
                        .await?;
                    println!("{}", to_string_pretty(&response)?);
                }
                OpenscadAction::Validate { file } => {
                    let response = pipeline.validate(&read_source(file)?).await?;
                    println!("{}", to_string_pretty(&response)?);
                }
                OpenscadAction::Export {
                    file,
                    format,
                    output,
                } => {
                    let response = pipeline
                        .export(&read_source(file)?, format, output)
                        .await?;
                    println!("{}", to_string_pretty(&response)?);
                }
            }
        }
    }

    Ok(())
}
