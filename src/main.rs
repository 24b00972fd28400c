// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Shadow Defective: shadow-based time-of-day analysis
//!
//! Command-line front end. Collects the photograph, coordinates, prompt and
//! API key, runs one analysis and optionally saves a report.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use shadow_defective::client::OpenAiClient;
use shadow_defective::config::AppConfig;
use shadow_defective::encoder::{is_supported_image, ImageEncoder, SUPPORTED_EXTENSIONS};
use shadow_defective::geo::{GeoExifReader, LocationReader};
use shadow_defective::orchestrator::{AnalysisOrchestrator, Submission};
use shadow_defective::report::Report;
use shadow_defective::ShadowError;

/// Shadow Defective CLI - solar angle and time-of-day from shadows
#[derive(Parser, Debug)]
#[command(name = "shadow-defective")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.0.0")]
#[command(about = "Estimate time of day from the shadows in a photograph", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze the shadows in a photograph
    Analyze {
        /// Photograph to analyze
        image: PathBuf,

        /// Latitude in decimal degrees (read from EXIF when omitted)
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<String>,

        /// Longitude in decimal degrees (read from EXIF when omitted)
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<String>,

        /// Prompt template; {lat} and {lon} are substituted
        #[arg(short, long, conflicts_with = "prompt_file")]
        prompt: Option<String>,

        /// Read the prompt template from a file
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// API key (read from stdin when omitted)
        #[arg(long)]
        api_key: Option<String>,

        /// Save a report; without a path a timestamped name is used
        #[arg(long, num_args = 0..=1)]
        report: Option<Option<PathBuf>>,

        /// Do not read coordinates from EXIF
        #[arg(long)]
        no_exif: bool,
    },

    /// Show GPS coordinates embedded in a photograph
    Exif {
        /// Photograph to inspect
        image: PathBuf,
    },

    /// Print the configured prompt template
    Prompt,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

/// Inputs for one `analyze` run
struct AnalyzeArgs {
    image: PathBuf,
    lat: Option<String>,
    lon: Option<String>,
    prompt: Option<String>,
    prompt_file: Option<PathBuf>,
    api_key: Option<String>,
    report: Option<Option<PathBuf>>,
    no_exif: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {:?}", cli.config))?;

    match cli.command {
        Commands::Analyze {
            image,
            lat,
            lon,
            prompt,
            prompt_file,
            api_key,
            report,
            no_exif,
        } => {
            let args = AnalyzeArgs {
                image,
                lat,
                lon,
                prompt,
                prompt_file,
                api_key,
                report,
                no_exif,
            };
            run_analyze(config, args).await
        }
        Commands::Exif { image } => run_exif(&image),
        Commands::Prompt => {
            println!("{}", config.prompt.template);
            Ok(())
        }
        Commands::Config { action } => run_config_command(config, action, &cli.config),
    }
}

/// Run one analysis and print the answer
async fn run_analyze(config: AppConfig, args: AnalyzeArgs) -> anyhow::Result<()> {
    if !is_supported_image(&args.image) {
        return Err(ShadowError::Validation(format!(
            "Unsupported image type {:?}. Expected one of: {}",
            args.image,
            SUPPORTED_EXTENSIONS.join(", ")
        ))
        .into());
    }

    let orchestrator = AnalysisOrchestrator::new(
        Arc::new(ImageEncoder::new(config.image.max_dimension)),
        Arc::new(GeoExifReader::new()),
        Arc::new(OpenAiClient::new(&config.provider.url)?),
        config.provider.model.clone(),
        config.provider.max_tokens,
    );

    let mut latitude = args.lat.unwrap_or_default();
    let mut longitude = args.lon.unwrap_or_default();
    if !args.no_exif && (latitude.trim().is_empty() || longitude.trim().is_empty()) {
        match orchestrator.prefill_coordinates(&args.image) {
            Some(coords) => {
                info!("Using EXIF coordinates: {}", coords);
                if latitude.trim().is_empty() {
                    latitude = coords.latitude_text();
                }
                if longitude.trim().is_empty() {
                    longitude = coords.longitude_text();
                }
            }
            None => debug!("No EXIF coordinates in {:?}", args.image),
        }
    }

    let template = match (args.prompt, args.prompt_file) {
        (Some(prompt), _) => prompt,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt file {:?}", path))?,
        (None, None) => config.prompt.template.clone(),
    };

    let api_key = match args.api_key {
        Some(key) => key,
        None => read_api_key()?,
    };

    let submission = Submission {
        api_key,
        image_path: Some(args.image.clone()),
        latitude: latitude.clone(),
        longitude: longitude.clone(),
        prompt: template.clone(),
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let failure_tx = tx.clone();

    info!("Analyzing shadows...");
    let handle = orchestrator.submit(
        submission,
        move |answer| {
            let _ = tx.send(Ok(answer));
        },
        move |e: ShadowError| {
            let _ = failure_tx.send(Err(e));
        },
    )?;

    handle.await.context("Analysis task panicked")?;
    let outcome = rx
        .recv()
        .await
        .context("Analysis finished without a result")?;
    orchestrator.acknowledge();

    let answer = outcome.context("An error occurred")?;
    println!("{}", answer);

    if let Some(target) = args.report {
        let report = Report::new(Some(args.image), latitude, longitude, template, answer);
        let path = target.unwrap_or_else(|| {
            Path::new(&config.report.directory).join(report.default_filename())
        });
        report
            .save(&path)
            .with_context(|| format!("Could not save report to {:?}", path))?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(())
}

/// Print EXIF coordinates for a photograph
fn run_exif(image: &Path) -> anyhow::Result<()> {
    match GeoExifReader::new().read(image) {
        Some(coords) => {
            println!("Latitude:  {}", coords.latitude_text());
            println!("Longitude: {}", coords.longitude_text());
        }
        None => println!("No GPS coordinates found in {}", image.display()),
    }
    Ok(())
}

/// Run config commands
fn run_config_command(
    config: AppConfig,
    action: ConfigCommands,
    config_path: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Provider: {}", config.provider.url);
            println!("  Model: {}", config.provider.model);
            println!("  Max image dimension: {}", config.image.max_dimension);
        }
    }

    Ok(())
}

/// Read the API key from stdin; it is never echoed back or logged
fn read_api_key() -> anyhow::Result<String> {
    eprint!("API key: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read API key from stdin")?;
    Ok(line.trim().to_string())
}
