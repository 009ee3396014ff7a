//! PantryLens - identify grocery products from photos
//!
//! Runs the recognition core on image files and prints the predictions as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pantry_lens::analysis::{is_meaningful, FilterProfile};
use pantry_lens::config::{self, AppConfig};
use pantry_lens::fusion::{FusionEngine, PredictionList};
use pantry_lens::storage;
use pantry_lens::vision::{decode_image, ModelManager, ModelType, TextExtractor};

/// PantryLens - product recognition from photos
#[derive(Parser, Debug)]
#[command(name = "pantry-lens")]
#[command(about = "Identify products by fusing image classification with packaging text")]
struct Args {
    /// Configuration file (defaults to <config_dir>/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recognize one image
    Predict {
        image: PathBuf,
    },
    /// Recognize several images in parallel
    Batch {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Worker threads
        #[arg(short, long, default_value = "4")]
        workers: usize,
    },
    /// Run only the text channel and judge the result
    Text {
        image: PathBuf,
    },
    /// Show model file status
    Models {
        /// Record digests of the present files in the manifest
        #[arg(long)]
        record: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config_or_default(args.config.as_deref())?;

    match args.command {
        Command::Predict { image } => run_predict(&config, &image),
        Command::Batch { images, workers } => run_batch(&config, images, workers),
        Command::Text { image } => run_text(&config, &image),
        Command::Models { record } => run_models(record),
    }
}

/// Load configuration from file or fall back to defaults
///
/// An explicit `--config` path must exist; the default location is optional.
fn load_config_or_default(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path).with_context(|| format!("Failed to load config {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            let config = config::load_config(&config_path)
                .with_context(|| format!("Failed to load config {:?}", config_path))?;
            info!("Loaded configuration from {:?}", config_path);
            return Ok(config);
        }
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn build_engine(config: &AppConfig) -> Result<FusionEngine> {
    let models = ModelManager::new()?;
    FusionEngine::from_config(config, &models)
}

fn run_predict(config: &AppConfig, image: &Path) -> Result<()> {
    let engine = build_engine(config)?;
    let bytes = std::fs::read(image).with_context(|| format!("Failed to read {:?}", image))?;
    let predictions = engine.predict(&bytes)?;
    println!("{}", serde_json::to_string_pretty(&predictions)?);
    Ok(())
}

fn run_batch(config: &AppConfig, images: Vec<PathBuf>, workers: usize) -> Result<()> {
    let engine = Arc::new(build_engine(config)?);
    let workers = workers.clamp(1, images.len().max(1));
    info!("Processing {} images with {} workers", images.len(), workers);

    let (job_tx, job_rx) = unbounded::<(usize, PathBuf)>();
    let (result_tx, result_rx) = unbounded::<(usize, Result<PredictionList, String>)>();

    for job in images.iter().cloned().enumerate() {
        job_tx.send(job)?;
    }
    drop(job_tx);

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            std::thread::spawn(move || {
                for (index, path) in job_rx.iter() {
                    let result = std::fs::read(&path)
                        .map_err(|e| format!("Failed to read {:?}: {}", path, e))
                        .and_then(|bytes| engine.predict(&bytes).map_err(|e| e.to_string()));
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();
    drop(result_tx);

    let mut results: Vec<Option<Result<PredictionList, String>>> = (0..images.len()).map(|_| None).collect();
    for (index, result) in result_rx.iter() {
        results[index] = Some(result);
    }
    for handle in handles {
        if handle.join().is_err() {
            error!("Worker thread panicked");
        }
    }

    let mut failures = 0;
    let mut report = Vec::with_capacity(images.len());
    for (path, result) in images.iter().zip(results) {
        let entry = match result {
            Some(Ok(predictions)) => serde_json::json!({ "image": path, "predictions": predictions }),
            Some(Err(message)) => {
                failures += 1;
                serde_json::json!({ "image": path, "error": message })
            }
            None => {
                failures += 1;
                serde_json::json!({ "image": path, "error": "not processed" })
            }
        };
        report.push(entry);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    if failures > 0 {
        anyhow::bail!("{} of {} images failed", failures, images.len());
    }
    Ok(())
}

fn run_text(config: &AppConfig, image: &Path) -> Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("Failed to read {:?}", image))?;
    let decoded = decode_image(&bytes).with_context(|| format!("Failed to decode {:?}", image))?;

    let extractor = TextExtractor::from_settings(&config.ocr);
    let text = extractor.extract_text(&decoded);

    let report = serde_json::json!({
        "text": text,
        "meaningful": {
            "configured": is_meaningful(&text, &config.filter.resolve()),
            "strict": is_meaningful(&text, &FilterProfile::strict()),
            "legacy": is_meaningful(&text, &FilterProfile::legacy()),
        },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_models(record: bool) -> Result<()> {
    let manager = ModelManager::new()?;
    if record {
        for model_type in ModelType::ALL {
            if manager.model_path(model_type).exists() {
                manager.record(model_type)?;
            }
        }
    }
    println!("Models directory: {}", manager.models_dir().display());
    for status in manager.get_model_status() {
        let size = status
            .size_bytes
            .map(|s| format!("{:.1} MB", s as f64 / 1_000_000.0))
            .unwrap_or_else(|| "-".to_string());
        let verified = match status.verified {
            Some(true) => "checksum ok",
            Some(false) => "CHECKSUM MISMATCH",
            None => "no checksum recorded",
        };
        println!(
            "  {:<18} {:<10} {:>10}  {}  ({})",
            status.model_type.display_name(),
            if status.available { "available" } else { "missing" },
            size,
            verified,
            status.path.display()
        );
    }
    if !manager.are_models_ready() {
        println!(
            "Place {} and {} in the models directory.",
            ModelType::Classifier.filename(),
            ModelType::Labels.filename()
        );
    }
    Ok(())
}
