use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use image::ImageReader;
use tracing::info;

use statread::training::{self, TrainingConfig};
use statread::{DigitRecognizer, RecognizerConfig, Roi, ScreenLayout};

#[derive(Parser)]
#[command(name = "statread")]
#[command(about = "Read on-screen match statistics from screenshots")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Recognizer configuration (JSON); defaults are used when omitted
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a single statistic from a screenshot region
    Read {
        /// Path to the screenshot
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Region as x1,y1,x2,y2
        #[arg(long)]
        roi: Roi,

        /// Statistic identifier (decides decimal handling)
        #[arg(long, default_value = "value")]
        stat: String,

        /// Trained model archive
        #[arg(long, value_name = "FILE")]
        model: PathBuf,

        /// Save debug outputs to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },
    /// Read every statistic of one screen in a layout file, printed as JSON
    Screen {
        /// Path to the screenshot
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Layout file mapping screen -> stat -> rectangle
        #[arg(long, value_name = "FILE")]
        layout: PathBuf,

        /// Screen name within the layout
        #[arg(long)]
        screen: String,

        /// Trained model archive
        #[arg(long, value_name = "FILE")]
        model: PathBuf,

        /// Save debug outputs to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },
    /// Train the digit classifier from labelled sample folders
    Train {
        /// Directory with one sub-directory of PNG samples per digit
        #[arg(value_name = "CORPUS_DIR")]
        corpus: PathBuf,

        /// Where to write the model archive
        #[arg(long, short, value_name = "FILE")]
        output: PathBuf,

        /// Seed for reproducible undersampling
        #[arg(long)]
        seed: Option<u64>,

        /// Neighbour count
        #[arg(long, default_value_t = statread::classifier::DEFAULT_K)]
        k: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config = match &args.config {
        Some(path) => RecognizerConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => RecognizerConfig::default(),
    };

    match args.command {
        Commands::Read {
            image_path,
            roi,
            stat,
            model,
            debug_out,
        } => {
            let recognizer = build_recognizer(&model, config, debug_out)?;
            let img = load_image(&image_path)?;

            let recognition = recognizer.recognize(&img, roi, &stat)?;
            match recognition.value {
                Some(value) => println!("{}", value),
                None => println!("no digits found"),
            }
        }
        Commands::Screen {
            image_path,
            layout,
            screen,
            model,
            debug_out,
        } => {
            let layout = ScreenLayout::from_file(&layout)
                .with_context(|| format!("Failed to load layout {:?}", layout))?;
            let recognizer = build_recognizer(&model, config, debug_out)?;
            let img = load_image(&image_path)?;

            let readings = recognizer.read_screen(&img, &layout, &screen)?;
            println!("{}", serde_json::to_string_pretty(&readings)?);
        }
        Commands::Train {
            corpus,
            output,
            seed,
            k,
        } => {
            let mut training_config = TrainingConfig::default()
                .with_feature_size(config.feature_size)
                .with_k(k);
            if let Some(seed) = seed {
                training_config = training_config.with_seed(seed);
            }

            let model = training::train_from_dir(&corpus, &output, &training_config)
                .with_context(|| format!("Failed to train from {:?}", corpus))?;
            info!(
                samples = model.len(),
                output = %output.display(),
                "training complete"
            );
        }
    }

    Ok(())
}

fn build_recognizer(
    model: &PathBuf,
    config: RecognizerConfig,
    debug_out: Option<PathBuf>,
) -> anyhow::Result<DigitRecognizer> {
    let mut recognizer = DigitRecognizer::from_model_file(model, config)
        .with_context(|| format!("Failed to load model {:?}", model))?;
    if let Some(debug_dir) = debug_out {
        recognizer = recognizer
            .with_debug_artifacts(true)
            .with_debug_dump(debug_dir)?;
    }
    Ok(recognizer)
}

fn load_image(path: &PathBuf) -> anyhow::Result<image::DynamicImage> {
    info!("Loading image: {:?}", path);
    let img = ImageReader::open(path)?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
    info!("Image loaded: {}x{}", img.width(), img.height());
    Ok(img)
}
