//! derma CLI: classify dermoscopy images and inspect the loaded models.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use image::{ImageFormat, RgbImage};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use derma::models::backend::DefaultBackend;
use derma::prelude::*;

#[derive(Parser)]
#[command(name = "derma")]
#[command(author, version)]
#[command(about = "Two-stage dermoscopy classification with Grad-CAM overlays")]
#[command(long_about = "derma: classify a dermoscopic image with a triage model and, when \
needed, a specialist model, and show which regions drove the decision.

EXAMPLES:
  # Classify an image with the default configuration
  derma classify --image lesion.jpg

  # Use trained weights and save the overlay
  derma classify --image lesion.jpg --config derma.json --output overlay.png

  # Print the response as JSON (overlay as base64 JPEG)
  derma classify --image lesion.jpg --json

  # Show the layers Grad-CAM can target
  derma layers --config derma.json

  # Start a config file from the defaults
  derma config > derma.json")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an image and explain the verdict
    Classify {
        /// Image file (PNG or JPEG)
        #[arg(long, value_name = "FILE")]
        image: PathBuf,

        /// JSON configuration file; defaults are used when omitted
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Write the heatmap overlay to this file
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Print the JSON response instead of a summary
        #[arg(long, default_value = "false")]
        json: bool,
    },
    /// List the addressable layers of both stage models
    Layers {
        /// JSON configuration file; defaults are used when omitted
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print the default configuration as JSON
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over -v
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Classify {
            image,
            config,
            output,
            json,
        } => handle_classify(&image, config.as_deref(), output.as_deref(), json),
        Commands::Layers { config } => handle_layers(config.as_deref()),
        Commands::Config => handle_config(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

/// 2 for errors attributed to the request, 1 for everything else.
fn exit_status(err: &anyhow::Error) -> u8 {
    let client = err
        .chain()
        .filter_map(|e| e.downcast_ref::<CoreError>())
        .any(|e| e.class() == ErrorClass::Client);
    if client {
        2
    } else {
        1
    }
}

fn load_config(path: Option<&Path>) -> Result<DermaConfig> {
    match path {
        Some(path) => {
            DermaConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => Ok(DermaConfig::default()),
    }
}

fn read_image(path: &Path) -> Result<RgbImage> {
    let image = image::open(path)
        .map_err(|e| CoreError::InvalidInput(format!("cannot decode {}: {e}", path.display())))?;
    Ok(image.to_rgb8())
}

fn encode_jpeg_base64(image: &RgbImage) -> Result<String> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .context("Failed to encode overlay")?;
    Ok(STANDARD.encode(bytes))
}

/// Caveat for results produced by seeded, untrained models.
fn untrained_note(config: &DermaConfig) -> Option<String> {
    let names = config.untrained_models();
    if names.is_empty() {
        None
    } else {
        Some(format!("untrained weights: {}", names.join(", ")))
    }
}

fn format_summary(final_class: &str, confidence: f32, model_used: Stage, note: Option<&str>) -> String {
    let mut summary = format!(
        "Diagnosis:  {final_class}\nConfidence: {:.1}%\nModel used: {model_used}",
        confidence * 100.0
    );
    if let Some(note) = note {
        summary.push_str(&format!("\nNote:       ({note})"));
    }
    summary
}

fn handle_classify(image: &Path, config: Option<&Path>, output: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(config)?;
    let pipeline = DefaultPipeline::from_config(&config, Default::default()).context("Failed to build pipeline")?;

    let note = untrained_note(&config);
    let input = read_image(image)?;
    tracing::info!("Classifying {} ({}x{})", image.display(), input.width(), input.height());
    let diagnosis = pipeline.process(&input)?;
    let overlay = diagnosis.visualization.to_rgb_image();

    if let Some(path) = output {
        overlay
            .save(path)
            .with_context(|| format!("Failed to write overlay {}", path.display()))?;
        tracing::info!("Overlay written to {}", path.display());
    }

    if json {
        let response = DiagnosisResponse::from_diagnosis(&diagnosis, encode_jpeg_base64(&overlay)?).with_note(note);
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!(
            "{}",
            format_summary(&diagnosis.final_class, diagnosis.confidence, diagnosis.model_used, note.as_deref())
        );
    }
    Ok(())
}

fn print_layers<A: ModelAdapter>(stage: &str, adapter: &A) {
    let descriptor = adapter.descriptor();
    let target = adapter.target_layer();
    println!(
        "{stage}: '{}' ({} classes, {:?}, {}x{})",
        descriptor.name, descriptor.n_classes, descriptor.layout, descriptor.input_size.width, descriptor.input_size.height
    );
    if target.name != descriptor.target_layer {
        println!("  target '{}' not found, using '{}'", descriptor.target_layer, target.name);
    }
    for layer in adapter.layers() {
        let marker = if layer.name == target.name { "*" } else { " " };
        println!("  {marker} {:>3}  {:<20} {:?}", layer.index, layer.name, layer.kind);
    }
}

fn handle_layers(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let stage1 = ChannelFirstAdapter::<DefaultBackend>::from_config(
        config.stage1.descriptor.clone(),
        &config.stage1.architecture,
        &config.stage1.weights,
        Default::default(),
    )
    .context("Failed to build stage 1")?;
    let stage2 = ChannelLastAdapter::<DefaultBackend>::from_config(
        config.stage2.descriptor.clone(),
        &config.stage2.architecture,
        &config.stage2.weights,
        Default::default(),
    )
    .context("Failed to build stage 2")?;

    print_layers("Stage 1", &stage1);
    println!();
    print_layers("Stage 2", &stage2);
    Ok(())
}

fn handle_config() -> Result<()> {
    println!("{}", DermaConfig::default().to_json()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_classify() {
        let cli = Cli::parse_from(["derma", "-vv", "classify", "--image", "a.jpg", "--json"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Classify { image, json, config, .. } => {
                assert_eq!(image, PathBuf::from("a.jpg"));
                assert!(json);
                assert!(config.is_none());
            }
            _ => panic!("expected classify"),
        }
    }

    #[test]
    fn test_exit_status() {
        let client = anyhow::Error::new(CoreError::InvalidInput("empty".into())).context("classify");
        assert_eq!(exit_status(&client), 2);
        let server = anyhow::Error::new(CoreError::InferenceFailure("nan".into()));
        assert_eq!(exit_status(&server), 1);
        assert_eq!(exit_status(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn test_unreadable_image_is_client_error() {
        let err = read_image(Path::new("/nonexistent/lesion.jpg")).unwrap_err();
        assert_eq!(exit_status(&err), 2);
    }

    #[test]
    fn test_untrained_note() {
        let mut config = DermaConfig::default();
        let note = untrained_note(&config).unwrap();
        assert_eq!(note, "untrained weights: melanoma, skin_lesion");

        let summary = format_summary("Melanoma", 0.8, Stage::Stage1, Some(&note));
        assert!(summary.contains("Diagnosis:  Melanoma"));
        assert!(summary.contains("Confidence: 80.0%"));
        assert!(summary.ends_with("(untrained weights: melanoma, skin_lesion)"));

        config.stage1.weights = WeightSource::Checkpoint {
            path: "models/stage1".into(),
        };
        config.stage2.weights = WeightSource::Checkpoint {
            path: "models/stage2".into(),
        };
        assert!(untrained_note(&config).is_none());
        assert!(!format_summary("Nevus", 0.5, Stage::Stage2, None).contains("untrained"));
    }

    #[test]
    fn test_jpeg_base64() {
        let image = RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10]));
        let encoded = encode_jpeg_base64(&image).unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }
}
