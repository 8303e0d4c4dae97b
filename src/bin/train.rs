//! VAE training binary.
//!
//! Trains a convolutional VAE on an IDX image file (e.g. MNIST
//! `train-images-idx3-ubyte`), saves the model directory, and appends one JSON
//! line of metrics per epoch for dashboards.

use burn::config::Config;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use vae::backend::{init_device, TrainingBackend};
use vae::data::{load_idx_images, take_images};
use vae::{TrainingConfig, VaeConfig, VariationalAutoencoder};

#[derive(Parser, Debug)]
#[command(name = "vae-train", about = "Train a convolutional VAE on IDX images")]
struct Args {
    /// IDX image file
    #[arg(long, default_value = "data/mnist/train-images-idx3-ubyte")]
    images: PathBuf,

    /// Directory the trained model is written to
    #[arg(long, default_value = "data/models/vae")]
    model_dir: PathBuf,

    /// Output metrics file (JSONL)
    #[arg(long, default_value = "data/output/metrics.jsonl")]
    metrics_file: PathBuf,

    /// Training config JSON; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Continue training a saved model directory
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Use only the first N images
    #[arg(long)]
    limit: Option<usize>,

    /// Number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Mini-batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Adam learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Weight of the reconstruction term
    #[arg(long)]
    reconstruction_weight: Option<f64>,

    /// RNG seed for shuffling and latent sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Convolution filters per encoder layer
    #[arg(long, value_delimiter = ',', default_values_t = [32, 64, 64, 64])]
    filters: Vec<usize>,

    /// Kernel size per encoder layer
    #[arg(long, value_delimiter = ',', default_values_t = [3, 3, 3, 3])]
    kernels: Vec<usize>,

    /// Stride per encoder layer
    #[arg(long, value_delimiter = ',', default_values_t = [1, 2, 2, 1])]
    strides: Vec<usize>,

    /// Latent space dimension
    #[arg(long, default_value_t = 2)]
    latent_dim: usize,
}

impl Args {
    fn training_config(&self) -> Result<TrainingConfig, String> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::load(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
            None => TrainingConfig::new(),
        };
        if let Some(v) = self.epochs {
            config.num_epochs = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.reconstruction_weight {
            config.reconstruction_weight = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        Ok(config)
    }
}

fn main() {
    if let Err(e) = vae::logging::init_tracing() {
        eprintln!("Tracing disabled: {e}");
    }
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.training_config()?;

    let images = load_idx_images(&args.images)
        .map_err(|e| format!("Failed to load {}: {e}", args.images.display()))?;
    let images = take_images(images, args.limit);
    let (_, rows, cols, channels) = images.dim();

    let device = init_device();
    let vae = match &args.resume {
        Some(dir) => {
            eprintln!("Resuming from {}", dir.display());
            VariationalAutoencoder::<TrainingBackend>::load(dir, &device)?
        }
        None => {
            let model_config = VaeConfig::new(
                [rows, cols, channels],
                args.filters.clone(),
                args.kernels.clone(),
                args.strides.clone(),
                args.latent_dim,
            );
            VariationalAutoencoder::<TrainingBackend>::build(model_config, &device)?
        }
    };

    eprintln!("VAE Training");
    eprintln!("  Images: {} ({} samples)", args.images.display(), images.shape()[0]);
    eprintln!("  Input shape: {:?}", vae.config().input_shape);
    eprintln!(
        "  Batch size: {}, Epochs: {}",
        config.batch_size, config.num_epochs
    );
    eprintln!(
        "  Learning rate: {}, Reconstruction weight: {}",
        config.learning_rate, config.reconstruction_weight
    );
    eprintln!("  Model dir: {}", args.model_dir.display());
    eprintln!("  Metrics: {}", args.metrics_file.display());
    eprintln!();
    eprintln!("{}", vae.summary());
    eprintln!();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut compiled = vae.compile_with(&config);

    let start = Instant::now();
    let history = compiled.train(
        &images,
        &images,
        config.batch_size,
        config.num_epochs,
        &mut rng,
    )?;
    eprintln!("Training finished in {:.1}s", start.elapsed().as_secs_f64());

    // Append mode so a dashboard can tail it
    if let Some(parent) = args.metrics_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut metrics_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.metrics_file)?;
    for metrics in &history.epochs {
        writeln!(metrics_file, "{}", serde_json::to_string(metrics)?)?;
    }

    let vae = compiled.into_inner();
    vae.save(&args.model_dir)?;
    config.save(args.model_dir.join("training.json"))?;

    if let Some(last) = history.last() {
        eprintln!(
            "Final loss: {:.4} (reconstruction {:.6}, kl {:.4})",
            last.loss, last.reconstruction_loss, last.kl_loss
        );
    }
    eprintln!("Saved model to {}", args.model_dir.display());
    Ok(())
}
