//! VAE inference binary.
//!
//! Loads a saved model directory and either reconstructs images from an IDX
//! file or decodes random latent points. Results are written as PGM grids.

use burn::prelude::*;
use clap::Parser;
use ndarray::{s, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use vae::backend::convert::{array4_to_tensor, tensor_to_array2, tensor_to_array4};
use vae::backend::{init_device, InferenceBackend};
use vae::core::standard_normal;
use vae::data::{load_idx_images, save_image, tile};
use vae::VariationalAutoencoder;

#[derive(Parser, Debug)]
#[command(
    name = "vae-reconstruct",
    about = "Reconstruct images with, or sample from, a trained VAE"
)]
struct Args {
    /// Saved model directory
    #[arg(long, default_value = "data/models/vae")]
    model_dir: PathBuf,

    /// IDX image file to reconstruct from
    #[arg(long, default_value = "data/mnist/t10k-images-idx3-ubyte")]
    images: PathBuf,

    /// Index of the first image to reconstruct
    #[arg(long, default_value_t = 0)]
    index: usize,

    /// Number of images to reconstruct
    #[arg(long, default_value_t = 8)]
    count: usize,

    /// Decode N points drawn from the latent prior instead of reconstructing
    #[arg(long)]
    sample: Option<usize>,

    /// Output directory for PGM files
    #[arg(long, default_value = "data/output/reconstructions")]
    output_dir: PathBuf,

    /// Pixel upscaling factor of written images
    #[arg(long, default_value_t = 4)]
    scale: usize,

    /// Images per row in written grids
    #[arg(long, default_value_t = 8)]
    columns: usize,

    /// RNG seed for latent sampling
    #[arg(long, default_value_t = 42)]
    seed: u64,
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
    let device = init_device();
    let vae = VariationalAutoencoder::<InferenceBackend>::load(&args.model_dir, &device)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    eprintln!("Loaded model from {}", args.model_dir.display());
    eprintln!("  Input shape: {:?}, latent dim: {}", vae.config().input_shape, vae.config().latent_dim);

    match args.sample {
        Some(n) => sample(args, &vae, n, &mut rng, &device),
        None => reconstruct(args, &vae, &mut rng, &device),
    }
}

fn sample(
    args: &Args,
    vae: &VariationalAutoencoder<InferenceBackend>,
    n: usize,
    rng: &mut StdRng,
    device: &<InferenceBackend as Backend>::Device,
) -> Result<(), Box<dyn std::error::Error>> {
    let z = standard_normal::<InferenceBackend, _>([n, vae.config().latent_dim], rng, device);
    let generated = tensor_to_array4(vae.sample(z))?;

    let path = args.output_dir.join("samples.pgm");
    save_image(&path, tile(generated.view(), args.columns).view(), args.scale)?;
    eprintln!("Wrote {n} samples to {}", path.display());
    Ok(())
}

fn reconstruct(
    args: &Args,
    vae: &VariationalAutoencoder<InferenceBackend>,
    rng: &mut StdRng,
    device: &<InferenceBackend as Backend>::Device,
) -> Result<(), Box<dyn std::error::Error>> {
    let images = load_idx_images(&args.images)
        .map_err(|e| format!("Failed to load {}: {e}", args.images.display()))?;
    let total = images.shape()[0];
    if args.index >= total {
        return Err(format!("index {} out of range for {total} images", args.index).into());
    }
    let end = (args.index + args.count).min(total);
    let batch = images.slice(s![args.index..end, .., .., ..]).to_owned();

    let inputs = array4_to_tensor::<InferenceBackend>(batch.view(), device);
    let (outputs, z) = vae.reconstruct(inputs, rng);
    let outputs = tensor_to_array4(outputs)?;
    let codes = tensor_to_array2(z)?;

    println!("{:>6}  {:>10}  latent", "image", "mse");
    for (i, (input, output)) in batch
        .axis_iter(Axis(0))
        .zip(outputs.axis_iter(Axis(0)))
        .enumerate()
    {
        let diff = &input - &output;
        let mse = diff.mapv(|d| d * d).mean().unwrap_or(0.0);
        println!("{:>6}  {:>10.6}  {:?}", args.index + i, mse, codes.row(i).to_vec());
    }

    let input_path = args.output_dir.join("inputs.pgm");
    let output_path = args.output_dir.join("reconstructions.pgm");
    save_image(&input_path, tile(batch.view(), args.columns).view(), args.scale)?;
    save_image(&output_path, tile(outputs.view(), args.columns).view(), args.scale)?;
    eprintln!("Wrote {} and {}", input_path.display(), output_path.display());
    Ok(())
}
