//! # VAE (Convolutional Variational Autoencoder)
//!
//! A convolutional variational autoencoder on top of burn.
//!
//! ## Overview
//!
//! The encoder is a stack of strided convolutions that ends in two dense heads,
//! the latent mean `μ` and log-variance `log σ²`. A latent code is sampled with
//! the reparameterization trick, and a mirrored stack of transposed
//! convolutions decodes it back to an image in `(0, 1)`. Training minimises
//! `weight · MSE + KL(N(μ, σ²) ‖ N(0, I))` with Adam.
//!
//! Images cross the public API channel-last, `[batch, height, width, channels]`.
//!
//! ## Structure
//!
//! - [`core`] — Configuration, layers, encoder, decoder, composite model
//! - [`training`] — Loss terms, compile, minibatch training loop
//! - [`checkpoint`] — Save/load as `params.json` + `weights.mpk`
//! - [`data`] — IDX loading, image output
//! - [`backend`] — Backend selection and ndarray ↔ tensor conversion
//! - [`logging`] — Tracing subscriber setup for the binaries

pub mod backend;
pub mod checkpoint;
pub mod core;
pub mod data;
pub mod logging;
pub mod training;

pub use core::{
    EncoderOutput, LayerId, LayerRole, ModelSummary, SpatialShape, Vae, VaeConfig, VaeError,
    VaeOutput, VaeResult, VariationalAutoencoder,
};
pub use training::{CompiledVae, EpochMetrics, TrainingConfig, TrainingHistory};
