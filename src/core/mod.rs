//! Core VAE network: configuration, layer stacks, and the latent bottleneck.
//!
//! The model is built in a fixed order:
//!
//! ```text
//! VaeConfig ──validate──▶ Encoder ──shape_before_latent──▶ Decoder ──▶ Vae
//! ```
//!
//! ## Reparameterization
//!
//! The encoder emits a mean and a log-variance per latent dimension and
//! samples the latent code as
//! ```text
//! z = μ + exp(log σ² / 2) ⊙ ε,    ε ~ N(0, I)
//! ```
//! where `ε` is drawn from a caller-supplied RNG and enters the graph as a
//! constant, so gradients reach `μ` and `log σ²` only.

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod layers;
pub mod model;
pub mod shape;

pub use config::{LayerId, LayerRole, VaeConfig};
pub use decoder::Decoder;
pub use encoder::{reparameterize, standard_normal, Encoder, EncoderOutput};
pub use model::{LayerSummary, ModelSummary, Vae, VaeOutput, VariationalAutoencoder};
pub use shape::SpatialShape;

use thiserror::Error;

/// Error type for VAE operations.
#[derive(Debug, Clone, Error)]
pub enum VaeError {
    /// Malformed model configuration or training arguments
    #[error("Invalid config: {0}")]
    Configuration(String),
    /// Missing or corrupt artifact, or weights that do not fit the architecture
    #[error("Persistence failure: {0}")]
    Persistence(String),
    /// Data whose shape disagrees with the model
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
}

pub type VaeResult<T> = Result<T, VaeError>;
