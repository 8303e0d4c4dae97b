//! VAE objective: weighted reconstruction error plus KL divergence.
//!
//! Every term is returned per sample (shape `[batch]`); reducing over the
//! batch is left to the training loop.
//!
//! ```text
//! reconstruction = mean_{h,w,c} (y_true - y_pred)²
//! divergence     = -½ Σ_k (1 + log σ²_k - μ_k² - exp(log σ²_k))
//! combined       = weight · reconstruction + divergence
//! ```

use burn::prelude::*;

use crate::core::{EncoderOutput, VaeOutput};

/// Per-sample loss terms for one batch.
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    pub combined: Tensor<B, 1>,
    pub reconstruction: Tensor<B, 1>,
    pub divergence: Tensor<B, 1>,
}

/// Mean squared error over every non-batch axis, one value per sample.
pub fn reconstruction_loss<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
    let [batch, ..] = y_true.dims();
    let error = y_true - y_pred;
    (error.clone() * error)
        .flatten::<2>(1, 3)
        .mean_dim(1)
        .reshape([batch])
}

/// KL divergence between `N(mu, diag(exp(log_sigma2)))` and `N(0, I)`, per sample.
pub fn kl_divergence<B: Backend>(latent: &EncoderOutput<B>) -> Tensor<B, 1> {
    let [batch, _] = latent.mu.dims();
    let mu = latent.mu.clone();
    let log_sigma2 = latent.log_sigma2.clone();

    let inner = log_sigma2.clone().add_scalar(1.0) - mu.clone() * mu - log_sigma2.exp();
    inner.sum_dim(1).reshape([batch]).mul_scalar(-0.5)
}

/// `weight * reconstruction + divergence`, per sample.
pub fn combined_loss<B: Backend>(
    weight: f64,
    y_true: Tensor<B, 4>,
    y_pred: Tensor<B, 4>,
    latent: &EncoderOutput<B>,
) -> Tensor<B, 1> {
    reconstruction_loss(y_true, y_pred).mul_scalar(weight) + kl_divergence(latent)
}

/// All three terms for a forward pass, computing each only once.
pub fn loss_terms<B: Backend>(
    weight: f64,
    y_true: Tensor<B, 4>,
    output: &VaeOutput<B>,
) -> LossTerms<B> {
    let reconstruction = reconstruction_loss(y_true, output.reconstruction.clone());
    let divergence = kl_divergence(&output.latent);
    let combined = reconstruction.clone().mul_scalar(weight) + divergence.clone();
    LossTerms {
        combined,
        reconstruction,
        divergence,
    }
}
