//! Optimisation: compiling a built model with Adam and the minibatch training loop.
//!
//! A [`VariationalAutoencoder`] on an autodiff backend is turned into a
//! [`CompiledVae`] by [`VariationalAutoencoder::compile`]; only the compiled
//! form can be trained.

pub mod loss;

pub use loss::{combined_loss, kl_divergence, loss_terms, reconstruction_loss, LossTerms};

use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use ndarray::{Array4, Axis};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::backend::convert::array4_to_tensor;
use crate::core::{Vae, VaeError, VaeResult, VariationalAutoencoder};

/// Adam's numerical-stability term.
pub const ADAM_EPSILON: f32 = 1e-7;

/// Hyper-parameters for a training run.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = 1e-4)]
    pub learning_rate: f64,
    /// Multiplier on the reconstruction term of the loss
    #[config(default = 1000000.0)]
    pub reconstruction_weight: f64,
    #[config(default = 32)]
    pub batch_size: usize,
    #[config(default = 50)]
    pub num_epochs: usize,
    /// Seed for weight shuffling and latent sampling
    #[config(default = 42)]
    pub seed: u64,
}

/// Metrics for one pass over the training set.
///
/// Losses are per-sample means over the epoch.
#[derive(Debug, Clone, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub reconstruction_loss: f64,
    pub kl_loss: f64,
    pub num_batches: usize,
    pub num_samples: usize,
    pub elapsed_secs: f64,
}

/// Per-epoch metrics of a [`CompiledVae::train`] call, in order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Combined loss of every epoch.
    pub fn losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|m| m.loss).collect()
    }
}

impl<B: AutodiffBackend> VariationalAutoencoder<B> {
    /// Attach an Adam optimizer and fix the loss weighting.
    ///
    /// Consumes the model; recover it with [`CompiledVae::into_inner`].
    pub fn compile(
        self,
        learning_rate: f64,
        reconstruction_weight: f64,
    ) -> CompiledVae<B, impl Optimizer<Vae<B>, B>> {
        let optimizer = AdamConfig::new()
            .with_epsilon(ADAM_EPSILON)
            .init::<B, Vae<B>>();
        debug!(learning_rate, reconstruction_weight, "Compiled with Adam");
        CompiledVae {
            vae: self,
            optimizer,
            learning_rate,
            reconstruction_weight,
        }
    }

    /// [`compile`](Self::compile) with the rates from a [`TrainingConfig`].
    pub fn compile_with(self, config: &TrainingConfig) -> CompiledVae<B, impl Optimizer<Vae<B>, B>> {
        self.compile(config.learning_rate, config.reconstruction_weight)
    }

    /// Copy of the model on the inner backend, with batch norm in inference mode.
    pub fn valid(&self) -> VariationalAutoencoder<B::InnerBackend> {
        VariationalAutoencoder {
            config: self.config.clone(),
            model: self.model.valid(),
            summary: self.summary.clone(),
            device: self.device.clone(),
        }
    }
}

/// A model ready for gradient descent.
pub struct CompiledVae<B: AutodiffBackend, O> {
    vae: VariationalAutoencoder<B>,
    optimizer: O,
    learning_rate: f64,
    reconstruction_weight: f64,
}

impl<B, O> CompiledVae<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Vae<B>, B>,
{
    pub fn vae(&self) -> &VariationalAutoencoder<B> {
        &self.vae
    }

    pub fn into_inner(self) -> VariationalAutoencoder<B> {
        self.vae
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn reconstruction_weight(&self) -> f64 {
        self.reconstruction_weight
    }

    /// Minimise the combined loss of `x` against targets `y`.
    ///
    /// `x` and `y` are channel-last `[n, height, width, channels]` and must
    /// match the configured input shape. Every epoch visits each sample once
    /// in an order shuffled with `rng`; the last batch may be smaller.
    ///
    /// # Errors
    /// - `Configuration` if `batch_size` is zero or the set is empty.
    /// - `ShapeMismatch` if `x` or `y` disagree with the input shape or each other.
    pub fn train<R: Rng + ?Sized>(
        &mut self,
        x: &Array4<f32>,
        y: &Array4<f32>,
        batch_size: usize,
        num_epochs: usize,
        rng: &mut R,
    ) -> VaeResult<TrainingHistory> {
        self.check_dataset(x, y, batch_size)?;

        info!(
            samples = x.shape()[0],
            batch_size,
            num_epochs,
            learning_rate = self.learning_rate,
            "Start training"
        );
        let mut history = TrainingHistory::default();
        for epoch in 1..=num_epochs {
            let metrics = self.train_epoch(epoch, x, y, batch_size, rng);
            info!(
                epoch,
                loss = metrics.loss,
                reconstruction = metrics.reconstruction_loss,
                kl = metrics.kl_loss,
                "Epoch {epoch}/{num_epochs} done in {:.1}s",
                metrics.elapsed_secs
            );
            history.epochs.push(metrics);
        }
        info!("End training");
        Ok(history)
    }

    fn check_dataset(&self, x: &Array4<f32>, y: &Array4<f32>, batch_size: usize) -> VaeResult<()> {
        if batch_size == 0 {
            return Err(VaeError::Configuration("batch size must be positive".to_string()));
        }
        if x.shape()[0] == 0 {
            return Err(VaeError::Configuration("training set is empty".to_string()));
        }
        let expected = self.vae.config().input_shape;
        if x.shape()[1..] != expected[..] {
            return Err(VaeError::ShapeMismatch(format!(
                "training inputs have sample shape {:?}, model expects {:?}",
                &x.shape()[1..],
                expected
            )));
        }
        if x.shape() != y.shape() {
            return Err(VaeError::ShapeMismatch(format!(
                "inputs {:?} and targets {:?} differ",
                x.shape(),
                y.shape()
            )));
        }
        Ok(())
    }

    fn train_epoch<R: Rng + ?Sized>(
        &mut self,
        epoch: usize,
        x: &Array4<f32>,
        y: &Array4<f32>,
        batch_size: usize,
        rng: &mut R,
    ) -> EpochMetrics {
        let start_time = Instant::now();
        let num_samples = x.shape()[0];
        let num_batches = num_samples.div_ceil(batch_size);
        let device = self.vae.device.clone();

        let mut indices: Vec<usize> = (0..num_samples).collect();
        shuffle_indices(&mut indices, rng);

        let mut total = 0.0f64;
        let mut total_reconstruction = 0.0f64;
        let mut total_kl = 0.0f64;

        let mut model = self.vae.model.clone();
        for batch_idx in 0..num_batches {
            let start = batch_idx * batch_size;
            let end = (start + batch_size).min(num_samples);
            let batch_indices = &indices[start..end];

            let inputs = array4_to_tensor::<B>(x.select(Axis(0), batch_indices).view(), &device);
            let targets = array4_to_tensor::<B>(y.select(Axis(0), batch_indices).view(), &device);

            let output = model.forward(inputs, rng);
            let terms = loss_terms(self.reconstruction_weight, targets, &output);

            total += sum_scalar(terms.combined.clone());
            total_reconstruction += sum_scalar(terms.reconstruction);
            total_kl += sum_scalar(terms.divergence);

            let loss = terms.combined.mean();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = self.optimizer.step(self.learning_rate, model, grads);
        }
        self.vae.model = model;

        let n = num_samples as f64;
        EpochMetrics {
            epoch,
            loss: total / n,
            reconstruction_loss: total_reconstruction / n,
            kl_loss: total_kl / n,
            num_batches,
            num_samples,
            elapsed_secs: start_time.elapsed().as_secs_f64(),
        }
    }
}

fn sum_scalar<B: Backend>(values: Tensor<B, 1>) -> f64 {
    values.sum().into_scalar().elem::<f64>()
}

/// Fisher-Yates shuffle driven by the caller's RNG.
fn shuffle_indices<R: Rng + ?Sized>(indices: &mut [usize], rng: &mut R) {
    for i in (1..indices.len()).rev() {
        let j = rng.gen_range(0..=i);
        indices.swap(i, j);
    }
}
