//! The composite VAE: encoder and decoder wired into one differentiable module,
//! plus the build step that produces it together with a layer summary.

use std::fmt;

use burn::prelude::*;
use rand::Rng;
use tracing::{debug, info};

use super::config::{LayerId, LayerRole, VaeConfig};
use super::decoder::{Decoder, OUTPUT_CHANNELS};
use super::encoder::{Encoder, EncoderOutput};
use super::shape::SpatialShape;
use super::VaeResult;

/// Result of a full forward pass.
#[derive(Debug, Clone)]
pub struct VaeOutput<B: Backend> {
    /// Decoder output, channel-last `[batch, height, width, 1]`
    pub reconstruction: Tensor<B, 4>,
    /// Encoder outputs the loss needs: sampled code, mean, log-variance
    pub latent: EncoderOutput<B>,
}

/// Encoder followed by decoder. Owns every learnable tensor of the model.
#[derive(Module, Debug)]
pub struct Vae<B: Backend> {
    encoder: Encoder<B>,
    decoder: Decoder<B>,
}

impl VaeConfig {
    /// Validate the configuration, then build encoder and decoder on `device`.
    ///
    /// # Errors
    /// - `Configuration` if [`VaeConfig::validate`] fails; no layer is built.
    pub fn init<B: Backend>(&self, device: &B::Device) -> VaeResult<Vae<B>> {
        self.validate()?;
        let encoder = Encoder::new(self, device);
        let decoder = Decoder::new(self, self.shape_before_latent(), device);
        Ok(Vae { encoder, decoder })
    }
}

impl<B: Backend> Vae<B> {
    pub fn encoder(&self) -> &Encoder<B> {
        &self.encoder
    }

    pub fn decoder(&self) -> &Decoder<B> {
        &self.decoder
    }

    /// `Decoder(Encoder(x))` with sampling noise drawn from `rng`.
    pub fn forward<R: Rng + ?Sized>(&self, images: Tensor<B, 4>, rng: &mut R) -> VaeOutput<B> {
        let latent = self.encoder.forward(images, rng);
        let reconstruction = self.decoder.forward(latent.z.clone());
        VaeOutput {
            reconstruction,
            latent,
        }
    }

    /// Latent mean and log-variance for `images`.
    pub fn encode(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        self.encoder.encode(images)
    }

    /// Generate images from latent points `[batch, latent_dim]`.
    pub fn decode(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        self.decoder.forward(z)
    }

    /// Reconstruct `images`, returning the reconstruction and the sampled codes.
    pub fn reconstruct<R: Rng + ?Sized>(
        &self,
        images: Tensor<B, 4>,
        rng: &mut R,
    ) -> (Tensor<B, 4>, Tensor<B, 2>) {
        let output = self.forward(images, rng);
        (output.reconstruction, output.latent.z)
    }
}

/// One row of a [`ModelSummary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub id: LayerId,
    /// Per-sample output shape, channel-last.
    pub output_shape: Vec<usize>,
    pub trainable_params: usize,
    /// Batch-norm running statistics.
    pub non_trainable_params: usize,
}

/// Layer-by-layer description of a built model, in forward order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSummary {
    pub layers: Vec<LayerSummary>,
    pub shape_before_latent: SpatialShape,
}

impl ModelSummary {
    /// Derive the summary from a validated configuration.
    #[must_use]
    pub fn from_config(config: &VaeConfig) -> Self {
        let mut layers = Vec::new();
        let mut push = |id: LayerId, output_shape: Vec<usize>, trainable: usize, running: usize| {
            layers.push(LayerSummary {
                id,
                output_shape,
                trainable_params: trainable,
                non_trainable_params: running,
            });
        };

        // conv weights + bias, then batch-norm gamma/beta and running mean/var
        let block_params =
            |c_in: usize, c_out: usize, k: usize| (k * k * c_in * c_out + 3 * c_out, 2 * c_out);

        let mut channels_in = config.input_shape[2];
        for (l, shape) in config.encoder_shapes().into_iter().enumerate() {
            let (trainable, running) = block_params(channels_in, shape.channels, config.kernels[l]);
            push(
                LayerId::new(LayerRole::EncoderBlock, l + 1),
                shape.to_array().to_vec(),
                trainable,
                running,
            );
            channels_in = shape.channels;
        }

        let before = config.shape_before_latent();
        let latent = config.latent_dim;
        let dense = before.numel() * latent + latent;
        push(LayerId::single(LayerRole::Mu), vec![latent], dense, 0);
        push(LayerId::single(LayerRole::LogSigma2), vec![latent], dense, 0);
        push(LayerId::single(LayerRole::Sampling), vec![latent], 0, 0);
        push(
            LayerId::single(LayerRole::DecoderDense),
            vec![before.numel()],
            latent * before.numel() + before.numel(),
            0,
        );
        push(
            LayerId::single(LayerRole::DecoderReshape),
            before.to_array().to_vec(),
            0,
            0,
        );

        let n = config.n_conv_layers();
        let mut shape = before;
        for (position, l) in (1..n).rev().enumerate() {
            let next = shape.after_conv_transpose(config.filters[l], config.strides[l]);
            let (trainable, running) = block_params(shape.channels, next.channels, config.kernels[l]);
            push(
                LayerId::new(LayerRole::DecoderBlock, position + 1),
                next.to_array().to_vec(),
                trainable,
                running,
            );
            shape = next;
        }

        let output = shape.after_conv_transpose(OUTPUT_CHANNELS, config.strides[0]);
        let k = config.kernels[0];
        push(
            LayerId::single(LayerRole::DecoderOutput),
            output.to_array().to_vec(),
            k * k * shape.channels * OUTPUT_CHANNELS + OUTPUT_CHANNELS,
            0,
        );
        push(
            LayerId::single(LayerRole::Sigmoid),
            output.to_array().to_vec(),
            0,
            0,
        );

        Self {
            layers,
            shape_before_latent: before,
        }
    }

    #[must_use]
    pub fn trainable_params(&self) -> usize {
        self.layers.iter().map(|l| l.trainable_params).sum()
    }

    #[must_use]
    pub fn total_params(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.trainable_params + l.non_trainable_params)
            .sum()
    }

    /// Per-sample shape of the decoder output.
    #[must_use]
    pub fn output_shape(&self) -> &[usize] {
        self.layers
            .last()
            .map(|l| l.output_shape.as_slice())
            .unwrap_or(&[])
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerSummary> {
        self.layers.iter().find(|l| l.id == id)
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<20} {:<18} {:>12}", "Layer", "Output shape", "Params")?;
        for layer in &self.layers {
            writeln!(
                f,
                "{:<20} {:<18} {:>12}",
                layer.id.to_string(),
                format!("{:?}", layer.output_shape),
                layer.trainable_params + layer.non_trainable_params
            )?;
        }
        writeln!(f, "Total params: {}", self.total_params())?;
        write!(f, "Trainable params: {}", self.trainable_params())
    }
}

/// A built VAE together with the configuration it was built from.
///
/// This is the lifecycle owner: built once from a [`VaeConfig`], optionally
/// compiled for training, and saved/loaded as configuration plus weights.
pub struct VariationalAutoencoder<B: Backend> {
    pub(crate) config: VaeConfig,
    pub(crate) model: Vae<B>,
    pub(crate) summary: ModelSummary,
    pub(crate) device: B::Device,
}

impl<B: Backend> fmt::Debug for VariationalAutoencoder<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariationalAutoencoder")
            .field("config", &self.config)
            .field("params", &self.summary.total_params())
            .field("device", &format!("{:?}", self.device))
            .finish()
    }
}

impl<B: Backend> VariationalAutoencoder<B> {
    /// Build encoder, decoder and the composite model.
    ///
    /// # Errors
    /// - `Configuration` if the filter, kernel and stride sequences differ in
    ///   length or the configuration is otherwise degenerate.
    pub fn build(config: VaeConfig, device: &B::Device) -> VaeResult<Self> {
        info!("Start building variational autoencoder");
        let model = config.init(device)?;
        let summary = ModelSummary::from_config(&config);
        debug!("\n{summary}");
        info!(
            layers = config.n_conv_layers(),
            latent_dim = config.latent_dim,
            params = summary.total_params(),
            "End building variational autoencoder"
        );
        Ok(Self {
            config,
            model,
            summary,
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &VaeConfig {
        &self.config
    }

    pub fn model(&self) -> &Vae<B> {
        &self.model
    }

    pub fn summary(&self) -> &ModelSummary {
        &self.summary
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn shape_before_latent(&self) -> SpatialShape {
        self.summary.shape_before_latent
    }

    /// See [`Vae::forward`].
    pub fn forward<R: Rng + ?Sized>(&self, images: Tensor<B, 4>, rng: &mut R) -> VaeOutput<B> {
        self.model.forward(images, rng)
    }

    /// See [`Vae::reconstruct`].
    pub fn reconstruct<R: Rng + ?Sized>(
        &self,
        images: Tensor<B, 4>,
        rng: &mut R,
    ) -> (Tensor<B, 4>, Tensor<B, 2>) {
        self.model.reconstruct(images, rng)
    }

    /// Decode latent points `[batch, latent_dim]` into images.
    pub fn sample(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        self.model.decode(z)
    }
}
