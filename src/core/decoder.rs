//! Decoder: dense projection and transposed-convolution stack back to image space.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

use super::config::VaeConfig;
use super::layers::{glorot_uniform, zero_bias, DeconvBlock, SameConvTranspose2d};
use super::shape::SpatialShape;

/// Channels produced by the final transposed convolution.
///
/// Fixed at one intensity channel whatever the input depth.
pub const OUTPUT_CHANNELS: usize = 1;

/// Mirror of the [`Encoder`](super::Encoder): latent code in, `[batch, height, width, 1]`
/// image in `(0, 1)` out.
///
/// Walks the encoder layers in reverse, skipping the outermost one, which is
/// replaced by a transposed convolution to [`OUTPUT_CHANNELS`].
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    dense: Linear<B>,
    blocks: Vec<DeconvBlock<B>>,
    output: SameConvTranspose2d<B>,
    height: usize,
    width: usize,
    channels: usize,
}

impl<B: Backend> Decoder<B> {
    /// Build the decoder layers for `config`, starting from the encoder's
    /// `shape_before_latent`. The config must already be validated.
    pub fn new(config: &VaeConfig, shape_before_latent: SpatialShape, device: &B::Device) -> Self {
        let flat_dim = shape_before_latent.numel();
        let mut dense = LinearConfig::new(config.latent_dim, flat_dim)
            .with_initializer(glorot_uniform(config.latent_dim, flat_dim))
            .init(device);
        dense.bias = zero_bias(dense.bias, flat_dim, device);

        let mut channels_in = shape_before_latent.channels;
        let mut blocks = Vec::with_capacity(config.n_conv_layers().saturating_sub(1));
        for l in (1..config.n_conv_layers()).rev() {
            blocks.push(DeconvBlock::new(
                channels_in,
                config.filters[l],
                config.kernels[l],
                config.strides[l],
                device,
            ));
            channels_in = config.filters[l];
        }

        let output = SameConvTranspose2d::new(
            channels_in,
            OUTPUT_CHANNELS,
            config.kernels[0],
            config.strides[0],
            device,
        );

        Self {
            dense,
            blocks,
            output,
            height: shape_before_latent.height,
            width: shape_before_latent.width,
            channels: shape_before_latent.channels,
        }
    }

    /// Number of transposed-convolution blocks before the output layer.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Decode latent codes `[batch, latent_dim]` into channel-last images.
    pub fn forward(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch, _] = z.dims();
        let mut x = self
            .dense
            .forward(z)
            .reshape([batch, self.channels, self.height, self.width]);
        for block in &self.blocks {
            x = block.forward(x);
        }
        // [batch, c, h, w] -> [batch, h, w, c]
        sigmoid(self.output.forward(x)).permute([0, 2, 3, 1])
    }
}
