//! Building blocks shared by the encoder and decoder.
//!
//! Tensors inside the network are channel-first (`[batch, channels, height, width]`),
//! the layout burn's convolution and batch-norm modules expect.

use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::relu;

use super::shape::{conv_transpose_output_size, same_padding, same_transpose_crop};

/// Batch-norm momentum in burn's convention (weight of the new batch statistic).
pub const BATCH_NORM_MOMENTUM: f64 = 0.01;
/// Variance epsilon for batch normalization.
pub const BATCH_NORM_EPSILON: f64 = 1e-3;

/// Glorot/Xavier uniform initialisation, `U(-l, l)` with `l = sqrt(6 / (fan_in + fan_out))`.
///
/// The bound is computed here because burn's transposed convolutions do not
/// pass a fan-out to their initializer.
#[must_use]
pub fn glorot_uniform(fan_in: usize, fan_out: usize) -> Initializer {
    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
    Initializer::Uniform {
        min: -limit,
        max: limit,
    }
}

/// Replace a freshly initialised bias with zeros.
pub fn zero_bias<B: Backend>(
    bias: Option<Param<Tensor<B, 1>>>,
    size: usize,
    device: &B::Device,
) -> Option<Param<Tensor<B, 1>>> {
    bias.map(|_| Param::from_tensor(Tensor::zeros([size], device)))
}

fn batch_norm<B: Backend>(channels: usize, device: &B::Device) -> BatchNorm<B, 2> {
    BatchNormConfig::new(channels)
        .with_momentum(BATCH_NORM_MOMENTUM)
        .with_epsilon(BATCH_NORM_EPSILON)
        .init(device)
}

/// Convolution whose output size is `ceil(input / stride)` for any kernel size.
///
/// The input is zero-padded asymmetrically (extra row/column at the bottom/right)
/// before a valid convolution, since burn's symmetric padding cannot express
/// strided "same" convolutions.
#[derive(Module, Debug)]
pub struct SameConv2d<B: Backend> {
    conv: Conv2d<B>,
    kernel: usize,
    stride: usize,
}

impl<B: Backend> SameConv2d<B> {
    pub fn new(
        channels_in: usize,
        channels_out: usize,
        kernel: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let receptive = kernel * kernel;
        let mut conv = Conv2dConfig::new([channels_in, channels_out], [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Valid)
            .with_initializer(glorot_uniform(receptive * channels_in, receptive * channels_out))
            .init(device);
        conv.bias = zero_bias(conv.bias, channels_out, device);
        Self {
            conv,
            kernel,
            stride,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();
        let (top, bottom) = same_padding(height, self.kernel, self.stride);
        let (left, right) = same_padding(width, self.kernel, self.stride);

        let x = if top + bottom + left + right > 0 {
            x.pad((left, right, top, bottom), 0.0)
        } else {
            x
        };
        self.conv.forward(x)
    }
}

/// Transposed convolution whose output size is `input * stride`.
#[derive(Module, Debug)]
pub struct SameConvTranspose2d<B: Backend> {
    conv: ConvTranspose2d<B>,
    channels_out: usize,
    stride: usize,
    crop: usize,
}

impl<B: Backend> SameConvTranspose2d<B> {
    pub fn new(
        channels_in: usize,
        channels_out: usize,
        kernel: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let (crop, padding_out) = same_transpose_crop(kernel, stride);
        let receptive = kernel * kernel;
        let mut conv = ConvTranspose2dConfig::new([channels_in, channels_out], [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding([0, 0])
            .with_padding_out([padding_out, padding_out])
            .with_initializer(glorot_uniform(receptive * channels_out, receptive * channels_in))
            .init(device);
        conv.bias = zero_bias(conv.bias, channels_out, device);
        Self {
            conv,
            channels_out,
            stride,
            crop,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, _, height, width] = x.dims();
        let out_h = conv_transpose_output_size(height, self.stride);
        let out_w = conv_transpose_output_size(width, self.stride);

        let y = self.conv.forward(x);
        let [_, _, full_h, full_w] = y.dims();
        if full_h == out_h && full_w == out_w {
            return y;
        }
        y.slice([
            0..batch,
            0..self.channels_out,
            self.crop..self.crop + out_h,
            self.crop..self.crop + out_w,
        ])
    }
}

/// Encoder block: same conv → ReLU → batch norm.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: SameConv2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        channels_in: usize,
        channels_out: usize,
        kernel: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            conv: SameConv2d::new(channels_in, channels_out, kernel, stride, device),
            norm: batch_norm(channels_out, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.norm.forward(relu(self.conv.forward(x)))
    }
}

/// Decoder block: same transposed conv → ReLU → batch norm.
#[derive(Module, Debug)]
pub struct DeconvBlock<B: Backend> {
    conv: SameConvTranspose2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> DeconvBlock<B> {
    pub fn new(
        channels_in: usize,
        channels_out: usize,
        kernel: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            conv: SameConvTranspose2d::new(channels_in, channels_out, kernel, stride, device),
            norm: batch_norm(channels_out, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.norm.forward(relu(self.conv.forward(x)))
    }
}
