//! Model configuration and structured layer identifiers.

use std::fmt;

use burn::config::Config;

use super::shape::SpatialShape;
use super::{VaeError, VaeResult};

/// Architecture of a convolutional VAE.
///
/// `filters`, `kernels` and `strides` describe the encoder's convolution
/// stack, one entry per layer; the decoder mirrors them in reverse. The three
/// sequences must have equal length, which defines the number of layers.
///
/// Persisted verbatim as JSON (field order preserved) so a saved model can be
/// rebuilt before its weights are loaded.
#[derive(Config, Debug, PartialEq)]
pub struct VaeConfig {
    /// Channel-last sample shape: `[height, width, channels]`.
    pub input_shape: [usize; 3],
    /// Output channels of each encoder convolution.
    pub filters: Vec<usize>,
    /// Square kernel size of each encoder convolution.
    pub kernels: Vec<usize>,
    /// Stride of each encoder convolution.
    pub strides: Vec<usize>,
    /// Dimensionality of the latent space.
    pub latent_dim: usize,
}

impl VaeConfig {
    /// Number of convolution blocks in the encoder.
    #[must_use]
    pub fn n_conv_layers(&self) -> usize {
        self.filters.len()
    }

    #[must_use]
    pub fn input(&self) -> SpatialShape {
        SpatialShape::from(self.input_shape)
    }

    /// Check the configuration before any layer is constructed.
    ///
    /// # Errors
    /// - `Configuration` if the filter, kernel and stride sequences differ in
    ///   length, are empty, or contain zeros, or if any input or latent
    ///   dimension is zero.
    pub fn validate(&self) -> VaeResult<()> {
        let n = self.filters.len();
        if self.kernels.len() != n {
            return Err(VaeError::Configuration(format!(
                "Number of kernels ({}) should be same as number of filters ({n})",
                self.kernels.len()
            )));
        }
        if self.strides.len() != n {
            return Err(VaeError::Configuration(format!(
                "Number of strides ({}) should be same as number of filters ({n})",
                self.strides.len()
            )));
        }
        if n == 0 {
            return Err(VaeError::Configuration(
                "At least one convolutional layer is required".to_string(),
            ));
        }
        if self.input_shape.contains(&0) {
            return Err(VaeError::Configuration(format!(
                "Input shape {:?} has a zero dimension",
                self.input_shape
            )));
        }
        if self.latent_dim == 0 {
            return Err(VaeError::Configuration(
                "Latent dimension must be positive".to_string(),
            ));
        }
        for (name, values) in [
            ("filters", &self.filters),
            ("kernels", &self.kernels),
            ("strides", &self.strides),
        ] {
            if let Some(l) = values.iter().position(|&v| v == 0) {
                return Err(VaeError::Configuration(format!(
                    "{name}[{l}] must be positive"
                )));
            }
        }
        Ok(())
    }

    /// Shape after each encoder block, in order.
    #[must_use]
    pub fn encoder_shapes(&self) -> Vec<SpatialShape> {
        let mut shape = self.input();
        self.filters
            .iter()
            .zip(&self.strides)
            .map(|(&filters, &stride)| {
                shape = shape.after_conv(filters, stride);
                shape
            })
            .collect()
    }

    /// Shape of the final encoder feature map, right before flattening.
    #[must_use]
    pub fn shape_before_latent(&self) -> SpatialShape {
        self.encoder_shapes()
            .last()
            .copied()
            .unwrap_or_else(|| self.input())
    }
}

/// Role a layer plays in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerRole {
    EncoderBlock,
    Mu,
    LogSigma2,
    Sampling,
    DecoderDense,
    DecoderReshape,
    DecoderBlock,
    DecoderOutput,
    Sigmoid,
}

impl LayerRole {
    fn prefix(self) -> &'static str {
        match self {
            LayerRole::EncoderBlock => "encoder_block",
            LayerRole::Mu => "mu",
            LayerRole::LogSigma2 => "log_sigma2",
            LayerRole::Sampling => "encoder_output",
            LayerRole::DecoderDense => "decoder_dense",
            LayerRole::DecoderReshape => "decoder_reshape",
            LayerRole::DecoderBlock => "decoder_block",
            LayerRole::DecoderOutput => "decoder_output",
            LayerRole::Sigmoid => "sigmoid",
        }
    }
}

/// Structured layer identity: role plus 1-based position within that role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId {
    pub role: LayerRole,
    pub index: usize,
}

impl LayerId {
    #[must_use]
    pub fn new(role: LayerRole, index: usize) -> Self {
        Self { role, index }
    }

    /// Identifier for a role that occurs once.
    #[must_use]
    pub fn single(role: LayerRole) -> Self {
        Self { role, index: 1 }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            LayerRole::EncoderBlock | LayerRole::DecoderBlock => {
                write!(f, "{}_{}", self.role.prefix(), self.index)
            }
            _ => f.write_str(self.role.prefix()),
        }
    }
}
