//! Encoder: convolution stack, latent projections, and reparameterized sampling.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use ndarray_rand::rand_distr::{Distribution, StandardNormal};
use rand::Rng;

use super::config::VaeConfig;
use super::layers::{glorot_uniform, zero_bias, ConvBlock};

/// Everything the encoder produces for a batch.
///
/// `mu` and `log_sigma2` are returned alongside the sampled code so the
/// divergence term can be computed from them directly.
#[derive(Debug, Clone)]
pub struct EncoderOutput<B: Backend> {
    /// Sampled latent code, shape `[batch, latent_dim]`
    pub z: Tensor<B, 2>,
    /// Latent mean, shape `[batch, latent_dim]`
    pub mu: Tensor<B, 2>,
    /// Latent log-variance, shape `[batch, latent_dim]`
    pub log_sigma2: Tensor<B, 2>,
}

/// Convolutional encoder mapping `[batch, height, width, channels]` images to
/// the parameters of a diagonal Gaussian over the latent space.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    mu: Linear<B>,
    log_sigma2: Linear<B>,
}

impl<B: Backend> Encoder<B> {
    /// Build the encoder layers. The config must already be validated.
    pub fn new(config: &VaeConfig, device: &B::Device) -> Self {
        let mut channels_in = config.input_shape[2];
        let mut blocks = Vec::with_capacity(config.n_conv_layers());
        for l in 0..config.n_conv_layers() {
            blocks.push(ConvBlock::new(
                channels_in,
                config.filters[l],
                config.kernels[l],
                config.strides[l],
                device,
            ));
            channels_in = config.filters[l];
        }

        let flat_dim = config.shape_before_latent().numel();
        let mut mu = LinearConfig::new(flat_dim, config.latent_dim)
            .with_initializer(glorot_uniform(flat_dim, config.latent_dim))
            .init(device);
        mu.bias = zero_bias(mu.bias, config.latent_dim, device);
        let mut log_sigma2 = LinearConfig::new(flat_dim, config.latent_dim)
            .with_initializer(glorot_uniform(flat_dim, config.latent_dim))
            .init(device);
        log_sigma2.bias = zero_bias(log_sigma2.bias, config.latent_dim, device);

        Self {
            blocks,
            mu,
            log_sigma2,
        }
    }

    /// Number of convolution blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Feature map right before flattening, channel-first `[batch, c, h, w]`.
    pub fn features(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        // [batch, h, w, c] -> [batch, c, h, w]
        let mut x = images.permute([0, 3, 1, 2]);
        for block in &self.blocks {
            x = block.forward(x);
        }
        x
    }

    /// Deterministic part of the encoder: `(mu, log_sigma2)`.
    pub fn encode(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let x = self.features(images).flatten::<2>(1, 3);
        let mu = self.mu.forward(x.clone());
        let log_sigma2 = self.log_sigma2.forward(x);
        (mu, log_sigma2)
    }

    /// Full encoder pass, drawing the sampling noise from `rng`.
    pub fn forward<R: Rng + ?Sized>(&self, images: Tensor<B, 4>, rng: &mut R) -> EncoderOutput<B> {
        let (mu, log_sigma2) = self.encode(images);
        let eps = standard_normal::<B, R>(mu.dims(), rng, &mu.device());
        let z = reparameterize(mu.clone(), log_sigma2.clone(), eps);
        EncoderOutput { z, mu, log_sigma2 }
    }
}

/// Reparameterization: `z = mu + exp(log_sigma2 / 2) * eps`, element-wise.
///
/// `eps` is treated as data, so gradients flow to `mu` and `log_sigma2` only.
pub fn reparameterize<B: Backend>(
    mu: Tensor<B, 2>,
    log_sigma2: Tensor<B, 2>,
    eps: Tensor<B, 2>,
) -> Tensor<B, 2> {
    mu + log_sigma2.div_scalar(2.0).exp() * eps
}

/// Draw a `[rows, cols]` tensor of independent `N(0, 1)` samples from `rng`.
pub fn standard_normal<B: Backend, R: Rng + ?Sized>(
    shape: [usize; 2],
    rng: &mut R,
    device: &B::Device,
) -> Tensor<B, 2> {
    let values: Vec<f32> = (0..shape[0] * shape[1])
        .map(|_| Distribution::<f32>::sample(&StandardNormal, rng))
        .collect();
    Tensor::from_data(TensorData::new(values, shape), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    fn test_device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    fn to_vec(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec().expect("tensor to vec")
    }

    #[test]
    fn test_reparameterize_standard_normal_is_identity() {
        let device = test_device();
        let mut rng = StdRng::seed_from_u64(7);
        let eps = standard_normal::<TestBackend, _>([4, 3], &mut rng, &device);
        let zeros = Tensor::<TestBackend, 2>::zeros([4, 3], &device);

        let z = reparameterize(zeros.clone(), zeros, eps.clone());
        assert_eq!(to_vec(z), to_vec(eps));
    }

    #[test]
    fn test_reparameterize_scales_and_shifts() {
        let device = test_device();
        let mu = Tensor::<TestBackend, 2>::from_floats([[1.0, -2.0]], &device);
        // log_sigma2 = ln 4 -> sigma = 2
        let log_sigma2 = Tensor::<TestBackend, 2>::from_floats([[4.0f32.ln(), 0.0]], &device);
        let eps = Tensor::<TestBackend, 2>::from_floats([[0.5, 3.0]], &device);

        let z = to_vec(reparameterize(mu, log_sigma2, eps));
        assert!((z[0] - 2.0).abs() < 1e-5, "got {}", z[0]);
        assert!((z[1] - 1.0).abs() < 1e-5, "got {}", z[1]);
    }

    #[test]
    fn test_reparameterize_gradients_reach_mu_and_log_sigma2() {
        type AutodiffBackend = burn::backend::Autodiff<TestBackend>;
        let device = test_device();
        let mu = Tensor::<AutodiffBackend, 2>::from_floats([[0.5, -1.0, 2.0]], &device).require_grad();
        let log_sigma2 =
            Tensor::<AutodiffBackend, 2>::from_floats([[0.0, 2.0f32.ln(), -1.0]], &device).require_grad();
        let eps = Tensor::<AutodiffBackend, 2>::from_floats([[1.5, -0.5, 0.25]], &device);

        let grads = reparameterize(mu.clone(), log_sigma2.clone(), eps.clone())
            .sum()
            .backward();

        // dz/dmu = 1
        let d_mu = to_vec(mu.grad(&grads).expect("mu gradient"));
        assert_eq!(d_mu, vec![1.0, 1.0, 1.0]);

        // dz/dlog_sigma2 = 0.5 * exp(log_sigma2 / 2) * eps
        let d_ls = to_vec(log_sigma2.grad(&grads).expect("log_sigma2 gradient"));
        let expected = [
            0.5 * 1.5,
            0.5 * 2.0f32.sqrt() * -0.5,
            0.5 * (-0.5f32).exp() * 0.25,
        ];
        for (got, want) in d_ls.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "got {got}, want {want}");
            assert!(got.abs() > 0.0);
        }

        assert!(eps.grad(&grads).is_none());
    }

    #[test]
    fn test_projection_biases_start_at_zero() {
        let device = test_device();
        let config = VaeConfig::new([8, 8, 1], vec![4], vec![3], vec![2], 3);
        let encoder = Encoder::<TestBackend>::new(&config, &device);
        for layer in [&encoder.mu, &encoder.log_sigma2] {
            let bias: Vec<f32> = layer
                .bias
                .as_ref()
                .expect("bias")
                .val()
                .into_data()
                .to_vec()
                .expect("tensor to vec");
            assert_eq!(bias, vec![0.0; 3]);
        }
    }

    #[test]
    fn test_standard_normal_is_seeded() {
        let device = test_device();
        let a = standard_normal::<TestBackend, _>([2, 5], &mut StdRng::seed_from_u64(3), &device);
        let b = standard_normal::<TestBackend, _>([2, 5], &mut StdRng::seed_from_u64(3), &device);
        let c = standard_normal::<TestBackend, _>([2, 5], &mut StdRng::seed_from_u64(4), &device);
        assert_eq!(to_vec(a.clone()), to_vec(b));
        assert_ne!(to_vec(a), to_vec(c));
    }

    #[test]
    fn test_encoder_output_shapes() {
        let device = test_device();
        let config = VaeConfig::new([12, 10, 1], vec![4, 8], vec![3, 3], vec![1, 2], 3);
        let encoder = Encoder::<TestBackend>::new(&config, &device);
        assert_eq!(encoder.num_blocks(), 2);

        let images = Tensor::<TestBackend, 4>::ones([5, 12, 10, 1], &device);
        let features = encoder.features(images.clone());
        assert_eq!(features.dims(), [5, 8, 6, 5]);

        let out = encoder.forward(images, &mut StdRng::seed_from_u64(0));
        assert_eq!(out.z.dims(), [5, 3]);
        assert_eq!(out.mu.dims(), [5, 3]);
        assert_eq!(out.log_sigma2.dims(), [5, 3]);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let device = test_device();
        let config = VaeConfig::new([8, 8, 1], vec![4], vec![3], vec![2], 2);
        let encoder = Encoder::<TestBackend>::new(&config, &device);
        let images = Tensor::<TestBackend, 4>::ones([2, 8, 8, 1], &device);

        let (mu_a, ls_a) = encoder.encode(images.clone());
        let (mu_b, ls_b) = encoder.encode(images);
        assert_eq!(to_vec(mu_a), to_vec(mu_b));
        assert_eq!(to_vec(ls_a), to_vec(ls_b));
    }
}
