//! Architecture tests: shape consistency between encoder and decoder, the
//! latent bottleneck, and the build-time summary.
//!
//! These tests verify:
//! - Decoder output restores the input's spatial shape for stride-divisible inputs
//! - `shape_before_latent` follows `ceil(size / stride)` per layer
//! - Construction fails on mismatched filter/kernel/stride sequences
//! - Sampling is reproducible for a fixed seed

use approx::assert_abs_diff_eq;
use burn::backend::NdArray;
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use vae::core::{reparameterize, standard_normal};
use vae::{LayerId, LayerRole, SpatialShape, VaeConfig, VaeError, VariationalAutoencoder};

type TestBackend = NdArray<f32>;

fn device() -> <TestBackend as Backend>::Device {
    Default::default()
}

fn values<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
    t.into_data().to_vec().expect("tensor to vec")
}

/// The MNIST scenario: (28, 28, 1), filters [32, 64], strides [1, 2].
#[test]
fn test_mnist_scenario_shapes() {
    let config = VaeConfig::new([28, 28, 1], vec![32, 64], vec![3, 3], vec![1, 2], 2);
    let vae = VariationalAutoencoder::<TestBackend>::build(config, &device()).expect("build");

    let before = vae.shape_before_latent();
    assert_eq!((before.height, before.width), (14, 14));
    assert_eq!(before.channels, 64);
    assert_eq!(vae.summary().output_shape(), &[28, 28, 1]);

    let x = Tensor::<TestBackend, 4>::zeros([3, 28, 28, 1], &device());
    let output = vae.forward(x, &mut StdRng::seed_from_u64(0));
    assert_eq!(output.reconstruction.dims(), [3, 28, 28, 1]);
    assert_eq!(output.latent.mu.dims(), [3, 2]);
    assert_eq!(output.latent.log_sigma2.dims(), [3, 2]);
}

#[test]
fn test_round_trip_shape_over_configs() {
    let configs = [
        VaeConfig::new([16, 16, 1], vec![8], vec![3], vec![2], 2),
        VaeConfig::new([16, 8, 1], vec![4, 8, 8], vec![3, 3, 3], vec![1, 2, 2], 3),
        VaeConfig::new([12, 12, 1], vec![4, 4], vec![5, 2], vec![3, 2], 4),
        VaeConfig::new([8, 8, 1], vec![4, 4, 4], vec![1, 1, 1], vec![1, 1, 1], 1),
    ];
    for config in configs {
        let [h, w, c] = config.input_shape;
        let vae = VariationalAutoencoder::<TestBackend>::build(config.clone(), &device())
            .expect("build");
        let x = Tensor::<TestBackend, 4>::ones([2, h, w, c], &device());
        let (reconstruction, _) = vae.reconstruct(x, &mut StdRng::seed_from_u64(1));
        assert_eq!(reconstruction.dims(), [2, h, w, c], "config {config}");
    }
}

#[test]
fn test_shape_before_latent_rounds_up() {
    // 7 -> ceil(7/2) = 4 -> ceil(4/2) = 2
    let config = VaeConfig::new([7, 9, 1], vec![4, 6], vec![3, 3], vec![2, 2], 2);
    assert_eq!(config.shape_before_latent(), SpatialShape::new(2, 3, 6));
}

#[test]
fn test_mismatched_sequences_fail_to_build() {
    let cases = [
        VaeConfig::new([8, 8, 1], vec![4, 8], vec![3], vec![1, 2], 2),
        VaeConfig::new([8, 8, 1], vec![4, 8], vec![3, 3], vec![1, 2, 2], 2),
        VaeConfig::new([8, 8, 1], vec![], vec![], vec![], 2),
    ];
    for config in cases {
        let err = VariationalAutoencoder::<TestBackend>::build(config, &device()).unwrap_err();
        assert!(matches!(err, VaeError::Configuration(_)), "got {err}");
    }
}

#[test]
fn test_decoder_output_in_unit_interval() {
    let config = VaeConfig::new([8, 8, 1], vec![4, 4], vec![3, 3], vec![2, 1], 2);
    let vae = VariationalAutoencoder::<TestBackend>::build(config, &device()).expect("build");
    let z = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0], [25.0, -25.0], [-4.0, 9.0]], &device());
    let generated = values(vae.sample(z));
    assert_eq!(generated.len(), 3 * 8 * 8);
    assert!(generated.iter().all(|&v| (0.0..=1.0).contains(&v)));
}

#[test]
fn test_color_input_reconstructs_single_channel() {
    let config = VaeConfig::new([8, 8, 3], vec![4], vec![3], vec![2], 2);
    let vae = VariationalAutoencoder::<TestBackend>::build(config, &device()).expect("build");
    let x = Tensor::<TestBackend, 4>::ones([1, 8, 8, 3], &device());
    let (reconstruction, _) = vae.reconstruct(x, &mut StdRng::seed_from_u64(0));
    assert_eq!(reconstruction.dims(), [1, 8, 8, 1]);
}

#[test]
fn test_same_seed_same_reconstruction() {
    let config = VaeConfig::new([8, 8, 1], vec![4], vec![3], vec![2], 2);
    let vae = VariationalAutoencoder::<TestBackend>::build(config, &device()).expect("build");
    let x = Tensor::<TestBackend, 4>::ones([2, 8, 8, 1], &device());

    let (a, za) = vae.reconstruct(x.clone(), &mut StdRng::seed_from_u64(5));
    let (b, zb) = vae.reconstruct(x.clone(), &mut StdRng::seed_from_u64(5));
    let (_, zc) = vae.reconstruct(x, &mut StdRng::seed_from_u64(6));
    assert_eq!(values(a), values(b));
    assert_eq!(values(za.clone()), values(zb));
    assert_ne!(values(za), values(zc));
}

#[test]
fn test_zero_log_variance_sampling_is_mu_plus_eps() {
    let mut rng = StdRng::seed_from_u64(21);
    let mu = Tensor::<TestBackend, 2>::from_floats([[0.5, -1.5, 2.0]], &device());
    let log_sigma2 = Tensor::<TestBackend, 2>::zeros([1, 3], &device());
    let eps = standard_normal::<TestBackend, _>([1, 3], &mut rng, &device());

    let z = values(reparameterize(mu.clone(), log_sigma2, eps.clone()));
    let expected: Vec<f32> = values(mu).iter().zip(values(eps)).map(|(m, e)| m + e).collect();
    for (got, want) in z.iter().zip(expected) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-6);
    }
}

#[test]
fn test_standard_normal_moments() {
    let mut rng = StdRng::seed_from_u64(3);
    let samples = values(standard_normal::<TestBackend, _>([200, 50], &mut rng, &device()));
    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;
    let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    assert_abs_diff_eq!(mean, 0.0, epsilon = 0.05);
    assert_abs_diff_eq!(var, 1.0, epsilon = 0.05);
}

#[test]
fn test_summary_names_every_layer() {
    let config = VaeConfig::new([28, 28, 1], vec![32, 64, 64, 64], vec![3; 4], vec![1, 2, 2, 1], 2);
    let summary = VariationalAutoencoder::<TestBackend>::build(config, &device())
        .expect("build")
        .summary()
        .clone();

    for l in 1..=4 {
        assert!(summary.layer(LayerId::new(LayerRole::EncoderBlock, l)).is_some());
    }
    for l in 1..=3 {
        assert!(summary.layer(LayerId::new(LayerRole::DecoderBlock, l)).is_some());
    }
    assert!(summary.layer(LayerId::new(LayerRole::DecoderBlock, 4)).is_none());
    assert_eq!(
        summary
            .layer(LayerId::single(LayerRole::DecoderReshape))
            .expect("reshape")
            .output_shape,
        vec![7, 7, 64]
    );
    assert!(summary.trainable_params() < summary.total_params());
}
