//! Backend selection and host-array conversion.
//!
//! CPU (`NdArray`) by default; the `wgpu` feature switches to the wgpu backend
//! for cross-platform GPU support (Vulkan, Metal, DX12). Training wraps the
//! chosen backend in burn's `Autodiff` decorator.

pub mod convert;

use burn::backend::Autodiff;
use burn::prelude::*;

/// Backend used for inference and as the inner backend during training.
#[cfg(feature = "wgpu")]
pub type InferenceBackend = burn::backend::Wgpu;

/// Backend used for inference and as the inner backend during training.
#[cfg(not(feature = "wgpu"))]
pub type InferenceBackend = burn::backend::NdArray<f32>;

/// Autodiff-enabled backend used for training.
pub type TrainingBackend = Autodiff<InferenceBackend>;

/// Initialize the default device (auto-detects the best GPU with `wgpu`).
pub fn init_device() -> <InferenceBackend as Backend>::Device {
    Default::default()
}
