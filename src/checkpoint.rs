//! Save/load for variational autoencoders.
//!
//! A saved model is a directory holding two files:
//!
//! - `params.json`: the [`VaeConfig`] the model was built from
//! - `weights.mpk`: every tensor of the module (parameters and batch-norm
//!   running statistics), in burn's named MessagePack format
//!
//! Loading rebuilds the architecture from `params.json`, then restores the
//! weights into it and refuses weights whose shapes do not fit.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use burn::module::{ModuleVisitor, ParamId};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use tracing::info;

use crate::backend::convert::tensor_values;
use crate::core::{Vae, VaeConfig, VaeError, VaeResult, VariationalAutoencoder};

/// Configuration file inside a model directory.
pub const PARAMS_FILE: &str = "params.json";
/// Weight file stem; the recorder adds the `.mpk` extension.
pub const WEIGHTS_STEM: &str = "weights";
pub const WEIGHTS_FILE: &str = "weights.mpk";

type WeightRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

#[derive(Default)]
struct ShapeCollector {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleVisitor<B> for ShapeCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.shapes.push(tensor.dims().to_vec());
    }
}

/// Reads every float tensor back; stops reading after the first failure.
#[derive(Default)]
struct ValueCollector {
    values: Vec<Vec<f32>>,
    error: Option<VaeError>,
}

impl<B: Backend> ModuleVisitor<B> for ValueCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        if self.error.is_some() {
            return;
        }
        match tensor_values(tensor.clone()) {
            Ok(values) => self.values.push(values),
            Err(e) => self.error = Some(e),
        }
    }
}

/// Shapes of every tensor in `model`, in a stable order.
pub fn parameter_shapes<B: Backend>(model: &Vae<B>) -> Vec<Vec<usize>> {
    let mut collector = ShapeCollector::default();
    model.visit(&mut collector);
    collector.shapes
}

/// Flattened values of every tensor in `model`, in the same order as
/// [`parameter_shapes`].
///
/// # Errors
/// - `ShapeMismatch` if a tensor cannot be read back as `f32`.
pub fn parameter_values<B: Backend>(model: &Vae<B>) -> VaeResult<Vec<Vec<f32>>> {
    let mut collector = ValueCollector::default();
    model.visit(&mut collector);
    match collector.error {
        Some(e) => Err(e),
        None => Ok(collector.values),
    }
}

impl<B: Backend> VariationalAutoencoder<B> {
    /// Write `params.json` and `weights.mpk` into `dir`, creating it if needed.
    ///
    /// # Errors
    /// - `Persistence` if the directory or either file cannot be written.
    pub fn save(&self, dir: impl AsRef<Path>) -> VaeResult<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            VaeError::Persistence(format!("Failed to create model directory {}: {e}", dir.display()))
        })?;

        let params_path = dir.join(PARAMS_FILE);
        self.config.save(&params_path).map_err(|e| {
            VaeError::Persistence(format!("Failed to write {}: {e}", params_path.display()))
        })?;

        WeightRecorder::new()
            .record(self.model.clone().into_record(), dir.join(WEIGHTS_STEM))
            .map_err(|e| VaeError::Persistence(format!("Failed to write weights: {e}")))?;

        info!(dir = %dir.display(), "Saved model");
        Ok(())
    }

    /// Rebuild a model from `params.json` in `dir`, then restore `weights.mpk`.
    ///
    /// # Errors
    /// - `Persistence` if a file is missing or unreadable, or a stored tensor's
    ///   shape disagrees with the rebuilt architecture.
    /// - `Configuration` if the stored configuration is invalid.
    pub fn load(dir: impl AsRef<Path>, device: &B::Device) -> VaeResult<Self> {
        let dir = dir.as_ref();
        let params_path = dir.join(PARAMS_FILE);
        let weights_path = dir.join(WEIGHTS_FILE);
        require_file(&params_path)?;
        require_file(&weights_path)?;

        let config = VaeConfig::load(&params_path).map_err(|e| {
            VaeError::Persistence(format!("Failed to parse {}: {e}", params_path.display()))
        })?;
        let mut vae = Self::build(config, device)?;

        let expected = parameter_shapes(&vae.model);
        let record = WeightRecorder::new()
            .load(dir.join(WEIGHTS_STEM), device)
            .map_err(|e| VaeError::Persistence(format!("Failed to read weights: {e}")))?;
        // Some mismatched records make burn panic rather than return an error.
        let fresh = vae.model.clone();
        let model = panic::catch_unwind(AssertUnwindSafe(move || fresh.load_record(record)))
            .map_err(|_| {
                VaeError::Persistence("stored weights do not fit the architecture".to_string())
            })?;

        let found = parameter_shapes(&model);
        check_shapes(&expected, &found)?;
        vae.model = model;

        info!(dir = %dir.display(), "Loaded model");
        Ok(vae)
    }
}

fn require_file(path: &Path) -> VaeResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(VaeError::Persistence(format!("{} not found", path.display())))
    }
}

fn check_shapes(expected: &[Vec<usize>], found: &[Vec<usize>]) -> VaeResult<()> {
    if expected.len() != found.len() {
        return Err(VaeError::Persistence(format!(
            "stored weights hold {} tensors, architecture needs {}",
            found.len(),
            expected.len()
        )));
    }
    for (i, (want, got)) in expected.iter().zip(found).enumerate() {
        if want != got {
            return Err(VaeError::Persistence(format!(
                "tensor {i} has shape {got:?}, architecture needs {want:?}"
            )));
        }
    }
    Ok(())
}
