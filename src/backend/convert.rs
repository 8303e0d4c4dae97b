//! Conversion helpers between ndarray arrays and burn tensors.

use burn::prelude::*;
use ndarray::{Array2, Array4, ArrayView4};

use crate::core::{VaeError, VaeResult};

/// Convert an ndarray view of shape `[n, h, w, c]` to a burn `Tensor<B, 4>`.
pub fn array4_to_tensor<B: Backend>(arr: ArrayView4<'_, f32>, device: &B::Device) -> Tensor<B, 4> {
    let (n, h, w, c) = arr.dim();
    // Logical (row-major) order whatever the memory layout.
    let data: Vec<f32> = arr.iter().copied().collect();
    Tensor::from_data(TensorData::new(data, [n, h, w, c]), device)
}

/// Convert a burn `Tensor<B, 4>` to an ndarray `Array4<f32>`.
///
/// # Errors
/// - `ShapeMismatch` if the tensor data cannot be read back as `f32`.
pub fn tensor_to_array4<B: Backend>(tensor: Tensor<B, 4>) -> VaeResult<Array4<f32>> {
    let [n, h, w, c] = tensor.dims();
    let data = tensor_values(tensor)?;
    Array4::from_shape_vec((n, h, w, c), data)
        .map_err(|e| VaeError::ShapeMismatch(format!("Failed to reshape to Array4: {e}")))
}

/// Convert a burn `Tensor<B, 2>` to an ndarray `Array2<f32>`.
///
/// # Errors
/// - `ShapeMismatch` if the tensor data cannot be read back as `f32`.
pub fn tensor_to_array2<B: Backend>(tensor: Tensor<B, 2>) -> VaeResult<Array2<f32>> {
    let [rows, cols] = tensor.dims();
    let data = tensor_values(tensor)?;
    Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| VaeError::ShapeMismatch(format!("Failed to reshape to Array2: {e}")))
}

/// Flat `f32` contents of any tensor, in row-major order.
///
/// # Errors
/// - `ShapeMismatch` if the element type cannot be converted to `f32`.
pub fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> VaeResult<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| VaeError::ShapeMismatch(format!("Failed to read tensor data: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_convert_round_trip_array4() {
        let device = Default::default();
        let arr = Array4::from_shape_fn((2, 3, 4, 1), |(n, h, w, _)| (n * 100 + h * 10 + w) as f32);
        let tensor: Tensor<TestBackend, 4> = array4_to_tensor(arr.view(), &device);
        assert_eq!(tensor.dims(), [2, 3, 4, 1]);

        let back = tensor_to_array4(tensor).expect("convert back");
        assert_eq!(arr, back);
    }

    #[test]
    fn test_convert_non_standard_layout() {
        let device = Default::default();
        let arr = Array4::from_shape_fn((2, 2, 3, 1), |(n, h, w, _)| (n * 6 + h * 3 + w) as f32);
        let mut permuted = arr.clone();
        permuted.swap_axes(1, 2);

        let tensor: Tensor<TestBackend, 4> = array4_to_tensor(permuted.view(), &device);
        let back = tensor_to_array4(tensor).expect("convert back");
        assert_eq!(back, permuted);
    }

    #[test]
    fn test_tensor_to_array2() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], &device);
        let back = tensor_to_array2(tensor).expect("convert back");
        assert_eq!(back, ndarray::arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
    }
}
