//! Shape arithmetic for same-padded convolutions.
//!
//! Same padding fixes the output size from the stride alone:
//! ```text
//! conv:            out = ceil(in / stride)
//! conv transpose:  out = in * stride
//! ```
//! When the total padding is odd, the extra row/column goes after the data
//! (bottom/right), and the transposed convolution crops symmetrically to it.

use std::fmt;

/// Channel-last spatial shape of a single sample: `[height, width, channels]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl SpatialShape {
    #[must_use]
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Number of scalars in one sample.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.height * self.width * self.channels
    }

    #[must_use]
    pub fn to_array(self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    /// Shape after a same-padded convolution with `filters` output channels.
    #[must_use]
    pub fn after_conv(self, filters: usize, stride: usize) -> Self {
        Self {
            height: conv_output_size(self.height, stride),
            width: conv_output_size(self.width, stride),
            channels: filters,
        }
    }

    /// Shape after a same-padded transposed convolution with `filters` output channels.
    #[must_use]
    pub fn after_conv_transpose(self, filters: usize, stride: usize) -> Self {
        Self {
            height: conv_transpose_output_size(self.height, stride),
            width: conv_transpose_output_size(self.width, stride),
            channels: filters,
        }
    }
}

impl From<[usize; 3]> for SpatialShape {
    fn from(shape: [usize; 3]) -> Self {
        Self::new(shape[0], shape[1], shape[2])
    }
}

impl fmt::Display for SpatialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}

/// Output size of a same-padded convolution: `ceil(size / stride)`.
#[inline]
#[must_use]
pub fn conv_output_size(size: usize, stride: usize) -> usize {
    size.div_ceil(stride)
}

/// Output size of a same-padded transposed convolution: `size * stride`.
#[inline]
#[must_use]
pub fn conv_transpose_output_size(size: usize, stride: usize) -> usize {
    size * stride
}

/// Padding `(before, after)` that makes a convolution "same" along one axis.
///
/// `total = max((out - 1) * stride + kernel - size, 0)`, `before = total / 2`.
#[must_use]
pub fn same_padding(size: usize, kernel: usize, stride: usize) -> (usize, usize) {
    let out = conv_output_size(size, stride);
    let total = ((out.saturating_sub(1)) * stride + kernel).saturating_sub(size);
    let before = total / 2;
    (before, total - before)
}

/// Cropping for a same-padded transposed convolution along one axis.
///
/// Returns `(crop_before, padding_out)`. A valid transposed convolution
/// produces `(size - 1) * stride + kernel` elements; when the kernel is at
/// least the stride the excess `kernel - stride` is cropped (`before = excess / 2`),
/// otherwise `stride - kernel` trailing elements are appended.
#[must_use]
pub fn same_transpose_crop(kernel: usize, stride: usize) -> (usize, usize) {
    if kernel >= stride {
        ((kernel - stride) / 2, 0)
    } else {
        (0, stride - kernel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv_output_size_rounds_up() {
        assert_eq!(conv_output_size(28, 1), 28);
        assert_eq!(conv_output_size(28, 2), 14);
        assert_eq!(conv_output_size(7, 2), 4);
        assert_eq!(conv_output_size(1, 3), 1);
    }

    #[test]
    fn test_same_padding_stride_one() {
        assert_eq!(same_padding(28, 3, 1), (1, 1));
        assert_eq!(same_padding(28, 5, 1), (2, 2));
        assert_eq!(same_padding(28, 1, 1), (0, 0));
        // Even kernels put the extra element after the data.
        assert_eq!(same_padding(28, 4, 1), (1, 2));
    }

    #[test]
    fn test_same_padding_strided() {
        // out = 14, total = 13 * 2 + 3 - 28 = 1
        assert_eq!(same_padding(28, 3, 2), (0, 1));
        // out = 4, total = 3 * 2 + 3 - 7 = 2
        assert_eq!(same_padding(7, 3, 2), (1, 1));
        // Kernel smaller than stride never needs padding.
        assert_eq!(same_padding(8, 1, 2), (0, 0));
    }

    #[test]
    fn test_padded_conv_yields_same_size() {
        for size in 1..40 {
            for kernel in 1..6 {
                for stride in 1..4 {
                    let (before, after) = same_padding(size, kernel, stride);
                    let padded = size + before + after;
                    let out = (padded - kernel) / stride + 1;
                    assert_eq!(out, conv_output_size(size, stride), "size={size} k={kernel} s={stride}");
                }
            }
        }
    }

    #[test]
    fn test_transpose_crop_yields_upsampled_size() {
        for size in 1..20 {
            for kernel in 1..6 {
                for stride in 1..4 {
                    let (crop, padding_out) = same_transpose_crop(kernel, stride);
                    let full = (size - 1) * stride + kernel + padding_out;
                    let out = conv_transpose_output_size(size, stride);
                    assert!(crop + out <= full, "size={size} k={kernel} s={stride}");
                }
            }
        }
    }

    #[test]
    fn test_spatial_shape_tracking() {
        let input = SpatialShape::from([28, 28, 1]);
        let after_first = input.after_conv(32, 1);
        let after_second = after_first.after_conv(64, 2);
        assert_eq!(after_first, SpatialShape::new(28, 28, 32));
        assert_eq!(after_second, SpatialShape::new(14, 14, 64));
        assert_eq!(after_second.numel(), 14 * 14 * 64);

        let back = after_second.after_conv_transpose(64, 2);
        assert_eq!(back.to_array(), [28, 28, 64]);
        assert_eq!(back.to_string(), "(28, 28, 64)");
    }
}
