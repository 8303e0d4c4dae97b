//! Writing images for inspection.
//!
//! Images are channel-last arrays with values in `[0, 1]`. Single-channel
//! images are written as binary PGM (`P5`), three-channel images as binary
//! PPM (`P6`). Both formats open in most image viewers.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use ndarray::{Array3, ArrayView3, ArrayView4, Axis};

/// Map `[0, 1]` to a byte, clamping out-of-range values.
fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Write one `[height, width, channels]` image, nearest-neighbour upscaled by
/// `scale`. One channel gives a PGM, three a PPM.
///
/// # Errors
///
/// Returns `InvalidInput` for other channel counts or a zero scale, or any
/// I/O error from writing.
pub fn save_image(path: &Path, image: ArrayView3<'_, f32>, scale: usize) -> io::Result<()> {
    let (height, width, channels) = image.dim();
    let magic = match channels {
        1 => "P5",
        3 => "P6",
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot write a {channels}-channel image"),
            ))
        }
    };
    if scale == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "scale must be positive"));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let sw = width * scale;
    let sh = height * scale;
    let mut f = BufWriter::new(fs::File::create(path)?);
    write!(f, "{magic}\n{sw} {sh}\n255\n")?;
    for y in 0..sh {
        for x in 0..sw {
            for c in 0..channels {
                f.write_all(&[to_byte(image[[y / scale, x / scale, c]])])?;
            }
        }
    }
    f.flush()
}

/// Lay a batch `[n, height, width, channels]` out in a grid of `columns`
/// images, separated by one blank pixel.
#[must_use]
pub fn tile(images: ArrayView4<'_, f32>, columns: usize) -> Array3<f32> {
    let (n, height, width, channels) = images.dim();
    let columns = columns.clamp(1, n.max(1));
    let rows = n.div_ceil(columns);
    let mut grid = Array3::zeros((
        rows * (height + 1) - usize::from(rows > 0),
        columns * (width + 1) - 1,
        channels,
    ));
    for (i, image) in images.axis_iter(Axis(0)).enumerate() {
        let top = (i / columns) * (height + 1);
        let left = (i % columns) * (width + 1);
        grid.slice_mut(ndarray::s![top..top + height, left..left + width, ..])
            .assign(&image);
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    #[test]
    fn test_to_byte_clamps() {
        assert_eq!(to_byte(-0.5), 0);
        assert_eq!(to_byte(0.0), 0);
        assert_eq!(to_byte(1.0), 255);
        assert_eq!(to_byte(2.0), 255);
        assert_eq!(to_byte(0.5), 128);
    }

    #[test]
    fn test_save_pgm_header_and_scaling() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("digit.pgm");
        let image = Array3::from_shape_vec((1, 2, 1), vec![0.0, 1.0]).expect("shape");
        save_image(&path, image.view(), 2).expect("write");

        let bytes = fs::read(&path).expect("read");
        let header = b"P5\n4 2\n255\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(&bytes[header.len()..], &[0, 0, 255, 255, 0, 0, 255, 255]);
    }

    #[test]
    fn test_save_ppm_for_color() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("color.ppm");
        let image = Array3::from_elem((2, 2, 3), 1.0f32);
        save_image(&path, image.view(), 1).expect("write");
        let bytes = fs::read(&path).expect("read");
        assert!(bytes.starts_with(b"P6\n2 2\n255\n"));
        assert_eq!(bytes.len(), b"P6\n2 2\n255\n".len() + 12);
    }

    #[test]
    fn test_save_rejects_two_channels() {
        let dir = tempfile::tempdir().expect("temp dir");
        let image = Array3::<f32>::zeros((2, 2, 2));
        let err = save_image(&dir.path().join("x.pgm"), image.view(), 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_tile_layout() {
        let images = Array4::from_elem((3, 2, 2, 1), 1.0f32);
        let grid = tile(images.view(), 2);
        // 2 rows of 2x2 images with a 1-pixel gap
        assert_eq!(grid.dim(), (5, 5, 1));
        assert_eq!(grid[[0, 0, 0]], 1.0);
        assert_eq!(grid[[2, 0, 0]], 0.0);
        assert_eq!(grid[[3, 4, 0]], 0.0);
        assert_eq!(grid[[3, 1, 0]], 1.0);
    }
}
