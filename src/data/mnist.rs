//! MNIST-style IDX file loading.
//!
//! ## IDX image format
//!
//! ```text
//! [magic: u32 = 0x0000_0803] [count: u32] [rows: u32] [cols: u32] [pixels: count×rows×cols u8]
//! ```
//! All integers are big-endian. Pixels are row-major per image.

use std::fs;
use std::io;
use std::path::Path;

use ndarray::{s, Array4};

/// Magic number of an IDX file holding unsigned-byte 3D data (images).
pub const IDX_IMAGES_MAGIC: u32 = 0x0000_0803;

const IMAGES_HEADER_LEN: usize = 16;

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn read_u32(bytes: &[u8], offset: usize) -> io::Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| invalid(format!("IDX header truncated at byte {offset}")))
}

/// Decode IDX image bytes into `[n, rows, cols, 1]` with pixels scaled to `[0, 1]`.
///
/// # Errors
///
/// Returns `InvalidData` on a wrong magic number or a payload whose size
/// disagrees with the header.
pub fn parse_idx_images(bytes: &[u8]) -> io::Result<Array4<f32>> {
    let magic = read_u32(bytes, 0)?;
    if magic != IDX_IMAGES_MAGIC {
        return Err(invalid(format!(
            "IDX image magic {magic:#010x}, expected {IDX_IMAGES_MAGIC:#010x}"
        )));
    }
    let count = read_u32(bytes, 4)? as usize;
    let rows = read_u32(bytes, 8)? as usize;
    let cols = read_u32(bytes, 12)? as usize;

    let pixels = &bytes[IMAGES_HEADER_LEN..];
    let expected = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .ok_or_else(|| invalid(format!("IDX header size {count}×{rows}×{cols} overflows")))?;
    if pixels.len() != expected {
        return Err(invalid(format!(
            "IDX payload holds {} bytes, header announces {count}×{rows}×{cols} = {expected}",
            pixels.len()
        )));
    }

    let data: Vec<f32> = pixels.iter().map(|&p| f32::from(p) / 255.0).collect();
    Array4::from_shape_vec((count, rows, cols, 1), data).map_err(|e| invalid(e.to_string()))
}

/// Load an IDX image file such as `train-images-idx3-ubyte`.
///
/// # Errors
///
/// Returns `io::Error` if the file cannot be read or is malformed.
pub fn load_idx_images(path: &Path) -> io::Result<Array4<f32>> {
    parse_idx_images(&fs::read(path)?)
}

/// First `limit` images, or all of them when `limit` is `None` or too large.
#[must_use]
pub fn take_images(images: Array4<f32>, limit: Option<usize>) -> Array4<f32> {
    match limit {
        Some(n) if n < images.shape()[0] => images.slice(s![..n, .., .., ..]).to_owned(),
        _ => images,
    }
}
