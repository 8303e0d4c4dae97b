//! Dataset loading and image output.
//!
//! ## Submodules
//!
//! - [`mnist`] — IDX (`ubyte`) image files
//! - [`image`] — PGM/PPM writers and batch tiling

pub mod image;
pub mod mnist;

pub use image::{save_image, tile};
pub use mnist::{load_idx_images, take_images};
