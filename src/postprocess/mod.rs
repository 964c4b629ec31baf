//! Post-processing stages applied to the segmentation output
//!
//! Both stages take an RGBA image and return a new one of the same size.

mod edges;
pub mod mask;
mod sharpen;

pub use edges::refine_edges;
pub use sharpen::sharpen;
