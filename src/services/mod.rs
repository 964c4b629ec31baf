//! Service layer separating I/O from the processing pipeline

pub mod io;

pub use io::ImageIOService;
