/// Error types shared across the core.
pub mod err;
/// Vector, matrix, and PQ code types.
pub mod vector;

pub use err::{Error, ErrorKind, Result};
pub use vector::{Matrix, PqCode, Vector};
