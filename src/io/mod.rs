/// Exact on-disk layout for a trained+populated index.
pub mod format;
/// fvecs/ivecs readers and the format registry.
pub mod vecs;

pub use vecs::{FvecsReader, IvecsReader, ReaderRegistry, VectorReader};
