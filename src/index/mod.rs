/// IVFADC engine: training, insertion, search, persistence.
pub mod engine;
/// Dense per-cell inverted-list storage.
pub mod inverted;

pub use engine::{CoarseParams, EngineState, IVFADCEngine, Neighbor, PqParams};
pub use inverted::InvertedIndex;
