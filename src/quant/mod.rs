/// Coarse (first-stage) quantizer.
pub mod coarse;
/// Product (second-stage, residual) quantizer.
pub mod product;

pub use coarse::CoarseQuantizer;
pub use product::ProductQuantizer;
