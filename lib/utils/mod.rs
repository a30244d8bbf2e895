//! Small free functions shared across modules: range-bound conversion and streaming digest
//! computation.

mod conversion;
mod digest;

pub use conversion::*;
pub use digest::*;
