//! Candidate classes as delivered by the (external) class loader and verifier

mod class;
mod code;
mod constants;

pub use class::*;
pub use code::*;
pub use constants::*;
