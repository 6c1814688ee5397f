pub mod detector;
pub mod frame;
pub mod indicators;
pub mod risk;

#[cfg(test)]
mod indicators_tests;

pub use detector::*;
pub use frame::*;
pub use indicators::*;
pub use risk::*;
