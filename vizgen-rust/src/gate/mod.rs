//! Checks a generated figure script must pass: [`SafetyGate`] before it
//! runs and [`QualityGate`] on what it produced.

mod quality;
mod safety;

pub use quality::QualityGate;
pub use safety::SafetyGate;
