//! Change-Detection Engine and alert rendering.

pub mod engine;
pub mod report;

pub use engine::{ChangeDetector, ChangeState, CheckerConfig, Flow, SendMode};
