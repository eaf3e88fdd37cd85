//! Tick verdicts
//!
//! Strike and deadline decisions as pure functions over tick timing.

pub mod strikes;
