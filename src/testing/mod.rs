//! Testing infrastructure
//!
//! Deterministic stand-ins for the execution context.

pub mod scripted;

pub use scripted::{Reply, Script, ScriptProbe, ScriptedIsolate};
