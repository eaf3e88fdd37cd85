//! Bot runtime core.
//!
//! Core owns the host/guest contract, the execution contexts that run a
//! guest, and the coordinator that drives one guest through its lifecycle.

pub mod coordinator;
pub mod isolate;
pub mod types;
