//! botbox: host-side runtime for untrusted game bots
//! Drives isolated guest programs turn by turn over a compact binary protocol,
//! with setup and tick deadlines and a strike policy for slow guests
//!
//! # Architecture
//!
//! ## Wire Protocol ([`protocol`])
//! - [`protocol::codec`]: Cursor-based scalar, string, list and enum codec
//! - [`protocol::enums`]: Closed ordinal enums and the `Point` struct
//! - [`protocol::messages`]: Tagged message catalog
//! - [`protocol::framing`]: BSCI batch framing (`pack`/`unpack`)
//!
//! ## Runtime Core ([`core`])
//! - [`core::types`]: Host/guest request and response contract
//! - [`core::isolate`]: Execution context trait and the thread-backed isolate
//! - [`core::coordinator`]: Module lifecycle coordinator
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::strikes`]: Pure tick timing classification
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured lifecycle events
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Limits, module state and error taxonomy
//! - [`config::validator`]: Limit validation
//! - [`config::loader`]: JSON configuration loading
//!
//! ## Guests ([`guest`])
//! - [`guest::bots`]: Built-in bots and their loader
//!
//! ## Testing Infrastructure ([`testing`])
//! - [`testing::scripted`]: Scripted execution context with timed replies
//!
//! # Design Principles
//!
//! 1. **One event at a time** - The coordinator handles a single command,
//!    response or deadline per step; no locks around module state
//! 2. **Termination is the only cancellation** - Terminal failures kill the
//!    guest and discard anything it sends afterwards
//! 3. **Strict decoding** - Every decode failure is whole-operation; no partial
//!    results, no silent fallbacks for unknown enum values
//! 4. **Pure policy** - Strike decisions are testable without timers

// Wire Protocol
pub mod protocol;

// Runtime Core
pub mod core;

// Verdict
pub mod verdict;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Built-in guests
pub mod guest;

// Testing Infrastructure
pub mod testing;

// CLI entrypoint wiring for the botrun binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::loader::CoordinatorConfig;
pub use config::types::*;
pub use core::coordinator::{Coordinator, Readiness};
pub use core::isolate::{ExecutionContext, ThreadIsolate};
pub use protocol::Message;
