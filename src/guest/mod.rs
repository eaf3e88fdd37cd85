//! In-process guest programs.
//!
//! Built-in bots speak the same BSCI frames an external guest would, so
//! they exercise the full isolate path.

pub mod bots;

pub use bots::{BuiltinLoader, RandomBounce, WaitBot, BUILTIN_BOTS};
