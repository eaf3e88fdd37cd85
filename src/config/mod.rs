//! Configuration
//!
//! Limit types, validation, and JSON loading.

pub mod loader;
pub mod types;
pub mod validator;
