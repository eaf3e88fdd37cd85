/// Core types shared by the coordinator, the isolate contract and config
use crate::protocol::ProtocolError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Time and strike limits supplied by whoever hosts the bot.
///
/// No defaults are enforced here: every field must be provided.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLimits {
    /// Deadline for the instantiate acknowledgement after init succeeds
    #[serde(rename = "setup_time_limit_ms", with = "duration_ms")]
    pub setup_time_limit: Duration,
    /// Ticks slower than this earn a strike
    #[serde(rename = "tick_warn_time_limit_ms", with = "duration_ms")]
    pub tick_warn_time_limit: Duration,
    /// Ticks without a response after this are killed
    #[serde(rename = "tick_kill_time_limit_ms", with = "duration_ms")]
    pub tick_kill_time_limit: Duration,
    /// Pacing floor; no tick resolves sooner than this after it started
    #[serde(rename = "minimum_tick_time_ms", with = "duration_ms")]
    pub minimum_tick_time: Duration,
    /// Strikes that force shutdown
    pub max_strikes: u32,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Lifecycle state of one bot module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleStatus {
    Uninitialized,
    /// Guest rejected at load or instantiate (terminal)
    Invalid,
    Ready,
    /// Terminated by the coordinator or disposed (terminal)
    Shutdown,
}

impl ModuleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ModuleStatus::Invalid | ModuleStatus::Shutdown)
    }
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModuleStatus::Uninitialized => "uninitialized",
            ModuleStatus::Invalid => "invalid",
            ModuleStatus::Ready => "ready",
            ModuleStatus::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// State record of one bot module, owned by its coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotModule {
    pub status: ModuleStatus,
    pub in_tick: bool,
    pub strike_count: u32,
    /// Duration of the last completed tick, rounded up to whole milliseconds
    pub last_tick_duration_ms: u32,
}

impl Default for BotModule {
    fn default() -> Self {
        Self {
            status: ModuleStatus::Uninitialized,
            in_tick: false,
            strike_count: 0,
            last_tick_duration_ms: 0,
        }
    }
}

/// Custom error types for botbox
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Module failed to initialize: {0}")]
    InitFailure(String),

    #[error("Module timed out on setup (limit: {limit_ms}ms)")]
    SetupTimeout { limit_ms: u64 },

    #[error("Module timed out on tick (limit: {limit_ms}ms)")]
    TickTimeout { limit_ms: u64 },

    #[error("Module reported an error during tick: {0}")]
    TickRuntimeError(String),

    #[error("Rejected attempt to call overlapping tick function")]
    ConcurrentTickRejected,

    #[error("Module is shut down")]
    ModuleShutdown,

    #[error("Module is not ready (status: {0})")]
    NotReady(ModuleStatus),

    #[error("Coordinator is no longer running")]
    Disconnected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Result type alias for botbox operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_use_milliseconds_in_json() {
        let json = r#"{
            "setup_time_limit_ms": 2000,
            "tick_warn_time_limit_ms": 50,
            "tick_kill_time_limit_ms": 500,
            "minimum_tick_time_ms": 5,
            "max_strikes": 3
        }"#;
        let limits: TimeLimits = serde_json::from_str(json).unwrap();
        assert_eq!(limits.setup_time_limit, Duration::from_secs(2));
        assert_eq!(limits.tick_warn_time_limit, Duration::from_millis(50));
        assert_eq!(limits.max_strikes, 3);

        let back = serde_json::to_value(&limits).unwrap();
        assert_eq!(back["tick_kill_time_limit_ms"], 500);
    }

    #[test]
    fn test_missing_limit_is_rejected() {
        let json = r#"{ "setup_time_limit_ms": 2000, "max_strikes": 3 }"#;
        assert!(serde_json::from_str::<TimeLimits>(json).is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(ModuleStatus::Invalid.is_terminal());
        assert!(ModuleStatus::Shutdown.is_terminal());
        assert!(!ModuleStatus::Ready.is_terminal());
        assert!(!ModuleStatus::Uninitialized.is_terminal());
    }
}
