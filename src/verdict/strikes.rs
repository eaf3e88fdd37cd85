/// Tick timing verdicts
/// Pure decision over one completed tick: elapsed time, configured limits,
/// and the strikes already on record. No timers, no isolate access.
use crate::config::types::TimeLimits;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the coordinator must do with a tick that produced a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickVerdict {
    /// Within the warn limit
    Ok,
    /// Slow; one more strike recorded, module stays up
    Warn { strikes: u32 },
    /// Module must be terminated
    Kill { strikes: u32, cause: KillCause },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillCause {
    /// Strike threshold reached
    StrikesExhausted,
    /// Response arrived after the kill limit had already passed
    DeadlineExceeded,
}

impl TickVerdict {
    /// Strike count after applying this verdict.
    pub fn strikes(&self, prior_strikes: u32) -> u32 {
        match *self {
            TickVerdict::Ok => prior_strikes,
            TickVerdict::Warn { strikes } | TickVerdict::Kill { strikes, .. } => strikes,
        }
    }

    pub fn is_kill(&self) -> bool {
        matches!(self, TickVerdict::Kill { .. })
    }
}

/// Strike classifier - pure function over tick timing
pub struct StrikePolicy;

impl StrikePolicy {
    pub fn classify(elapsed: Duration, limits: &TimeLimits, prior_strikes: u32) -> TickVerdict {
        if elapsed > limits.tick_kill_time_limit {
            return TickVerdict::Kill {
                strikes: prior_strikes,
                cause: KillCause::DeadlineExceeded,
            };
        }

        if elapsed <= limits.tick_warn_time_limit {
            return TickVerdict::Ok;
        }

        let strikes = prior_strikes.saturating_add(1);
        if strikes >= limits.max_strikes {
            TickVerdict::Kill {
                strikes,
                cause: KillCause::StrikesExhausted,
            }
        } else {
            TickVerdict::Warn { strikes }
        }
    }
}
