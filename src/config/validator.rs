// Time limit validation
// Coordinators refuse to start with limits that can never be satisfied;
// suspicious but workable combinations only produce warnings.

use crate::config::types::{CoordinatorError, Result, TimeLimits};

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Check limits without failing; callers decide what to do with the report.
pub fn check_limits(limits: &TimeLimits) -> ValidationResult {
    let mut result = ValidationResult::new();

    if limits.setup_time_limit.is_zero() {
        result.add_error("setup_time_limit cannot be zero".to_string());
    }

    if limits.tick_kill_time_limit.is_zero() {
        result.add_error("tick_kill_time_limit cannot be zero".to_string());
    }

    if limits.max_strikes == 0 {
        result.add_error("max_strikes cannot be zero".to_string());
    }

    // A warn limit at or past the kill limit would never award a strike
    if limits.tick_warn_time_limit >= limits.tick_kill_time_limit {
        result.add_error(format!(
            "tick_warn_time_limit ({:?}) must be < tick_kill_time_limit ({:?})",
            limits.tick_warn_time_limit, limits.tick_kill_time_limit
        ));
    }

    if limits.minimum_tick_time >= limits.tick_kill_time_limit {
        result.add_warning(format!(
            "minimum_tick_time ({:?}) is not below tick_kill_time_limit ({:?}); every tick will be paced past the kill window",
            limits.minimum_tick_time, limits.tick_kill_time_limit
        ));
    }

    result
}

/// Validate limits, failing fast with every error found.
pub fn validate_limits(limits: &TimeLimits) -> Result<ValidationResult> {
    let result = check_limits(limits);
    if !result.is_valid() {
        return Err(CoordinatorError::Config(format!(
            "Time limit validation failed:\n{}",
            result.errors.join("\n")
        )));
    }
    for warning in &result.warnings {
        log::warn!("Configuration warning: {}", warning);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limits() -> TimeLimits {
        TimeLimits {
            setup_time_limit: Duration::from_millis(2000),
            tick_warn_time_limit: Duration::from_millis(50),
            tick_kill_time_limit: Duration::from_millis(500),
            minimum_tick_time: Duration::from_millis(5),
            max_strikes: 3,
        }
    }

    #[test]
    fn test_valid_limits() {
        let result = validate_limits(&limits()).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_warn_must_be_below_kill() {
        let mut l = limits();
        l.tick_warn_time_limit = l.tick_kill_time_limit;
        assert!(validate_limits(&l).is_err());
    }

    #[test]
    fn test_zero_strikes_rejected() {
        let mut l = limits();
        l.max_strikes = 0;
        let report = check_limits(&l);
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_zero_setup_rejected() {
        let mut l = limits();
        l.setup_time_limit = Duration::ZERO;
        assert!(matches!(
            validate_limits(&l),
            Err(CoordinatorError::Config(_))
        ));
    }

    #[test]
    fn test_slow_pacing_only_warns() {
        let mut l = limits();
        l.minimum_tick_time = Duration::from_millis(600);
        let result = validate_limits(&l).unwrap();
        assert_eq!(result.warnings.len(), 1);
    }
}
