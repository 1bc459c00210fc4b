use crate::domain::transaction::{DecisionStatus, ReasonCode};
use crate::error::ConfigError;

pub const DEFAULT_VELOCITY_THRESHOLD: i64 = 12;
pub const DEFAULT_VELOCITY_WINDOW_SECONDS: i64 = 60;
pub const DEFAULT_VELOCITY_PENALTY: f64 = 0.15;
pub const DEFAULT_VELOCITY_SCORE_CAP: f64 = 0.99;
pub const DEFAULT_DECLINE_THRESHOLD: f64 = 0.85;
pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.65;

/// Thresholds for the velocity rule and score classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    /// Same-customer transactions in the window that trigger the rule.
    pub velocity_threshold: i64,
    pub velocity_window_seconds: i64,
    pub velocity_penalty: f64,
    pub velocity_score_cap: f64,
    pub decline_threshold: f64,
    pub review_threshold: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            velocity_threshold: DEFAULT_VELOCITY_THRESHOLD,
            velocity_window_seconds: DEFAULT_VELOCITY_WINDOW_SECONDS,
            velocity_penalty: DEFAULT_VELOCITY_PENALTY,
            velocity_score_cap: DEFAULT_VELOCITY_SCORE_CAP,
            decline_threshold: DEFAULT_DECLINE_THRESHOLD,
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
        }
    }
}

impl DecisionPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = 0.0..=1.0;
        for (name, v) in [
            ("DECLINE_THRESHOLD", self.decline_threshold),
            ("REVIEW_THRESHOLD", self.review_threshold),
            ("VELOCITY_SCORE_CAP", self.velocity_score_cap),
        ] {
            if !unit.contains(&v) {
                return Err(ConfigError::Invalid(format!("{} must be within [0,1], got {}", name, v)));
            }
        }
        if self.review_threshold > self.decline_threshold {
            return Err(ConfigError::Invalid(format!(
                "REVIEW_THRESHOLD {} exceeds DECLINE_THRESHOLD {}",
                self.review_threshold, self.decline_threshold
            )));
        }
        if self.velocity_penalty < 0.0 || self.velocity_penalty.is_nan() {
            return Err(ConfigError::Invalid("VELOCITY_PENALTY must be non-negative".to_string()));
        }
        if self.velocity_threshold < 1 {
            return Err(ConfigError::Invalid("VELOCITY_THRESHOLD must be at least 1".to_string()));
        }
        if self.velocity_window_seconds < 1 {
            return Err(ConfigError::Invalid("VELOCITY_WINDOW_SECONDS must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub final_score: f64,
    pub status: DecisionStatus,
    pub reason: ReasonCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(DecisionPolicy::default().validate().is_ok());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let policy = DecisionPolicy {
            review_threshold: 0.9,
            decline_threshold: 0.8,
            ..DecisionPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
