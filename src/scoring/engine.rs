use crate::domain::transaction::{DecisionStatus, ReasonCode};
use crate::scoring::types::{Decision, DecisionPolicy};

pub fn clamp01(v: f64) -> f64 {
    if v.is_nan() || v < 0.0 {
        0.0
    } else if v > 1.0 {
        1.0
    } else {
        v
    }
}

/// Ties resolve to the stricter status.
pub fn classify(score: f64, policy: &DecisionPolicy) -> DecisionStatus {
    if score >= policy.decline_threshold {
        DecisionStatus::Declined
    } else if score >= policy.review_threshold {
        DecisionStatus::Review
    } else {
        DecisionStatus::Approved
    }
}

/// Combines the model score with the customer's recent volume.
///
/// A velocity hit adds `velocity_penalty` up to `velocity_score_cap`; it never
/// lowers a score that already sits above the cap.
pub fn decide(score: f64, recent_count: i64, policy: &DecisionPolicy) -> Decision {
    let score = clamp01(score);
    let (raw, reason) = if recent_count >= policy.velocity_threshold {
        let boosted = (score + policy.velocity_penalty).min(policy.velocity_score_cap);
        (boosted.max(score), ReasonCode::VelocityRule)
    } else {
        (score, ReasonCode::MlModel)
    };

    let final_score = clamp01(raw);
    Decision {
        final_score,
        status: classify(final_score, policy),
        reason,
    }
}
