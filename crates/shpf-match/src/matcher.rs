use serde::{Deserialize, Serialize};
use shpf_core::MatchDecision;
use thiserror::Error;

use crate::normalize::normalize;
use crate::similarity::SimilarityMetric;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("similarity threshold {0} is outside [0, 1]")]
    ThresholdOutOfRange(f64),
}

/// Minimum similarity a listing needs to count as the requested model.
///
/// Has no default value; every caller supplies one.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfigError::ThresholdOutOfRange(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Threshold {
    type Error = ConfigError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Threshold> for f64 {
    fn from(threshold: Threshold) -> Self {
        threshold.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NameMatcher {
    threshold: Threshold,
    metric: SimilarityMetric,
}

impl NameMatcher {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            metric: SimilarityMetric::default(),
        }
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn evaluate(&self, name: &str, target: &str) -> MatchDecision {
        let score = self.metric.score(&normalize(name), &normalize(target));
        MatchDecision {
            accepted: score >= self.threshold.value(),
            score,
        }
    }

    pub fn matches(&self, name: &str, target: &str) -> bool {
        self.evaluate(name, target).accepted
    }
}

/// Normalizes both names and accepts when their similarity reaches
/// `threshold`. An out-of-range threshold never matches.
pub fn normalize_and_match(name: &str, target: &str, threshold: f64) -> bool {
    match Threshold::new(threshold) {
        Ok(threshold) => NameMatcher::new(threshold).matches(name, target),
        Err(err) => {
            tracing::warn!(%err, "rejecting match with invalid threshold");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_validated() {
        assert!(Threshold::new(0.0).is_ok());
        assert!(Threshold::new(1.0).is_ok());
        assert_eq!(
            Threshold::new(1.5),
            Err(ConfigError::ThresholdOutOfRange(1.5))
        );
        assert!(Threshold::new(-0.1).is_err());
        assert!(Threshold::new(f64::NAN).is_err());
    }

    #[test]
    fn matches_after_normalizing_both_sides() {
        assert!(normalize_and_match("IPHONE 12, 64GB!", "iphone 12 64gb", 1.0));
        assert!(normalize_and_match("iPhone 12 64GB Negro B", "iPhone 12 64GB", 0.7));
        assert!(!normalize_and_match("Galaxy S21", "iPhone 12 64GB", 0.6));
    }

    #[test]
    fn acceptance_is_monotonic_in_threshold() {
        let pairs = [
            ("iPhone 12 64GB Negro B", "iPhone 12"),
            ("Samsung Galaxy S21 Ultra", "Galaxy S21"),
            ("Pixel 7", "iPhone 12"),
        ];
        let steps: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();
        for (name, target) in pairs {
            for (idx, &high) in steps.iter().enumerate() {
                if normalize_and_match(name, target, high) {
                    for &low in &steps[..idx] {
                        assert!(normalize_and_match(name, target, low), "{name} / {target} at {low}");
                    }
                }
            }
        }
    }

    #[test]
    fn decision_carries_the_score() {
        let matcher = NameMatcher::new(Threshold::new(0.7).unwrap());
        let decision = matcher.evaluate("abc", "abc");
        assert!(decision.accepted);
        assert_eq!(decision.score, 1.0);
        assert!(!matcher.evaluate("abc", "xyz").accepted);
    }

    #[test]
    fn invalid_threshold_never_matches() {
        assert!(!normalize_and_match("abc", "abc", 2.0));
    }

    #[test]
    fn threshold_deserializes_with_validation() {
        #[derive(Deserialize)]
        struct Wrapper {
            threshold: Threshold,
        }
        let ok: Wrapper = serde_json::from_str(r#"{"threshold": 0.6}"#).unwrap();
        assert_eq!(ok.threshold.value(), 0.6);
        assert!(serde_json::from_str::<Wrapper>(r#"{"threshold": 3}"#).is_err());
    }
}
