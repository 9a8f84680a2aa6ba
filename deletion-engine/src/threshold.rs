//! Signed threshold evaluation.
//!
//! A non-negative threshold is a ceiling: values above it are violations.
//! A negative threshold is a floor: values below it are violations.

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------ //
//  Types                                                              //
// ------------------------------------------------------------------ //

/// Operator-selected sign applied to the unsigned threshold magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    pub fn as_str(self) -> &'static str {
        match self {
            Sign::Plus  => "+",
            Sign::Minus => "-",
        }
    }

    /// Parse the selector text. Only `+` and `-` are recognised.
    pub fn from_selector(s: &str) -> Option<Self> {
        match s.trim() {
            "+" => Some(Sign::Plus),
            "-" => Some(Sign::Minus),
            _   => None,
        }
    }
}

impl std::fmt::Display for Sign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A signed threshold together with its normalised text (`"-4000.00"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f64,
    pub text:  String,
}

impl Threshold {
    /// Build a threshold from an already-normalised magnitude (`\d+\.\d{2}`).
    ///
    /// Returns `None` only if the magnitude is not a parseable float.
    pub fn from_magnitude(magnitude: &str, sign: Sign) -> Option<Self> {
        let text = match sign {
            Sign::Plus  => magnitude.to_string(),
            Sign::Minus => format!("-{magnitude}"),
        };
        let value = text.parse::<f64>().ok()?;
        Some(Self { value, text })
    }

    /// Whether `current` crosses this threshold.
    pub fn is_exceeded_by(&self, current: f64) -> bool {
        exceeds(current, self.value)
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

// ------------------------------------------------------------------ //
//  Evaluation                                                         //
// ------------------------------------------------------------------ //

/// Decide whether `current` qualifies for deletion against a signed threshold.
pub fn exceeds(current: f64, threshold: f64) -> bool {
    if threshold >= 0.0 {
        current > threshold
    } else {
        current < threshold
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_threshold_is_a_ceiling() {
        assert!(exceeds(150.0, 100.00));
        assert!(!exceeds(50.0, 100.00));
    }

    #[test]
    fn negative_threshold_is_a_floor() {
        assert!(exceeds(-6000.0, -4000.00));
        assert!(!exceeds(-3990.0, -4000.00));
    }

    #[test]
    fn equal_value_never_exceeds() {
        assert!(!exceeds(100.0, 100.0));
        assert!(!exceeds(-4000.0, -4000.0));
    }

    #[test]
    fn zero_threshold_behaves_as_ceiling() {
        assert!(exceeds(0.01, 0.0));
        assert!(!exceeds(-500.0, 0.0));
    }

    #[test]
    fn negative_values_under_positive_ceiling_are_kept() {
        assert!(!exceeds(-1_000_000.0, 30000.0));
    }

    #[test]
    fn minus_sign_is_applied_to_magnitude() {
        let t = Threshold::from_magnitude("4000.00", Sign::Minus).unwrap();
        assert_eq!(t.text, "-4000.00");
        assert_eq!(t.value, -4000.0);
        assert!(t.is_exceeded_by(-6000.0));
    }

    #[test]
    fn plus_sign_keeps_magnitude() {
        let t = Threshold::from_magnitude("123.45", Sign::Plus).unwrap();
        assert_eq!(t.text, "123.45");
        assert!(t.is_exceeded_by(200.0));
        assert!(!t.is_exceeded_by(123.45));
    }

    #[test]
    fn sign_selector_parsing() {
        assert_eq!(Sign::from_selector("+"), Some(Sign::Plus));
        assert_eq!(Sign::from_selector(" - "), Some(Sign::Minus));
        assert_eq!(Sign::from_selector("±"), None);
        assert_eq!(Sign::from_selector(""), None);
    }
}
