use thiserror::Error;

use crate::site::SiteCurveError;

/// Errors that can occur while processing a polygon.
///
/// `Processing` aborts the current polygon only; callers may continue with
/// other polygons. `StandValidation` is raised for malformed input data before
/// any growth work starts.
#[derive(Error, Debug)]
pub enum GrowthError {
    #[error("{message}")]
    Processing {
        message: String,
        /// Numeric reason code carried by a few fatal conditions (e.g. no
        /// height, age, or site data available for any species).
        reason: Option<i32>,
    },

    #[error("Stand validation error: {0}")]
    StandValidation(String),

    #[error("Missing coefficient: {0}")]
    MissingCoefficient(String),

    #[error("Logit argument {0} exceeds 88")]
    LogitOverflow(f32),

    #[error("Site curve error: {0}")]
    SiteCurve(#[from] SiteCurveError),
}

impl GrowthError {
    /// A processing error with no reason code.
    pub fn processing(message: impl Into<String>) -> Self {
        GrowthError::Processing {
            message: message.into(),
            reason: None,
        }
    }

    /// A processing error carrying a numeric reason code.
    pub fn with_reason(message: impl Into<String>, reason: i32) -> Self {
        GrowthError::Processing {
            message: message.into(),
            reason: Some(reason),
        }
    }

    /// The numeric reason code, if this is a processing error that has one.
    pub fn reason_code(&self) -> Option<i32> {
        match self {
            GrowthError::Processing { reason, .. } => *reason,
            _ => None,
        }
    }
}

/// Outcome of a derivation that may fall back to a substitute value.
///
/// Numeric fallbacks (a site-index conversion with no defined mapping, for
/// example) are not errors here; callers decide whether a defaulted value is
/// worth a warning.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    /// The value was computed or supplied directly.
    Found(T),
    /// A substitute value was used; the string says why.
    Defaulted(T, String),
}

impl<T> Resolved<T> {
    pub fn value(self) -> T {
        match self {
            Resolved::Found(v) | Resolved::Defaulted(v, _) => v,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Resolved::Defaulted(_, _))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_error_display() {
        let err = GrowthError::processing("dominant height out of range");
        assert_eq!(err.to_string(), "dominant height out of range");
        assert_eq!(err.reason_code(), None);
    }

    #[test]
    fn test_processing_error_reason_code() {
        let err = GrowthError::with_reason("Age data unavailable for ALL species", 5);
        assert_eq!(err.reason_code(), Some(5));
    }

    #[test]
    fn test_stand_validation_display() {
        let err = GrowthError::StandValidation("percentages sum to 97.2".to_string());
        assert!(err.to_string().contains("Stand validation error"));
        assert_eq!(err.reason_code(), None);
    }

    #[test]
    fn test_missing_coefficient_display() {
        let err = GrowthError::MissingCoefficient("UTIL_COMP_BA for (2, PL, IDF)".to_string());
        assert!(err.to_string().contains("Missing coefficient"));
    }

    #[test]
    fn test_site_curve_error_conversion() {
        let err: GrowthError = SiteCurveError::NoAnswer.into();
        assert!(matches!(err, GrowthError::SiteCurve(_)));
    }

    #[test]
    fn test_resolved_value() {
        assert_eq!(Resolved::Found(5.0f32).value(), 5.0);
        let d = Resolved::Defaulted(3.0f32, "no conversion defined".to_string());
        assert!(d.is_defaulted());
        assert_eq!(d.value(), 3.0);
    }
}
