use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::model::Region;

/// Identifier of a site curve equation.
pub type CurveId = i32;

/// Failure modes of the site curve service, kept distinguishable because the
/// pipeline treats them differently: `NoAnswer` is a tolerated gap (log and
/// fall back), the other two abort the polygon.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SiteCurveError {
    #[error("no answer defined for the requested curve, conversion or range")]
    NoAnswer,

    #[error("curve error: {0}")]
    Curve(String),

    #[error("species error: {0}")]
    Species(String),
}

/// Narrow functional interface onto the site-index curve library.
///
/// Heights are metres, ages are breast-height ages in years unless noted.
pub trait SiteCurveEvaluator {
    /// Breast-height age at which a stand of the given site index reaches the
    /// given dominant height.
    fn age_from_height(
        &self,
        curve: CurveId,
        height: f32,
        site_index: f32,
        years_to_breast_height: f32,
    ) -> Result<f32, SiteCurveError>;

    /// Dominant height at the given breast-height age and site index.
    fn height_from_age(
        &self,
        curve: CurveId,
        age: f32,
        site_index: f32,
        years_to_breast_height: f32,
    ) -> Result<f32, SiteCurveError>;

    /// Years a seedling takes to reach breast height on a site of the given
    /// index.
    fn years_to_breast_height(
        &self,
        curve: CurveId,
        site_index: f32,
    ) -> Result<f32, SiteCurveError>;

    /// Convert a site index expressed against one curve into another curve's
    /// space. `NoAnswer` when no conversion is defined for the pair.
    fn convert_site_index(
        &self,
        from: CurveId,
        site_index: f32,
        to: CurveId,
    ) -> Result<f32, SiteCurveError>;

    /// Default curve for a genus in a region, used when the site-curve map has
    /// no entry.
    fn default_curve(&self, genus: &str, region: Region) -> Result<CurveId, SiteCurveError>;
}

/// Chapman-Richards parameters for one curve.
///
/// Height model: `H(a) = 1.3 + (SI - 1.3) * ((1 - exp(-k a)) / (1 - exp(-k * 50)))^p`
/// with SI referenced at breast-height age 50.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveParams {
    pub k: f32,
    pub p: f32,
    /// Years-to-breast-height intercept: `ytbh = a + b / SI`.
    pub ytbh_a: f32,
    pub ytbh_b: f32,
}

/// Reference implementation of [`SiteCurveEvaluator`] backed by a
/// Chapman-Richards curve family and a pairwise linear site-index conversion
/// table.
#[derive(Debug, Clone, Default)]
pub struct CurveBank {
    params: HashMap<CurveId, CurveParams>,
    /// `(from, to) -> (c0, c1)`: `si_to = c0 + c1 * si_from`.
    conversions: HashMap<(CurveId, CurveId), (f32, f32)>,
    species_defaults: HashMap<(String, Region), CurveId>,
}

const REFERENCE_AGE: f32 = 50.0;

impl CurveBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_curve(&mut self, curve: CurveId, params: CurveParams) {
        self.params.insert(curve, params);
    }

    pub fn insert_conversion(&mut self, from: CurveId, to: CurveId, c0: f32, c1: f32) {
        self.conversions.insert((from, to), (c0, c1));
    }

    pub fn insert_species_default(&mut self, genus: impl Into<String>, region: Region, curve: CurveId) {
        self.species_defaults.insert((genus.into(), region), curve);
    }

    fn params(&self, curve: CurveId) -> Result<CurveParams, SiteCurveError> {
        self.params
            .get(&curve)
            .copied()
            .ok_or_else(|| SiteCurveError::Curve(format!("unknown curve {curve}")))
    }
}

impl SiteCurveEvaluator for CurveBank {
    fn age_from_height(
        &self,
        curve: CurveId,
        height: f32,
        site_index: f32,
        _years_to_breast_height: f32,
    ) -> Result<f32, SiteCurveError> {
        let cp = self.params(curve)?;
        if site_index <= 1.3 {
            return Err(SiteCurveError::NoAnswer);
        }
        if height <= 1.3 {
            return Ok(0.0);
        }
        let scale = 1.0 - (-cp.k * REFERENCE_AGE).exp();
        let ratio = (height - 1.3) / (site_index - 1.3);
        let x = ratio.powf(1.0 / cp.p) * scale;
        if x >= 1.0 {
            // At or above the curve's asymptote; age is undefined.
            return Err(SiteCurveError::NoAnswer);
        }
        let age = -(1.0 - x).ln() / cp.k;
        debug!(curve, height, site_index, age, "inverted age from height");
        Ok(age)
    }

    fn height_from_age(
        &self,
        curve: CurveId,
        age: f32,
        site_index: f32,
        _years_to_breast_height: f32,
    ) -> Result<f32, SiteCurveError> {
        let cp = self.params(curve)?;
        if site_index <= 1.3 {
            return Err(SiteCurveError::NoAnswer);
        }
        if age < 0.0 {
            return Err(SiteCurveError::Curve(format!(
                "breast-height age {age} is negative"
            )));
        }
        let scale = 1.0 - (-cp.k * REFERENCE_AGE).exp();
        let grown = (1.0 - (-cp.k * age).exp()) / scale;
        Ok(1.3 + (site_index - 1.3) * grown.powf(cp.p))
    }

    fn years_to_breast_height(
        &self,
        curve: CurveId,
        site_index: f32,
    ) -> Result<f32, SiteCurveError> {
        let cp = self.params(curve)?;
        if site_index <= 1.3 {
            return Err(SiteCurveError::NoAnswer);
        }
        Ok(cp.ytbh_a + cp.ytbh_b / site_index)
    }

    fn convert_site_index(
        &self,
        from: CurveId,
        site_index: f32,
        to: CurveId,
    ) -> Result<f32, SiteCurveError> {
        if from == to {
            return Ok(site_index);
        }
        // Both curves must at least exist before a conversion is meaningful.
        self.params(from)?;
        self.params(to)?;
        match self.conversions.get(&(from, to)) {
            Some((c0, c1)) => Ok(c0 + c1 * site_index),
            None => Err(SiteCurveError::NoAnswer),
        }
    }

    fn default_curve(&self, genus: &str, region: Region) -> Result<CurveId, SiteCurveError> {
        self.species_defaults
            .get(&(genus.to_string(), region))
            .copied()
            .ok_or_else(|| SiteCurveError::Species(format!("no default curve for genus {genus} in {region}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn bank() -> CurveBank {
        let mut b = CurveBank::new();
        b.insert_curve(
            3,
            CurveParams {
                k: 0.025,
                p: 1.2,
                ytbh_a: 4.0,
                ytbh_b: 60.0,
            },
        );
        b.insert_curve(
            12,
            CurveParams {
                k: 0.030,
                p: 1.1,
                ytbh_a: 3.0,
                ytbh_b: 50.0,
            },
        );
        b.insert_conversion(3, 12, 1.0, 0.95);
        b.insert_conversion(12, 3, -1.0, 1.05);
        b.insert_species_default("F", Region::Interior, 3);
        b
    }

    #[test]
    fn test_height_at_reference_age_is_site_index() {
        let b = bank();
        let h = b.height_from_age(3, 50.0, 20.0, 8.0).unwrap();
        assert_approx_eq!(h, 20.0, 1e-4);
    }

    #[test]
    fn test_height_at_age_zero_is_breast_height() {
        let b = bank();
        let h = b.height_from_age(3, 0.0, 20.0, 8.0).unwrap();
        assert_approx_eq!(h, 1.3, 1e-5);
    }

    #[test]
    fn test_height_increases_with_age() {
        let b = bank();
        let h40 = b.height_from_age(3, 40.0, 20.0, 8.0).unwrap();
        let h41 = b.height_from_age(3, 41.0, 20.0, 8.0).unwrap();
        assert!(h41 > h40);
    }

    #[test]
    fn test_age_height_round_trip() {
        let b = bank();
        let h = b.height_from_age(3, 37.0, 20.0, 8.0).unwrap();
        let age = b.age_from_height(3, h, 20.0, 8.0).unwrap();
        assert_approx_eq!(age, 37.0, 1e-2);
    }

    #[test]
    fn test_age_above_asymptote_is_no_answer() {
        let b = bank();
        // Asymptote for SI 20 is well below 60 m.
        let err = b.age_from_height(3, 60.0, 20.0, 8.0).unwrap_err();
        assert_eq!(err, SiteCurveError::NoAnswer);
    }

    #[test]
    fn test_age_below_breast_height_is_zero() {
        let b = bank();
        assert_eq!(b.age_from_height(3, 1.0, 20.0, 8.0).unwrap(), 0.0);
    }

    #[test]
    fn test_unknown_curve_is_curve_error() {
        let b = bank();
        assert!(matches!(
            b.height_from_age(99, 50.0, 20.0, 8.0),
            Err(SiteCurveError::Curve(_))
        ));
    }

    #[test]
    fn test_years_to_breast_height_decreases_with_site_index() {
        let b = bank();
        let poor = b.years_to_breast_height(3, 10.0).unwrap();
        let rich = b.years_to_breast_height(3, 30.0).unwrap();
        assert!(rich < poor);
    }

    #[test]
    fn test_convert_site_index_identity() {
        let b = bank();
        assert_eq!(b.convert_site_index(3, 20.0, 3).unwrap(), 20.0);
    }

    #[test]
    fn test_convert_site_index_pairwise() {
        let b = bank();
        let si = b.convert_site_index(3, 20.0, 12).unwrap();
        assert_approx_eq!(si, 1.0 + 0.95 * 20.0, 1e-5);
    }

    #[test]
    fn test_convert_site_index_missing_pair_is_no_answer() {
        let mut b = bank();
        b.insert_curve(
            7,
            CurveParams {
                k: 0.02,
                p: 1.0,
                ytbh_a: 5.0,
                ytbh_b: 70.0,
            },
        );
        assert_eq!(
            b.convert_site_index(3, 20.0, 7).unwrap_err(),
            SiteCurveError::NoAnswer
        );
    }

    #[test]
    fn test_default_curve_lookup() {
        let b = bank();
        assert_eq!(b.default_curve("F", Region::Interior).unwrap(), 3);
        assert!(matches!(
            b.default_curve("F", Region::Coastal),
            Err(SiteCurveError::Species(_))
        ));
    }

    #[test]
    fn test_degenerate_site_index_is_no_answer() {
        let b = bank();
        assert_eq!(
            b.height_from_age(3, 50.0, 1.0, 8.0).unwrap_err(),
            SiteCurveError::NoAnswer
        );
        assert_eq!(
            b.years_to_breast_height(3, 1.2).unwrap_err(),
            SiteCurveError::NoAnswer
        );
    }
}
