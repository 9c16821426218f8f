use crate::model::{UtilizationClass, UtilizationVector};

/// pi / 4 / 10^4: converts diameter-squared in cm^2 times stems/ha into
/// basal area in m^2/ha.
pub const PI_40K: f32 = std::f32::consts::PI / 40_000.0;

/// Stem density from basal area (m^2/ha) and quadratic mean diameter (cm).
pub fn trees_per_hectare(basal_area: f32, quad_mean_diameter: f32) -> f32 {
    if quad_mean_diameter == 0.0 || quad_mean_diameter.is_nan() || basal_area.is_nan() {
        0.0
    } else {
        basal_area / PI_40K / (quad_mean_diameter * quad_mean_diameter)
    }
}

/// Basal area from quadratic mean diameter (cm) and stem density (/ha).
pub fn basal_area(quad_mean_diameter: f32, trees_per_hectare: f32) -> f32 {
    if quad_mean_diameter.is_nan() || trees_per_hectare.is_nan() {
        0.0
    } else {
        quad_mean_diameter * quad_mean_diameter * PI_40K * trees_per_hectare
    }
}

/// Quadratic mean diameter from basal area and stem density; 0 for
/// degenerate or absurd inputs.
pub fn quad_mean_diameter(basal_area: f32, trees_per_hectare: f32) -> f32 {
    if basal_area > 1.0e6
        || basal_area == 0.0
        || basal_area.is_nan()
        || trees_per_hectare > 1.0e6
        || trees_per_hectare == 0.0
        || trees_per_hectare.is_nan()
    {
        0.0
    } else {
        (basal_area / trees_per_hectare / PI_40K).sqrt()
    }
}

/// Make the three utilization vectors mutually consistent: stem density of
/// each size band is recomputed from that band's basal area and diameter, the
/// band densities are rolled up into the All slot, and the All-class diameter
/// is re-derived from the totals.
pub fn reconcile_components(
    basal_areas: &UtilizationVector,
    densities: &mut UtilizationVector,
    diameters: &mut UtilizationVector,
) {
    for uc in UtilizationClass::UTIL_CLASSES {
        densities.set(uc, trees_per_hectare(basal_areas.get(uc), diameters.get(uc)));
    }
    densities.set_all(densities.band_sum());
    diameters.set_all(quad_mean_diameter(basal_areas.all(), densities.all()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use proptest::prelude::*;

    #[test]
    fn test_identity_round_trip() {
        let tph = trees_per_hectare(30.0, 20.0);
        assert_approx_eq!(basal_area(20.0, tph), 30.0, 1e-4);
        assert_approx_eq!(quad_mean_diameter(30.0, tph), 20.0, 1e-4);
    }

    #[test]
    fn test_degenerate_inputs_give_zero() {
        assert_eq!(trees_per_hectare(30.0, 0.0), 0.0);
        assert_eq!(trees_per_hectare(f32::NAN, 20.0), 0.0);
        assert_eq!(quad_mean_diameter(0.0, 500.0), 0.0);
        assert_eq!(quad_mean_diameter(30.0, f32::NAN), 0.0);
        assert_eq!(quad_mean_diameter(2.0e6, 500.0), 0.0);
        assert_eq!(basal_area(f32::NAN, 500.0), 0.0);
    }

    #[test]
    fn test_reconcile_band_sums() {
        let ba = UtilizationVector::from_values([0.0, 30.0, 6.0, 9.0, 9.0, 6.0]);
        let mut tph = UtilizationVector::new();
        let mut dq = UtilizationVector::from_values([0.0, 0.0, 10.0, 15.0, 20.0, 25.0]);
        reconcile_components(&ba, &mut tph, &mut dq);

        assert_approx_eq!(tph.all(), tph.band_sum(), 1e-3);
        for uc in UtilizationClass::UTIL_CLASSES {
            let back = basal_area(dq.get(uc), tph.get(uc));
            assert_approx_eq!(back, ba.get(uc), 1e-3);
        }
        // All-class diameter satisfies the identity against the totals.
        let back_all = basal_area(dq.all(), tph.all());
        assert_approx_eq!(back_all, ba.all(), 1e-3);
    }

    #[test]
    fn test_reconcile_zero_band() {
        let ba = UtilizationVector::from_values([0.0, 15.0, 0.0, 5.0, 5.0, 5.0]);
        let mut tph = UtilizationVector::new();
        let mut dq = UtilizationVector::from_values([0.0, 0.0, 10.0, 15.0, 20.0, 25.0]);
        reconcile_components(&ba, &mut tph, &mut dq);
        assert_eq!(tph.get(UtilizationClass::U75To125), 0.0);
    }

    proptest! {
        #[test]
        fn prop_identity_holds(ba in 0.1f32..200.0, dq in 7.5f32..80.0) {
            let tph = trees_per_hectare(ba, dq);
            let back = basal_area(dq, tph);
            prop_assert!((back - ba).abs() / ba < 1e-3);
        }

        #[test]
        fn prop_qmd_positive(ba in 0.1f32..200.0, tph in 1.0f32..10_000.0) {
            let dq = quad_mean_diameter(ba, tph);
            prop_assert!(dq > 0.0);
            let back = basal_area(dq, tph);
            prop_assert!((back - ba).abs() / ba < 1e-3);
        }
    }
}
