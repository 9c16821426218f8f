use crate::error::GrowthError;
use crate::model::{Bank, Region, UtilizationClass};
use crate::tables::ControlData;

/// Model-only estimate of a species' small (below 7.5 cm) component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmallComponentEstimate {
    pub probability: f32,
    pub conditional_basal_area: f32,
    /// `probability * conditional_basal_area`.
    pub basal_area: f32,
    pub quad_mean_diameter: f32,
    pub lorey_height: f32,
    /// Whole-stem volume per small tree.
    pub mean_volume: f32,
}

/// EMP080: probability that a species has a small component at all.
pub fn small_component_probability(
    tables: &ControlData,
    genus: &str,
    lorey_height: f32,
    region: Region,
    primary_years_at_breast_height: f32,
) -> Result<f32, GrowthError> {
    let coe = tables.small_probability_coe(genus)?;

    let a0 = coe.coe(1);
    let a1 = if region == Region::Coastal { coe.coe(2) } else { 0.0 };
    let a2 = coe.coe(3);
    let a3 = coe.coe(4);

    let logit = a0 + a1 + a2 * primary_years_at_breast_height + a3 * lorey_height;

    Ok(logit.exp() / (1.0 + logit.exp()))
}

/// EMP081: expected small-component basal area, conditional on one existing.
pub fn conditional_expected_basal_area(
    tables: &ControlData,
    genus: &str,
    basal_area: f32,
    lorey_height: f32,
    _region: Region,
) -> Result<f32, GrowthError> {
    let coe = tables.small_basal_area_coe(genus)?;

    let a0 = coe.coe(1);
    let a2 = coe.coe(3);
    let a3 = coe.coe(4);

    // The interior form of the equation is applied in both regions, matching
    // the behaviour of the originating system.
    let coast = 0.0f32;
    let a1 = coe.coe(2) * coast;

    let arg = (a0 + a1 + a2 * basal_area) * (a3 * lorey_height).exp();
    Ok(arg.max(0.0))
}

/// EMP082: quadratic mean diameter of the small component.
pub fn small_component_quad_mean_diameter(
    tables: &ControlData,
    genus: &str,
    lorey_height: f32,
) -> Result<f32, GrowthError> {
    let coe = tables.small_dq_coe(genus)?;
    let logit = coe.coe(1) + coe.coe(2) * lorey_height;
    Ok(4.0 + 3.5 * logit.exp() / (1.0 + logit.exp()))
}

/// EMP085: lorey height of the small component.
pub fn small_component_lorey_height(
    tables: &ControlData,
    genus: &str,
    lorey_height_all: f32,
    quad_mean_diameter_small: f32,
    quad_mean_diameter_all: f32,
) -> Result<f32, GrowthError> {
    let coe = tables.small_lorey_height_coe(genus)?;
    let a0 = coe.coe(1);
    let a1 = coe.coe(2);
    Ok(1.3
        + (lorey_height_all - 1.3)
            * (a0 * (quad_mean_diameter_small.powf(a1) - quad_mean_diameter_all.powf(a1))).exp())
}

/// EMP086: mean whole-stem volume of one small tree.
pub fn small_component_mean_volume(
    tables: &ControlData,
    genus: &str,
    quad_mean_diameter_small: f32,
    lorey_height_small: f32,
) -> Result<f32, GrowthError> {
    let coe = tables.small_ws_volume_coe(genus)?;
    let a0 = coe.coe(1);
    let a1 = coe.coe(2);
    let a2 = coe.coe(3);
    let a3 = coe.coe(4);
    Ok((a0
        + a1 * quad_mean_diameter_small.ln()
        + a2 * lorey_height_small.ln()
        + a3 * quad_mean_diameter_small)
        .exp())
}

/// Model-only small-component estimate for one species of the bank.
pub fn estimate_small_components(
    tables: &ControlData,
    bank: &Bank,
    species: usize,
    region: Region,
    primary_years_at_breast_height: f32,
) -> Result<SmallComponentEstimate, GrowthError> {
    let genus = &bank.genera[species];
    let lorey_height_all = bank.lorey_heights[species].all();
    let quad_mean_diameter_all = bank.quad_mean_diameters[species].all();
    let basal_area_all = bank.basal_areas[species].get(UtilizationClass::All);

    let probability = small_component_probability(
        tables,
        genus,
        lorey_height_all,
        region,
        primary_years_at_breast_height,
    )?;
    let conditional_basal_area =
        conditional_expected_basal_area(tables, genus, basal_area_all, lorey_height_all, region)?;
    let quad_mean_diameter = small_component_quad_mean_diameter(tables, genus, lorey_height_all)?;
    let lorey_height = small_component_lorey_height(
        tables,
        genus,
        lorey_height_all,
        quad_mean_diameter,
        quad_mean_diameter_all,
    )?;
    let mean_volume = small_component_mean_volume(tables, genus, quad_mean_diameter, lorey_height)?;

    Ok(SmallComponentEstimate {
        probability,
        conditional_basal_area,
        basal_area: probability * conditional_basal_area,
        quad_mean_diameter,
        lorey_height,
        mean_volume,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coefficients;
    use assert_approx_eq::assert_approx_eq;

    fn tables() -> ControlData {
        let mut t = ControlData::new();
        t.small_component_probability.insert(
            "F".to_string(),
            Coefficients::new(vec![2.0, -0.5, -0.01, -0.05], 1),
        );
        t.small_component_basal_area.insert(
            "F".to_string(),
            Coefficients::new(vec![0.3, 0.2, 0.01, -0.05], 1),
        );
        t.small_component_quad_mean_diameter
            .insert("F".to_string(), Coefficients::new(vec![-1.0, 0.05], 1));
        t.small_component_lorey_height
            .insert("F".to_string(), Coefficients::new(vec![0.04, 1.0], 1));
        t.small_component_whole_stem_volume.insert(
            "F".to_string(),
            Coefficients::new(vec![-9.0, 1.8, 1.0, 0.01], 1),
        );
        t
    }

    #[test]
    fn test_probability_is_a_probability() {
        let t = tables();
        let p =
            small_component_probability(&t, "F", 25.0, Region::Interior, 60.0).unwrap();
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_probability_coastal_term_applies_only_on_coast() {
        let t = tables();
        let interior =
            small_component_probability(&t, "F", 25.0, Region::Interior, 60.0).unwrap();
        let coastal =
            small_component_probability(&t, "F", 25.0, Region::Coastal, 60.0).unwrap();
        assert!(coastal < interior);
    }

    #[test]
    fn test_conditional_basal_area_non_negative() {
        let t = tables();
        // Large lorey height drives the exponential term toward zero.
        let ba = conditional_expected_basal_area(&t, "F", 30.0, 60.0, Region::Interior).unwrap();
        assert!(ba >= 0.0);
    }

    #[test]
    fn test_small_quad_mean_diameter_range() {
        let t = tables();
        let dq = small_component_quad_mean_diameter(&t, "F", 20.0).unwrap();
        // 4 + 3.5 * logistic is always inside (4.0, 7.5).
        assert!(dq > 4.0 && dq < 7.5, "dq = {dq}");
    }

    #[test]
    fn test_small_lorey_height_below_all_height() {
        let t = tables();
        let hl = small_component_lorey_height(&t, "F", 25.0, 5.5, 28.0).unwrap();
        assert!(hl > 1.3);
        assert!(hl < 25.0);
    }

    #[test]
    fn test_mean_volume_formula() {
        let t = tables();
        let v = small_component_mean_volume(&t, "F", 5.5, 7.0).unwrap();
        let expected =
            (-9.0f32 + 1.8 * 5.5f32.ln() + 1.0 * 7.0f32.ln() + 0.01 * 5.5).exp();
        assert_approx_eq!(v, expected, 1e-5);
    }

    #[test]
    fn test_missing_genus_is_missing_coefficient() {
        let t = tables();
        assert!(matches!(
            small_component_probability(&t, "ZZ", 25.0, Region::Interior, 60.0),
            Err(GrowthError::MissingCoefficient(_))
        ));
    }
}
