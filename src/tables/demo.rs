//! A complete synthetic configuration: coefficient tables, site curves and a
//! sample polygon. Control-file parsing is an external concern; this module
//! stands in for it in tests and the demo binary. The coefficient values are
//! plausible for interior/coastal conifer stands but carry no provenance.

use crate::model::{BecZone, Coefficients, PolygonDescriptor, Region, SpeciesInput, UtilizationClass, UtilizationVector};
use crate::site::{CurveBank, CurveParams};
use crate::tables::{ControlData, NonPrimaryHeightCoefficients, SiteCurveAgeMaximum, UpperBounds};

const GENERA: [&str; 7] = ["F", "C", "H", "S", "PL", "PA", "B"];
const ZONES: [(&str, Region); 2] = [("IDF", Region::Interior), ("CWH", Region::Coastal)];

fn curve_id(genus: &str, region: Region) -> i32 {
    let base = match genus {
        "F" => 3,
        "C" => 5,
        "H" => 7,
        "S" => 9,
        "PL" | "PA" => 11,
        "B" => 13,
        _ => 15,
    };
    match region {
        Region::Interior => base,
        Region::Coastal => base + 1,
    }
}

fn volume_group_of(genus: &str) -> i32 {
    match genus {
        "F" => 1,
        "C" => 2,
        "H" => 3,
        "S" => 4,
        "PL" | "PA" => 5,
        _ => 6,
    }
}

fn equation_group_of(genus: &str) -> i32 {
    4 + volume_group_of(genus)
}

/// Synthetic coefficient tables covering the demo genera and zones.
pub fn demo_control_data() -> ControlData {
    let mut t = ControlData::new();

    for (zone, region) in ZONES {
        for genus in GENERA {
            let g = genus.to_string();
            let z = zone.to_string();
            let vg = volume_group_of(genus);

            t.site_curves.insert((g.clone(), region), curve_id(genus, region));
            t.default_equation_groups
                .insert((g.clone(), z.clone()), equation_group_of(genus));
            t.volume_equation_groups.insert((g.clone(), z.clone()), vg);
            t.decay_equation_groups.insert((g.clone(), z.clone()), vg);
            t.breakage_equation_groups.insert((g.clone(), z.clone()), vg);

            t.primary_height_coefficients.insert(
                (g.clone(), region),
                Coefficients::new(vec![1.08 + 0.01 * vg as f32, 0.2, -0.001], 1),
            );
            t.primary_height_initial_coefficients
                .insert((g.clone(), region), Coefficients::new(vec![0.9, 1.0], 1));

            t.by_species_dq.insert(
                g.clone(),
                Coefficients::new(vec![0.005 * vg as f32 - 0.02, 0.3, 0.0], 0),
            );
            t.component_size_limits.insert(
                (g.clone(), region),
                Coefficients::new(vec![45.0, 80.0, 0.2, 2.0], 1),
            );

            t.decay_modifiers.insert((g.clone(), region), 0.0);
            t.waste_modifiers.insert((g.clone(), region), 0.0);
            t.volume_net_decay_waste.insert(
                g.clone(),
                Coefficients::new(vec![-1.5, 1.0, -2.0, 0.2, 0.2, 0.1], 0),
            );

            t.small_component_probability.insert(
                g.clone(),
                Coefficients::new(vec![-1.0, -0.5, -0.01, -0.05], 1),
            );
            t.small_component_basal_area.insert(
                g.clone(),
                Coefficients::new(vec![0.3, 0.2, 0.01, -0.05], 1),
            );
            t.small_component_quad_mean_diameter
                .insert(g.clone(), Coefficients::new(vec![-1.0, 0.05], 1));
            t.small_component_lorey_height
                .insert(g.clone(), Coefficients::new(vec![0.08, 1.0], 1));
            t.small_component_whole_stem_volume.insert(
                g.clone(),
                Coefficients::new(vec![-9.0, 1.8, 1.0, 0.01], 1),
            );

            // Utilization-class decompositions.
            for (class, a0, a1) in [(1, -1.5, 0.9), (2, -0.5, 0.02), (3, -1.0, 0.02)] {
                t.util_comp_ba.insert(
                    (class, g.clone(), z.clone()),
                    Coefficients::new(vec![a0, a1], 1),
                );
            }
            t.util_comp_dq.insert(
                (1, g.clone(), z.clone()),
                Coefficients::new(vec![4.0, -0.3, 1.1], 1),
            );
            t.util_comp_dq.insert(
                (2, g.clone(), z.clone()),
                Coefficients::new(vec![-2.0, 0.3, 0.8], 1),
            );
            t.util_comp_dq.insert(
                (3, g.clone(), z.clone()),
                Coefficients::new(vec![-2.5, 0.3, 0.8], 1),
            );
            t.util_comp_dq.insert(
                (4, g.clone(), z.clone()),
                Coefficients::new(vec![8.0, -0.1, 1.5, 0.5], 1),
            );

            // Non-primary lorey height, for every possible primary pairing.
            for primary in GENERA {
                if primary == genus {
                    continue;
                }
                t.non_primary_height_coefficients.insert(
                    (g.clone(), primary.to_string(), region),
                    NonPrimaryHeightCoefficients {
                        equation_index: 1,
                        coe: Coefficients::new(vec![0.92, 1.0], 1),
                    },
                );
            }
        }
    }

    for vg in 1..=6 {
        t.total_stand_whole_stem_volume.insert(
            vg,
            Coefficients::new(
                vec![-9.5 + 0.05 * vg as f32, 1.8, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                0,
            ),
        );
        for class in 1..=4 {
            let a3 = if class == 4 { -0.02 } else { -0.3 };
            t.util_comp_ws_volume.insert(
                (class, vg),
                Coefficients::new(vec![0.0, 0.8, 0.7, a3], 0),
            );
            t.close_utilization_volume.insert(
                (class, vg),
                Coefficients::new(vec![0.1, 0.05, 0.03], 1),
            );
            t.volume_net_decay.insert(
                (class, vg),
                Coefficients::new(vec![2.0, 0.2, -0.2], 1),
            );
        }
        t.breakage
            .insert(vg, Coefficients::new(vec![4.0, 1.0, 2.0, 10.0], 1));
    }

    for group in 1..=16 {
        t.upper_bounds.insert(
            group,
            UpperBounds {
                basal_area: 65.0 + group as f32,
                quad_mean_diameter: 55.0 + group as f32,
            },
        );
        for (zone, _) in ZONES {
            t.basal_area_yield.insert(
                (zone.to_string(), group),
                Coefficients::new(vec![1.0, 0.8, 0.1, -0.03, -0.01], 0),
            );
        }
    }

    for genus in GENERA {
        for region in [Region::Interior, Region::Coastal] {
            t.age_maximums.insert(
                curve_id(genus, region),
                SiteCurveAgeMaximum {
                    age_maximum_coastal: 300.0,
                    age_maximum_interior: 250.0,
                    t1: 100.0,
                    t2: 150.0,
                },
            );
        }
    }

    t
}

/// Site curve bank matching the demo coefficient tables.
pub fn demo_curve_bank() -> CurveBank {
    let mut bank = CurveBank::new();

    let mut ids = Vec::new();
    for genus in GENERA {
        for region in [Region::Interior, Region::Coastal] {
            let id = curve_id(genus, region);
            if !ids.contains(&id) {
                ids.push(id);
            }
            bank.insert_species_default(genus, region, id);
        }
    }

    for (i, id) in ids.iter().enumerate() {
        bank.insert_curve(
            *id,
            CurveParams {
                k: 0.022 + 0.002 * (i % 5) as f32,
                p: 1.05 + 0.05 * (i % 4) as f32,
                ytbh_a: 3.5 + 0.3 * (i % 3) as f32,
                ytbh_b: 50.0 + 4.0 * (i % 4) as f32,
            },
        );
    }

    for a in &ids {
        for b in &ids {
            if a != b {
                bank.insert_conversion(*a, *b, 0.2, 0.98);
            }
        }
    }

    bank
}

fn species_entry(
    genus: &str,
    percent: f32,
    basal_area_all: f32,
    age_total: f32,
    site_index: Option<f32>,
) -> SpeciesInput {
    // Decompose the All-class values across the bands with fixed shares and
    // representative band diameters, then derive the rest consistently.
    let band_shares = [0.2f32, 0.3, 0.3, 0.2];
    let band_diameters = [10.0f32, 15.0, 20.0, 25.0];

    let mut ba = UtilizationVector::new();
    let mut tph = UtilizationVector::new();
    let mut dq = UtilizationVector::new();
    let mut hl = UtilizationVector::new();
    ba.set_all(basal_area_all);

    for (k, uc) in UtilizationClass::UTIL_CLASSES.iter().enumerate() {
        let band_ba = basal_area_all * band_shares[k];
        ba.set(*uc, band_ba);
        dq.set(*uc, band_diameters[k]);
        tph.set(
            *uc,
            crate::estimation::reconcile::trees_per_hectare(band_ba, band_diameters[k]),
        );
    }
    tph.set_all(tph.band_sum());
    dq.set_all(crate::estimation::reconcile::quad_mean_diameter(
        basal_area_all,
        tph.all(),
    ));
    hl.set_all(21.0 + 0.05 * basal_area_all);

    // Small component.
    ba.set_small(0.4);
    dq.set_small(5.5);
    hl.set_small(6.0);
    tph.set_small(crate::estimation::reconcile::trees_per_hectare(0.4, 5.5));

    let volume_factor = |k: f32| {
        let mut v = UtilizationVector::new();
        for uc in UtilizationClass::UTIL_CLASSES {
            v.set(uc, ba.get(uc) * k);
        }
        v.set_all(v.band_sum());
        v
    };
    let mut ws = volume_factor(8.0);
    ws.set_small(1.2);
    let cu = volume_factor(7.2);
    let nd = volume_factor(6.5);
    let ndw = volume_factor(6.2);
    let ndwb = volume_factor(6.0);

    SpeciesInput {
        genus: genus.to_string(),
        percent,
        sub_genus: None,
        age_total: Some(age_total),
        years_to_breast_height: None,
        site_index,
        site_curve_number: None,
        dominant_height: None,
        basal_area: ba,
        trees_per_hectare: tph,
        lorey_height: hl,
        quad_mean_diameter: Some(dq),
        whole_stem_volume: ws,
        close_utilization_volume: cu,
        close_utilization_volume_net_decay: nd,
        close_utilization_volume_net_decay_waste: ndw,
        close_utilization_volume_net_decay_waste_breakage: ndwb,
    }
}

/// A sample interior Douglas-fir / lodgepole pine / cedar polygon with fully
/// decomposed utilization data.
pub fn demo_polygon() -> PolygonDescriptor {
    PolygonDescriptor {
        id: "DEMO 082L 0001".to_string(),
        year: 2015,
        bec: BecZone::new("IDF", Region::Interior),
        target_year: Some(2025),
        species: vec![
            species_entry("F", 60.0, 18.0, 85.0, Some(19.5)),
            species_entry("PL", 25.0, 7.5, 70.0, Some(17.0)),
            species_entry("C", 15.0, 4.5, 90.0, None),
        ],
        veteran_basal_area: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::reconcile::{basal_area, PI_40K};
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_demo_tables_cover_demo_polygon() {
        let t = demo_control_data();
        let poly = demo_polygon();
        for sp in &poly.species {
            assert!(t.volume_group(&sp.genus, &poly.bec.alias).is_ok());
            assert!(t.default_equation_group(&sp.genus, &poly.bec.alias).is_ok());
            assert!(t.site_curve(&sp.genus, poly.bec.region).is_some());
        }
    }

    #[test]
    fn test_demo_curves_cover_demo_tables() {
        let t = demo_control_data();
        let curves = demo_curve_bank();
        use crate::site::SiteCurveEvaluator;
        for curve in t.site_curves.values() {
            assert!(curves.height_from_age(*curve, 50.0, 20.0, 8.0).is_ok());
        }
    }

    #[test]
    fn test_demo_polygon_percent_sum() {
        let poly = demo_polygon();
        let sum: f32 = poly.species.iter().map(|s| s.percent).sum();
        assert_approx_eq!(sum, 100.0, 0.01);
        assert!(poly.validate().is_ok());
    }

    #[test]
    fn test_demo_species_identity_holds() {
        let poly = demo_polygon();
        for sp in &poly.species {
            let dq = sp.quad_mean_diameter.as_ref().unwrap();
            for uc in UtilizationClass::UTIL_CLASSES {
                let back = basal_area(dq.get(uc), sp.trees_per_hectare.get(uc));
                let expected = sp.basal_area.get(uc);
                assert!(
                    (back - expected).abs() <= 1e-3 * expected.max(1.0),
                    "identity violated for {uc}: {back} vs {expected}"
                );
            }
        }
    }

    #[test]
    fn test_demo_species_bands_sum_to_all() {
        let poly = demo_polygon();
        for sp in &poly.species {
            assert_approx_eq!(sp.basal_area.band_sum(), sp.basal_area.all(), 1e-4);
            assert_approx_eq!(
                sp.whole_stem_volume.band_sum(),
                sp.whole_stem_volume.all(),
                1e-3
            );
        }
    }

    #[test]
    fn test_pi_40k_constant() {
        assert_approx_eq!(PI_40K, std::f32::consts::PI / 40_000.0, 1e-12);
    }
}
