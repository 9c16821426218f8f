use assert_approx_eq::assert_approx_eq;

use stand_growth_engine::{
    engine::ExecutionStep,
    estimation::{basal_area, PI_40K},
    model::{is_missing, Bank, UtilizationClass},
    report::YearSummary,
    tables::demo::{demo_control_data, demo_curve_bank, demo_polygon},
    ControlVariables, GrowTarget, GrowthEngine, GrowthError,
};

fn engine_with<'a>(
    tables: &'a stand_growth_engine::ControlData,
    curves: &'a stand_growth_engine::site::CurveBank,
    target: GrowTarget,
) -> GrowthEngine<'a> {
    GrowthEngine::new(
        tables,
        curves,
        ControlVariables {
            grow_target: target,
            update_during_growth: false,
        },
    )
}

fn no_sink() -> impl FnMut(i32, &Bank) {
    |_, _| {}
}

#[test]
fn test_rankings_select_primary_and_secondary() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();
    let engine = engine_with(&tables, &curves, GrowTarget::FromPolygon);

    let state = engine
        .process_polygon_until(
            &demo_polygon(),
            ExecutionStep::DeterminePolygonRankings,
            &mut no_sink(),
        )
        .unwrap();

    let ranking = state.ranking().unwrap();
    assert_eq!(state.bank.genera[ranking.primary_species_index], "F");
    let secondary = ranking.secondary_species_index.unwrap();
    assert_eq!(state.bank.genera[secondary], "PL");
    // F primary with PL secondary at 60% cover.
    assert_eq!(ranking.inventory_type_group, 5);
}

#[test]
fn test_missing_site_curves_are_filled() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();
    let engine = engine_with(&tables, &curves, GrowTarget::FromPolygon);

    let state = engine
        .process_polygon_until(
            &demo_polygon(),
            ExecutionStep::CalculateMissingSiteCurves,
            &mut no_sink(),
        )
        .unwrap();

    for s in state.bank.indices() {
        assert!(
            state.bank.site_curve_numbers[s].is_some(),
            "species {s} still has no site curve"
        );
    }
}

#[test]
fn test_coverages_match_basal_area_shares() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();
    let engine = engine_with(&tables, &curves, GrowTarget::FromPolygon);

    let state = engine
        .process_polygon_until(
            &demo_polygon(),
            ExecutionStep::CalculateCoverages,
            &mut no_sink(),
        )
        .unwrap();

    assert_approx_eq!(state.bank.percentages[1], 60.0, 1e-3);
    assert_approx_eq!(state.bank.percentages[2], 25.0, 1e-3);
    assert_approx_eq!(state.bank.percentages[3], 15.0, 1e-3);
}

#[test]
fn test_missing_site_indices_are_estimated() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();
    let engine = engine_with(&tables, &curves, GrowTarget::FromPolygon);

    // Species C is supplied without a site index.
    let state = engine
        .process_polygon_until(
            &demo_polygon(),
            ExecutionStep::EstimateMissingSiteIndices,
            &mut no_sink(),
        )
        .unwrap();

    for s in state.bank.indices() {
        assert!(
            !is_missing(state.bank.site_indices[s]),
            "species {s} still has no site index"
        );
    }
    // The stand site index is the primary species' value.
    assert_approx_eq!(state.bank.site_indices[0], state.bank.site_indices[1], 1e-5);
}

#[test]
fn test_years_to_breast_height_are_estimated() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();
    let engine = engine_with(&tables, &curves, GrowTarget::FromPolygon);

    let state = engine
        .process_polygon_until(
            &demo_polygon(),
            ExecutionStep::EstimateMissingYearsToBreastHeight,
            &mut no_sink(),
        )
        .unwrap();

    for s in state.bank.indices() {
        assert!(!is_missing(state.bank.years_to_breast_height[s]));
        assert!(!is_missing(state.bank.years_at_breast_height[s]));
        assert!(state.bank.years_to_breast_height[s] > 0.0);
    }
}

#[test]
fn test_primary_details_are_resolved() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();
    let engine = engine_with(&tables, &curves, GrowTarget::FromPolygon);

    let state = engine
        .process_polygon_until(
            &demo_polygon(),
            ExecutionStep::CalculateDominantHeightAgeSiteIndex,
            &mut no_sink(),
        )
        .unwrap();

    let details = state.primary_details().unwrap();
    assert!(details.dominant_height > 1.3);
    assert!(details.site_index > 1.3);
    assert_approx_eq!(details.total_age, 85.0, 1e-3);
    assert_approx_eq!(
        details.years_at_breast_height + details.years_to_breast_height,
        details.total_age,
        1e-2
    );
}

#[test]
fn test_compatibility_variables_are_set_for_all_species() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();
    let engine = engine_with(&tables, &curves, GrowTarget::FromPolygon);

    let state = engine
        .process_polygon_until(
            &demo_polygon(),
            ExecutionStep::SetCompatibilityVariables,
            &mut no_sink(),
        )
        .unwrap();

    for s in state.bank.indices() {
        let compat = state.compatibility(s).unwrap();
        for uc in UtilizationClass::UTIL_CLASSES {
            assert!(compat.close_utilization_volume.get(uc).is_finite());
            assert!(compat.basal_area.get(uc).is_finite());
            assert!(compat.quad_mean_diameter.get(uc).is_finite());
        }
        assert!(compat.small.basal_area.is_finite());
    }
}

#[test]
fn test_full_projection_produces_one_row_per_year() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();
    let engine = engine_with(&tables, &curves, GrowTarget::FromPolygon);

    let mut years = Vec::new();
    engine
        .process_polygon(&demo_polygon(), &mut |year, _| years.push(year))
        .unwrap();

    // 2015 through the polygon's target year 2025, inclusive.
    assert_eq!(years, (2015..=2025).collect::<Vec<_>>());
}

#[test]
fn test_projection_grows_the_stand() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();
    let engine = engine_with(&tables, &curves, GrowTarget::FromPolygon);

    let mut rows = Vec::new();
    engine
        .process_polygon(&demo_polygon(), &mut |year, bank| {
            rows.push(YearSummary::from_bank(year, bank));
        })
        .unwrap();

    let first = &rows[0];
    let last = &rows[rows.len() - 1];
    assert!(last.basal_area > first.basal_area);
    assert!(last.lorey_height > first.lorey_height);
    for pair in rows.windows(2) {
        assert!(
            pair[1].basal_area >= pair[0].basal_area - 1e-4,
            "basal area shrank from {} to {}",
            pair[0].basal_area,
            pair[1].basal_area
        );
    }
}

#[test]
fn test_projection_preserves_identity_and_band_sums() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();
    let engine = engine_with(&tables, &curves, GrowTarget::FromPolygon);

    let state = engine
        .process_polygon(&demo_polygon(), &mut no_sink())
        .unwrap();
    let bank = &state.bank;

    for s in bank.indices() {
        // Bands sum to the All slot.
        assert_approx_eq!(
            bank.basal_areas[s].band_sum(),
            bank.basal_areas[s].all(),
            1e-3
        );
        assert_approx_eq!(
            bank.trees_per_hectare[s].band_sum(),
            bank.trees_per_hectare[s].all(),
            1e-2
        );

        // BA = PI_40K * DQ^2 * TPH wherever there are stems.
        for uc in UtilizationClass::UTIL_CLASSES {
            let tph = bank.trees_per_hectare[s].get(uc);
            if tph > 0.0 {
                let back = basal_area(bank.quad_mean_diameters[s].get(uc), tph);
                let expected = bank.basal_areas[s].get(uc);
                assert!(
                    (back - expected).abs() <= 1e-3 * expected.max(1e-3),
                    "species {s} class {uc}: {back} vs {expected}"
                );
            }
        }
    }

    // Sanity-check the constant itself.
    assert!((PI_40K - std::f32::consts::PI / 40_000.0).abs() < 1e-10);
}

#[test]
fn test_projection_is_deterministic() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();

    let mut first_rows = Vec::new();
    engine_with(&tables, &curves, GrowTarget::FromPolygon)
        .process_polygon(&demo_polygon(), &mut |year, bank| {
            first_rows.push(YearSummary::from_bank(year, bank));
        })
        .unwrap();

    let mut second_rows = Vec::new();
    engine_with(&tables, &curves, GrowTarget::FromPolygon)
        .process_polygon(&demo_polygon(), &mut |year, bank| {
            second_rows.push(YearSummary::from_bank(year, bank));
        })
        .unwrap();

    assert_eq!(first_rows.len(), second_rows.len());
    for (a, b) in first_rows.iter().zip(&second_rows) {
        assert_eq!(a.year, b.year);
        assert_eq!(a.basal_area, b.basal_area);
        assert_eq!(a.whole_stem_volume, b.whole_stem_volume);
    }
}

#[test]
fn test_shorter_run_is_a_prefix_of_a_longer_run() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();

    let mut to_2020 = Vec::new();
    engine_with(&tables, &curves, GrowTarget::Absolute(2020))
        .process_polygon(&demo_polygon(), &mut |year, bank| {
            to_2020.push(YearSummary::from_bank(year, bank));
        })
        .unwrap();

    let mut to_2025 = Vec::new();
    engine_with(&tables, &curves, GrowTarget::Absolute(2025))
        .process_polygon(&demo_polygon(), &mut |year, bank| {
            to_2025.push(YearSummary::from_bank(year, bank));
        })
        .unwrap();

    assert_eq!(to_2020.len(), 6);
    for (a, b) in to_2020.iter().zip(&to_2025) {
        assert_eq!(a.year, b.year);
        assert_eq!(a.basal_area, b.basal_area);
        assert_eq!(a.trees_per_hectare, b.trees_per_hectare);
        assert_eq!(a.net_volume, b.net_volume);
    }
}

#[test]
fn test_relative_and_absolute_targets() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();

    let mut years = Vec::new();
    engine_with(&tables, &curves, GrowTarget::Relative(3))
        .process_polygon(&demo_polygon(), &mut |year, _| years.push(year))
        .unwrap();
    assert_eq!(years, vec![2015, 2016, 2017, 2018]);

    let mut years = Vec::new();
    engine_with(&tables, &curves, GrowTarget::Absolute(2017))
        .process_polygon(&demo_polygon(), &mut |year, _| years.push(year))
        .unwrap();
    assert_eq!(years, vec![2015, 2016, 2017]);
}

#[test]
fn test_from_polygon_target_requires_target_year() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();

    let mut polygon = demo_polygon();
    polygon.target_year = None;
    let err = engine_with(&tables, &curves, GrowTarget::FromPolygon)
        .process_polygon(&polygon, &mut no_sink())
        .unwrap_err();
    assert!(err.to_string().contains("target year"));
}

#[test]
fn test_zero_basal_area_polygon_has_no_work() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();

    let mut polygon = demo_polygon();
    for sp in &mut polygon.species {
        sp.basal_area = Default::default();
        sp.trees_per_hectare = Default::default();
        sp.whole_stem_volume = Default::default();
        sp.close_utilization_volume = Default::default();
        sp.close_utilization_volume_net_decay = Default::default();
        sp.close_utilization_volume_net_decay_waste = Default::default();
        sp.close_utilization_volume_net_decay_waste_breakage = Default::default();
    }
    let err = engine_with(&tables, &curves, GrowTarget::FromPolygon)
        .process_polygon_until(&polygon, ExecutionStep::CheckForWork, &mut no_sink())
        .unwrap_err();
    assert!(err.to_string().contains("no species with basal area"));
}

#[test]
fn test_missing_ages_everywhere_carries_reason_code() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();

    let mut polygon = demo_polygon();
    for sp in &mut polygon.species {
        sp.age_total = None;
        sp.years_to_breast_height = None;
    }
    let err = engine_with(&tables, &curves, GrowTarget::FromPolygon)
        .process_polygon_until(
            &polygon,
            ExecutionStep::CalculateDominantHeightAgeSiteIndex,
            &mut no_sink(),
        )
        .unwrap_err();
    match err {
        GrowthError::Processing { reason, .. } => assert_eq!(reason, Some(5)),
        other => panic!("expected a processing error, got {other:?}"),
    }
}

#[test]
fn test_update_during_growth_still_converges() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();
    let engine = GrowthEngine::new(
        &tables,
        &curves,
        ControlVariables {
            grow_target: GrowTarget::Absolute(2020),
            update_during_growth: true,
        },
    );

    let mut rows = Vec::new();
    engine
        .process_polygon(&demo_polygon(), &mut |year, bank| {
            rows.push(YearSummary::from_bank(year, bank));
        })
        .unwrap();

    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|r| r.basal_area.is_finite()));
    assert!(rows.last().unwrap().basal_area >= rows[0].basal_area);
}

#[test]
fn test_pure_stand_single_species() {
    let tables = demo_control_data();
    let curves = demo_curve_bank();

    let mut polygon = demo_polygon();
    let mut only = polygon.species.remove(0);
    only.percent = 100.0;
    polygon.species = vec![only];

    let state = engine_with(&tables, &curves, GrowTarget::Absolute(2020))
        .process_polygon(&polygon, &mut no_sink())
        .unwrap();

    let ranking = state.ranking().unwrap();
    assert_eq!(state.bank.genera[ranking.primary_species_index], "F");
    assert_eq!(ranking.secondary_species_index, None);
    // Pure F maps to inventory type group 1.
    assert_eq!(ranking.inventory_type_group, 1);
    assert!(state.bank.basal_areas[0].all() > 0.0);
}
