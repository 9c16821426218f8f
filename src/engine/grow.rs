use tracing::debug;

use crate::error::GrowthError;
use crate::estimation::methods::{
    basal_area_by_utilization, basal_area_yield, close_utilization_volume,
    net_decay_and_waste_volume, net_decay_volume, net_decay_waste_breakage_volume,
    non_primary_lorey_height, primary_height_from_lead_height, quad_mean_diameter_by_utilization,
    quad_mean_diameter_for_species, whole_stem_volume, whole_stem_volume_per_tree,
};
use crate::estimation::reconcile::{quad_mean_diameter, reconcile_components, trees_per_hectare};
use crate::estimation::small::estimate_small_components;
use crate::model::{is_missing, Bank, Region, UtilizationClass, UtilizationVector};
use crate::site::{CurveId, SiteCurveEvaluator};
use crate::tables::{ControlData, EMPIRICAL_OCCUPANCY};

use super::state::PrimarySpeciesDetails;
use super::GrowthEngine;

fn height_at(
    curves: &dyn SiteCurveEvaluator,
    curve: CurveId,
    age: f32,
    site_index: f32,
    years_to_breast_height: f32,
) -> Result<f32, GrowthError> {
    curves
        .height_from_age(curve, age, site_index, years_to_breast_height)
        .map_err(|e| {
            GrowthError::processing(format!(
                "height_from_age({curve}, {age}, {site_index}, {years_to_breast_height}) failed: {e}"
            ))
        })
}

/// One year of dominant-height growth for the primary species.
///
/// The current breast-height age is recovered by inverting the site curve at
/// the current height; past the curve's maximum age the height follows the
/// asymptotic extension `Y = y - rate/a * (1 - exp(a t))` until the horizon
/// `T2`, after which growth stops. Returns exactly 0 (never an error) when
/// the stand is at or above its site index with a non-positive inverted age.
pub fn grow_dominant_height(
    curves: &dyn SiteCurveEvaluator,
    tables: &ControlData,
    region: Region,
    dominant_height: f32,
    site_curve: Option<CurveId>,
    site_index: f32,
    years_to_breast_height: f32,
) -> Result<f32, GrowthError> {
    let curve = site_curve
        .ok_or_else(|| GrowthError::processing("no site curve number supplied"))?;
    let maximums = tables.age_maximum(curve);

    if dominant_height <= 1.3 {
        return Err(GrowthError::processing(format!(
            "dominant height {dominant_height} is out of range (must be above 1.3)"
        )));
    }

    let current_age = curves
        .age_from_height(curve, dominant_height, site_index, years_to_breast_height)
        .map_err(|e| {
            GrowthError::processing(format!(
                "age_from_height({curve}, {dominant_height}, {site_index}) failed: {e}"
            ))
        })?;

    if current_age <= 0.0 {
        if dominant_height > site_index {
            return Ok(0.0);
        }
        return Err(GrowthError::processing(format!(
            "current breast-height age {current_age} must be positive"
        )));
    }

    let mut next_age = current_age + 1.0;

    // The total-age ceiling is stored per curve; convert it to a
    // breast-height age before comparing.
    let age_limit = maximums.age_maximum(region);
    let bh_age_limit = if age_limit > 0.0 {
        age_limit - years_to_breast_height
    } else {
        0.0
    };

    if current_age <= bh_age_limit || maximums.t1 <= 0.0 {
        let mut year_part = 1.0f32;

        if maximums.t1 <= 0.0 && bh_age_limit > 0.0 && next_age > bh_age_limit {
            if current_age > bh_age_limit {
                return Ok(0.0);
            }
            // Step just past the limit; growth stops entirely from there on.
            year_part = bh_age_limit - current_age + 0.01;
            next_age = current_age + year_part;
        }

        // The age inversion can be off by up to half a year at high ages, so
        // re-derive the current height rather than trusting the input.
        let current_height = height_at(curves, curve, current_age, site_index, years_to_breast_height)?;
        let next_height = height_at(curves, curve, next_age, site_index, years_to_breast_height)?;
        if next_height < 0.0 {
            return Err(GrowthError::processing(format!(
                "height_from_age({curve}, {next_age}) returned {next_height}"
            )));
        }

        if next_height < current_height && year_part == 1.0 {
            // Rounding error in the site routines?
            if (current_height - next_height).abs() < 0.01 {
                return Ok(0.0);
            }
            return Err(GrowthError::processing(format!(
                "new dominant height {next_height} is less than the current dominant height {current_height}"
            )));
        }

        Ok(next_height - current_height)
    } else {
        // Past the maximum age: derive the extension curve's rate from the
        // height increment at the limit, then solve for the elapsed time.
        let current_height =
            height_at(curves, curve, bh_age_limit, site_index, years_to_breast_height)?;
        let next_height =
            height_at(curves, curve, bh_age_limit + 1.0, site_index, years_to_breast_height)?;

        let rate = (next_height - current_height).max(0.0005);
        let a = 0.5f32.ln() / maximums.t1;
        let y = current_height;

        // Model: Y = y - rate/a * (1 - exp(a t)) where t = age - limit.
        // Solving for t: t = ln(1 + (Y - y) * a/rate) / a.
        let t = if dominant_height > y {
            let term = 1.0 + (dominant_height - y) * a / rate;
            if term <= 1.0e-7 {
                return Ok(0.0);
            }
            term.ln() / a
        } else {
            0.0
        };

        if t > maximums.t2 {
            Ok(0.0)
        } else {
            Ok(rate / a * (-(a * t).exp() + (a * (t + 1.0)).exp()))
        }
    }
}

/// One year of basal-area growth for the primary layer: the increment along
/// the empirical yield curve, capped so the stand never exceeds the larger of
/// the per-group upper bound (over empirical occupancy) and its current
/// basal area.
#[allow(clippy::too_many_arguments)]
pub(super) fn grow_basal_area(
    tables: &ControlData,
    bec: &crate::model::BecZone,
    primary_species_group: i32,
    dominant_height: f32,
    height_growth: f32,
    years_at_breast_height: f32,
    current_basal_area: f32,
    veteran_basal_area: Option<f32>,
) -> Result<f32, GrowthError> {
    let bounds = tables.upper_bounds_for(primary_species_group)?;
    let basal_area_bound = bounds.basal_area / EMPIRICAL_OCCUPANCY;
    let ceiling = basal_area_bound.max(current_basal_area);

    let current_yield = basal_area_yield(
        tables,
        bec,
        primary_species_group,
        dominant_height,
        years_at_breast_height,
        veteran_basal_area,
        true,
    )?;
    let next_yield = basal_area_yield(
        tables,
        bec,
        primary_species_group,
        dominant_height + height_growth,
        years_at_breast_height + 1.0,
        veteran_basal_area,
        true,
    )?;

    let increment = (next_yield - current_yield).max(0.0);
    let next = (current_basal_area + increment).min(ceiling);
    Ok((next - current_basal_area).max(0.0))
}

impl<'a> GrowthEngine<'a> {
    /// Advance the polygon's primary layer one simulated year, producing a
    /// fresh bank; the source bank is left untouched.
    pub(super) fn grow_year(
        &self,
        state: &mut super::PolygonProcessingState,
        current_year: i32,
        start_year: i32,
    ) -> Result<Bank, GrowthError> {
        if current_year > start_year && self.variables.update_during_growth {
            self.calculate_coverages(state);
            self.calculate_dominant_height_age_site_index(state)?;
        }

        let ranking = state.ranking()?.clone();
        let details = *state.primary_details()?;
        let source = &state.bank;
        let region = source.bec.region;
        let primary = ranking.primary_species_index;

        debug!(
            polygon = %state.polygon_id,
            year = current_year,
            dominant_height = details.dominant_height,
            "growing one year"
        );

        let height_growth = grow_dominant_height(
            self.curves,
            self.tables,
            region,
            details.dominant_height,
            source.site_curve_numbers[primary],
            details.site_index,
            details.years_to_breast_height,
        )?;
        let new_dominant_height = details.dominant_height + height_growth;

        let current_basal_area = source.basal_areas[0].all();
        let basal_area_growth = grow_basal_area(
            self.tables,
            &source.bec,
            ranking.primary_species_group,
            details.dominant_height,
            height_growth,
            details.years_at_breast_height,
            current_basal_area,
            source.veteran_basal_area,
        )?;
        let new_stand_basal_area = current_basal_area + basal_area_growth;

        let mut target = source.clone();

        for i in 0..=target.n_species() {
            if !is_missing(target.age_totals[i]) {
                target.age_totals[i] += 1.0;
            }
            if !is_missing(target.years_at_breast_height[i]) {
                target.years_at_breast_height[i] += 1.0;
            }
        }
        target.dominant_heights[primary] = new_dominant_height;

        // Allocate the year's basal-area growth across species in proportion
        // to their current share.
        for i in target.indices() {
            let proportion = source.basal_areas[i].all() / current_basal_area;
            target.basal_areas[i].set_all(source.basal_areas[i].all() + basal_area_growth * proportion);
        }

        // Species heights follow the new dominant height.
        let primary_genus = target.genera[primary].clone();
        let primary_trees_per_hectare = source.trees_per_hectare[primary].all();
        let primary_lorey_height = primary_height_from_lead_height(
            self.tables,
            new_dominant_height,
            &primary_genus,
            region,
            primary_trees_per_hectare,
        )?;
        target.lorey_heights[primary].set_all(primary_lorey_height);
        for i in target.indices() {
            if i == primary {
                continue;
            }
            let height = non_primary_lorey_height(
                self.tables,
                &target.genera[i],
                &primary_genus,
                region,
                new_dominant_height,
                primary_lorey_height,
            )?;
            target.lorey_heights[i].set_all(height);
        }

        // Stand-level diameter after growth: density carried from the source,
        // diameter bounded by the per-group ceiling.
        let bounds = self.tables.upper_bounds_for(ranking.primary_species_group)?;
        let mut stand_trees_per_hectare = source.trees_per_hectare[0].all();
        let mut stand_quad_mean_diameter =
            quad_mean_diameter(new_stand_basal_area, stand_trees_per_hectare);
        if stand_quad_mean_diameter > bounds.quad_mean_diameter {
            stand_quad_mean_diameter = bounds.quad_mean_diameter;
            stand_trees_per_hectare =
                trees_per_hectare(new_stand_basal_area, stand_quad_mean_diameter);
        }
        let stand_lorey_height = {
            let mut weighted = 0.0;
            let mut basal_area_sum = 0.0;
            for i in target.indices() {
                let ba = target.basal_areas[i].all();
                weighted += ba * target.lorey_heights[i].all();
                basal_area_sum += ba;
            }
            if basal_area_sum > 0.0 {
                weighted / basal_area_sum
            } else {
                primary_lorey_height
            }
        };

        // Per-species diameters and densities for the new year.
        for i in target.indices() {
            let dq = quad_mean_diameter_for_species(
                self.tables,
                &target,
                i,
                region,
                stand_quad_mean_diameter,
                new_stand_basal_area,
                stand_trees_per_hectare,
                stand_lorey_height,
            )?;
            target.quad_mean_diameters[i].set_all(dq);
            target.trees_per_hectare[i]
                .set_all(trees_per_hectare(target.basal_areas[i].all(), dq));
        }

        // Full estimation stack per species, with the compatibility variables
        // pulling estimates back toward the supplied stand data.
        for s in 1..=target.n_species() {
            self.grow_species_utilization(state, &mut target, s, &details, region)?;
        }

        target.refresh_stand_totals();

        state.primary_details = Some(PrimarySpeciesDetails {
            dominant_height: new_dominant_height,
            site_index: details.site_index,
            total_age: details.total_age + 1.0,
            years_at_breast_height: details.years_at_breast_height + 1.0,
            years_to_breast_height: details.years_to_breast_height,
        });

        Ok(target)
    }

    /// Re-derive one species' utilization-class decomposition and volume
    /// chain after the year's growth.
    fn grow_species_utilization(
        &self,
        state: &super::PolygonProcessingState,
        target: &mut Bank,
        s: usize,
        details: &PrimarySpeciesDetails,
        region: Region,
    ) -> Result<(), GrowthError> {
        let genus = target.genera[s].clone();
        let compat = state.compatibility(s)?.clone();
        let bec = target.bec.clone();
        let volume_group = target.volume_groups[s];
        let decay_group = target.decay_groups[s];
        let breakage_group = target.breakage_groups[s];
        let lorey_height_all = target.lorey_heights[s].all();
        let years_at_breast_height = details.years_at_breast_height + 1.0;

        // Diameter bands, with the compatibility offsets added back.
        let mut dq = UtilizationVector::new();
        dq.set_all(target.quad_mean_diameters[s].all());
        quad_mean_diameter_by_utilization(self.tables, &bec, &mut dq, &genus)?;
        for uc in UtilizationClass::UTIL_CLASSES {
            let adjusted = dq.get(uc) + compat.quad_mean_diameter.get(uc);
            dq.set(uc, adjusted.max(uc.low_bound()));
        }

        // Basal-area bands, adjusted and rescaled so they still sum to All.
        let mut ba = UtilizationVector::new();
        ba.set_all(target.basal_areas[s].all());
        basal_area_by_utilization(self.tables, &bec, &dq, &mut ba, &genus)?;
        for uc in UtilizationClass::UTIL_CLASSES {
            ba.set(uc, (ba.get(uc) + compat.basal_area.get(uc)).max(0.0));
        }
        let band_sum = ba.band_sum();
        if band_sum > 0.0 {
            let k = ba.all() / band_sum;
            for uc in UtilizationClass::UTIL_CLASSES {
                ba.set(uc, ba.get(uc) * k);
            }
        }

        let mut tph = UtilizationVector::new();
        tph.set_all(target.trees_per_hectare[s].all());
        reconcile_components(&ba, &mut tph, &mut dq);

        // Volume chain.
        let mut ws = UtilizationVector::new();
        let ws_all = tph.all()
            * whole_stem_volume_per_tree(self.tables, volume_group, lorey_height_all, dq.all())?;
        ws.set_all(ws_all);
        whole_stem_volume(
            self.tables,
            UtilizationClass::All,
            &compat.whole_stem_volume,
            volume_group,
            lorey_height_all,
            &dq,
            &ba,
            &mut ws,
        )?;

        let mut cu = UtilizationVector::new();
        close_utilization_volume(
            self.tables,
            UtilizationClass::All,
            &compat.close_utilization_volume,
            volume_group,
            lorey_height_all,
            &dq,
            &ws,
            &mut cu,
        )?;

        let mut nd = UtilizationVector::new();
        net_decay_volume(
            self.tables,
            &genus,
            region,
            UtilizationClass::All,
            &compat.net_decay_volume,
            decay_group,
            years_at_breast_height,
            &dq,
            &cu,
            &mut nd,
        )?;

        let mut ndw = UtilizationVector::new();
        net_decay_and_waste_volume(
            self.tables,
            region,
            UtilizationClass::All,
            &compat.net_decay_waste_volume,
            &genus,
            lorey_height_all,
            &dq,
            &cu,
            &nd,
            &mut ndw,
        )?;

        let mut ndwb = UtilizationVector::new();
        net_decay_waste_breakage_volume(
            self.tables,
            UtilizationClass::All,
            breakage_group,
            &dq,
            &cu,
            &ndw,
            &mut ndwb,
        )?;

        target.basal_areas[s] = ba;
        target.trees_per_hectare[s] = tph;
        target.quad_mean_diameters[s] = dq;
        target.whole_stem_volumes[s] = ws;
        target.close_utilization_volumes[s] = cu;
        target.cu_volumes_net_decay[s] = nd;
        target.cu_volumes_net_decay_waste[s] = ndw;
        target.cu_volumes_net_decay_waste_breakage[s] = ndwb;

        // Small component, with its own adjustments applied.
        let estimate =
            estimate_small_components(self.tables, target, s, region, years_at_breast_height)?;
        let basal_area_small = (estimate.basal_area + compat.small.basal_area).max(0.0);
        let dq_small = (estimate.quad_mean_diameter + compat.small.quad_mean_diameter).max(4.0);
        let lorey_height_small =
            1.3 + (estimate.lorey_height - 1.3) * compat.small.lorey_height.exp();
        let tph_small = trees_per_hectare(basal_area_small, dq_small);
        let ws_small = tph_small * estimate.mean_volume * compat.small.whole_stem_volume.exp();

        target.basal_areas[s].set_small(basal_area_small);
        target.quad_mean_diameters[s].set_small(dq_small);
        target.lorey_heights[s].set_small(lorey_height_small);
        target.trees_per_hectare[s].set_small(tph_small);
        target.whole_stem_volumes[s].set_small(ws_small);

        Ok(())
    }
}
