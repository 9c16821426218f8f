mod grow;
mod state;

pub use grow::grow_dominant_height;
pub use state::{
    PolygonProcessingState, PrimarySpeciesDetails, SmallCompatibility, SpeciesCompatibility,
    SpeciesRanking,
};

use tracing::{debug, info, warn};

use crate::error::{GrowthError, Resolved};
use crate::estimation::methods::{
    basal_area_by_utilization, close_utilization_volume, lead_height_from_primary_height,
    net_decay_and_waste_volume, net_decay_volume, quad_mean_diameter_by_utilization,
    whole_stem_volume, whole_stem_volume_per_tree,
};
use crate::estimation::reconcile::reconcile_components;
use crate::estimation::small::estimate_small_components;
use crate::model::{is_missing, Bank, PolygonDescriptor, UtilizationClass, UtilizationVector};
use crate::site::{CurveId, SiteCurveError, SiteCurveEvaluator};
use crate::tables::{
    itg_pure, species_index, ControlData, ControlVariables, GrowTarget, DEFAULT_EQUATION_GROUPS,
    EXCEPTED_SPECIES_INDICES, HARDWOODS, PRIMARY_SPECIES_TO_COMBINE,
};

/// Species below this basal area do not constitute processable work.
const MIN_BASAL_AREA: f32 = 0.001;

/// Minimum base volume below which a volume compatibility variable is not
/// computed.
const V_BASE_MIN: f32 = 0.1;

/// Minimum base basal area below which a basal-area or diameter
/// compatibility variable is not computed.
const B_BASE_MIN: f32 = 0.01;

/// Stand-in diameters for size bands whose supplied value is missing,
/// indexed by band index 1..=4.
const DEFAULT_QUAD_MEAN_DIAMETERS: [f32; 5] = [f32::NAN, 10.0, 15.0, 20.0, 25.0];

/// The ordered stages of the polygon pipeline. Running "up to" a step runs
/// every earlier stage and the step itself; no selected stage is ever
/// skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExecutionStep {
    CheckForWork,
    CalculateMissingSiteCurves,
    CalculateCoverages,
    DeterminePolygonRankings,
    EstimateMissingSiteIndices,
    EstimateMissingYearsToBreastHeight,
    CalculateDominantHeightAgeSiteIndex,
    SetCompatibilityVariables,
    Grow,
}

impl ExecutionStep {
    pub const ALL: [ExecutionStep; 9] = [
        ExecutionStep::CheckForWork,
        ExecutionStep::CalculateMissingSiteCurves,
        ExecutionStep::CalculateCoverages,
        ExecutionStep::DeterminePolygonRankings,
        ExecutionStep::EstimateMissingSiteIndices,
        ExecutionStep::EstimateMissingYearsToBreastHeight,
        ExecutionStep::CalculateDominantHeightAgeSiteIndex,
        ExecutionStep::SetCompatibilityVariables,
        ExecutionStep::Grow,
    ];

    pub fn predecessor(self) -> Option<ExecutionStep> {
        let i = Self::ALL.iter().position(|s| *s == self)?;
        if i == 0 {
            None
        } else {
            Some(Self::ALL[i - 1])
        }
    }

    pub fn successor(self) -> Option<ExecutionStep> {
        let i = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(i + 1).copied()
    }
}

/// The stand growth engine: runs the stage pipeline over one polygon at a
/// time and advances the primary layer year by year.
///
/// The coefficient tables and site curve service are shared and read-only;
/// all mutable state lives in the per-polygon [`PolygonProcessingState`], so
/// separate engine instances may process polygons concurrently.
pub struct GrowthEngine<'a> {
    pub(crate) tables: &'a ControlData,
    pub(crate) curves: &'a dyn SiteCurveEvaluator,
    pub(crate) variables: ControlVariables,
}

impl<'a> GrowthEngine<'a> {
    pub fn new(
        tables: &'a ControlData,
        curves: &'a dyn SiteCurveEvaluator,
        variables: ControlVariables,
    ) -> Self {
        Self {
            tables,
            curves,
            variables,
        }
    }

    /// Run the full pipeline including growth; `sink` is invoked once per
    /// simulated year (including the starting year) with the layer's state.
    pub fn process_polygon(
        &self,
        polygon: &PolygonDescriptor,
        sink: &mut dyn FnMut(i32, &Bank),
    ) -> Result<PolygonProcessingState, GrowthError> {
        self.process_polygon_until(polygon, ExecutionStep::Grow, sink)
    }

    /// Run the pipeline up to and including `last_step`.
    pub fn process_polygon_until(
        &self,
        polygon: &PolygonDescriptor,
        last_step: ExecutionStep,
        sink: &mut dyn FnMut(i32, &Bank),
    ) -> Result<PolygonProcessingState, GrowthError> {
        info!(polygon = %polygon.id, "starting processing of polygon");

        let bank = Bank::from_polygon(polygon, self.tables)?;
        let mut state = PolygonProcessingState::new(&polygon.id, polygon.year, bank);

        if last_step >= ExecutionStep::CheckForWork {
            self.check_for_work(&state)?;
        }
        if last_step >= ExecutionStep::CalculateMissingSiteCurves {
            self.calculate_missing_site_curves(&mut state)?;
        }
        if last_step >= ExecutionStep::CalculateCoverages {
            self.calculate_coverages(&mut state);
        }
        if last_step >= ExecutionStep::DeterminePolygonRankings {
            self.determine_polygon_rankings(&mut state)?;
        }
        if last_step >= ExecutionStep::EstimateMissingSiteIndices {
            self.estimate_missing_site_indices(&mut state)?;
        }
        if last_step >= ExecutionStep::EstimateMissingYearsToBreastHeight {
            self.estimate_missing_years_to_breast_height(&mut state);
        }
        if last_step >= ExecutionStep::CalculateDominantHeightAgeSiteIndex {
            self.calculate_dominant_height_age_site_index(&mut state)?;
        }
        if last_step >= ExecutionStep::SetCompatibilityVariables {
            self.set_compatibility_variables(&mut state)?;
        }
        if last_step >= ExecutionStep::Grow {
            let start_year = polygon.year;
            let target_year = self.resolve_target_year(polygon)?;

            sink(start_year, &state.bank);
            for year in (start_year + 1)..=target_year {
                let next = self.grow_year(&mut state, year, start_year)?;
                state.bank = next;
                sink(year, &state.bank);
            }
        }

        Ok(state)
    }

    fn resolve_target_year(&self, polygon: &PolygonDescriptor) -> Result<i32, GrowthError> {
        match self.variables.grow_target {
            GrowTarget::FromPolygon => polygon.target_year.ok_or_else(|| {
                GrowthError::processing(format!(
                    "grow target is per-polygon, but polygon {} supplies no target year",
                    polygon.id
                ))
            }),
            GrowTarget::Relative(years) => Ok(polygon.year + years),
            GrowTarget::Absolute(year) => Ok(year),
        }
    }

    /// Fail fast when the layer has no species with usable basal area.
    fn check_for_work(&self, state: &PolygonProcessingState) -> Result<(), GrowthError> {
        let has_work = state
            .bank
            .indices()
            .any(|s| state.bank.basal_areas[s].all() > MIN_BASAL_AREA);
        if !has_work {
            return Err(GrowthError::processing(format!(
                "polygon {} layer has no species with basal area above {MIN_BASAL_AREA}",
                state.polygon_id
            )));
        }
        Ok(())
    }

    /// Resolve a site curve for every species that was not supplied one:
    /// first the site-curve map keyed by the leading sub-genus, then by the
    /// species' own genus, then the curve service's per-genus default.
    fn calculate_missing_site_curves(
        &self,
        state: &mut PolygonProcessingState,
    ) -> Result<(), GrowthError> {
        let bank = &mut state.bank;
        let region = bank.bec.region;

        for i in 1..=bank.n_species() {
            if bank.site_curve_numbers[i].is_some() {
                continue;
            }

            let mut curve = bank.sub_genera[i]
                .as_deref()
                .and_then(|sub| self.tables.site_curve(sub, region));
            if curve.is_none() {
                curve = self.tables.site_curve(&bank.genera[i], region);
            }
            let curve = match curve {
                Some(c) => c,
                None => self
                    .curves
                    .default_curve(&bank.genera[i], region)
                    .map_err(|e| {
                        GrowthError::processing(format!(
                            "no site curve could be found for species {} ({}): {e}",
                            i, bank.genera[i]
                        ))
                    })?,
            };
            bank.site_curve_numbers[i] = Some(curve);
        }
        Ok(())
    }

    /// Percent of forested land covered by each species, from its share of
    /// the stand's basal area.
    pub(crate) fn calculate_coverages(&self, state: &mut PolygonProcessingState) {
        let bank = &mut state.bank;
        let stand_basal_area = bank.basal_areas[0].all();
        debug!(
            n_species = bank.n_species(),
            stand_basal_area, "calculating coverages as species BA over stand BA"
        );

        for i in 1..=bank.n_species() {
            let percent = bank.basal_areas[i].all() / stand_basal_area * 100.0;
            bank.percentages[i] = percent;
            bank.fractions[i] = percent / 100.0;
        }
    }

    /// Select the primary and secondary species, the inventory type group and
    /// the equation groups that follow from them.
    fn determine_polygon_rankings(
        &self,
        state: &mut PolygonProcessingState,
    ) -> Result<(), GrowthError> {
        let bank = &state.bank;
        if bank.n_species() == 0 {
            return Err(GrowthError::processing(
                "can not find primary species as there are no species",
            ));
        }

        let mut percentages = bank.percentages.clone();
        for (a, b) in PRIMARY_SPECIES_TO_COMBINE {
            combine_percentages(&bank.genera, (a, b), &mut percentages);
        }

        let mut highest = 0.0f32;
        let mut highest_index = None;
        let mut second = 0.0f32;
        let mut second_index = None;
        for i in bank.indices() {
            if percentages[i] > highest {
                second_index = highest_index;
                second = highest;
                highest_index = Some(i);
                highest = percentages[i];
            } else if percentages[i] > second {
                second_index = Some(i);
                second = percentages[i];
            }
        }

        let primary = highest_index.ok_or_else(|| {
            GrowthError::processing("there are no species with covering percentage > 0")
        })?;

        let primary_genus = bank.genera[primary].clone();
        let secondary_genus = second_index.map(|i| bank.genera[i].clone());

        let inventory_type_group =
            find_inventory_type_group(&primary_genus, secondary_genus.as_deref(), highest)?;

        let default_group = self
            .tables
            .default_equation_group(&primary_genus, &bank.bec.alias)?;
        let primary_species_group = self
            .tables
            .equation_modifier(default_group, inventory_type_group)
            .unwrap_or(default_group);

        let genus_index = species_index(&primary_genus).ok_or_else(|| {
            GrowthError::processing(format!("unrecognized primary species: {primary_genus}"))
        })?;
        let mut alternate_species_group = DEFAULT_EQUATION_GROUPS[genus_index];
        if bank.bec.region == crate::model::Region::Interior
            && EXCEPTED_SPECIES_INDICES.contains(&genus_index)
        {
            alternate_species_group += 20;
        }

        state.bank.site_curve_numbers[0] = state.bank.site_curve_numbers[primary];
        state.ranking = Some(SpeciesRanking {
            primary_species_index: primary,
            secondary_species_index: second_index,
            inventory_type_group,
            primary_species_group,
            alternate_species_group,
        });
        Ok(())
    }

    /// Two-pass fill of missing site indices: average the other species into
    /// the primary's curve space, then project the primary's value out to
    /// every species still missing one.
    fn estimate_missing_site_indices(
        &self,
        state: &mut PolygonProcessingState,
    ) -> Result<(), GrowthError> {
        let primary = state.ranking()?.primary_species_index;
        let bank = &mut state.bank;
        let primary_curve = bank.site_curve_numbers[primary].ok_or_else(|| {
            GrowthError::processing("primary species site curve has not been resolved")
        })?;

        if is_missing(bank.site_indices[primary]) {
            let mut sum = 0.0f64;
            let mut count = 0u32;

            for i in 1..=bank.n_species() {
                if i == primary || is_missing(bank.site_indices[i]) {
                    continue;
                }
                let curve_i = match bank.site_curve_numbers[i] {
                    Some(c) => c,
                    None => continue,
                };
                match self
                    .curves
                    .convert_site_index(curve_i, bank.site_indices[i], primary_curve)
                {
                    Ok(mapped) if mapped > 1.3 => {
                        sum += mapped as f64;
                        count += 1;
                    }
                    Ok(_) => {}
                    Err(SiteCurveError::NoAnswer) => {
                        warn!(
                            from = curve_i,
                            to = primary_curve,
                            species = i,
                            "no conversion between curves; skipping species"
                        );
                    }
                    Err(e) => {
                        return Err(GrowthError::processing(format!(
                            "site index conversion from curve {curve_i} to {primary_curve} failed: {e}"
                        )));
                    }
                }
            }

            if count > 0 {
                bank.site_indices[primary] = (sum / count as f64) as f32;
            }
        }

        let primary_site_index = bank.site_indices[primary];
        if !is_missing(primary_site_index) {
            for i in 1..=bank.n_species() {
                if i == primary || !is_missing(bank.site_indices[i]) {
                    continue;
                }
                let curve_i = match bank.site_curve_numbers[i] {
                    Some(c) => c,
                    None => continue,
                };
                match self
                    .curves
                    .convert_site_index(primary_curve, primary_site_index, curve_i)
                {
                    Ok(mapped) => bank.site_indices[i] = mapped,
                    Err(SiteCurveError::NoAnswer) => {
                        warn!(
                            from = primary_curve,
                            to = curve_i,
                            species = i,
                            "no conversion between curves; skipping species"
                        );
                    }
                    Err(e) => {
                        return Err(GrowthError::processing(format!(
                            "site index conversion from curve {primary_curve} to {curve_i} failed: {e}"
                        )));
                    }
                }
            }
        }

        bank.site_indices[0] = primary_site_index;
        Ok(())
    }

    /// Derive years-to-breast-height wherever it was not supplied; curve
    /// failures are logged and the value left missing.
    fn estimate_missing_years_to_breast_height(&self, state: &mut PolygonProcessingState) {
        let bank = &mut state.bank;

        let primary = state
            .ranking
            .as_ref()
            .map(|r| r.primary_species_index)
            .unwrap_or(1);
        let mut default_site_index = bank.site_indices[primary];
        if is_missing(default_site_index) {
            for i in 1..=bank.n_species() {
                if !is_missing(bank.site_indices[i]) {
                    default_site_index = bank.site_indices[i];
                    break;
                }
            }
        }

        for i in 1..=bank.n_species() {
            if !is_missing(bank.years_to_breast_height[i]) {
                continue;
            }

            if !is_missing(bank.years_at_breast_height[i])
                && bank.age_totals[i] > bank.years_at_breast_height[i]
            {
                bank.years_to_breast_height[i] =
                    bank.age_totals[i] - bank.years_at_breast_height[i];
                continue;
            }

            let site_index = if !is_missing(bank.site_indices[i]) {
                bank.site_indices[i]
            } else {
                default_site_index
            };
            match bank.site_curve_numbers[i] {
                Some(curve) => match self.curves.years_to_breast_height(curve, site_index) {
                    Ok(value) => bank.years_to_breast_height[i] = value,
                    Err(e) => {
                        warn!(species = i, error = %e, "unable to determine years to breast height");
                    }
                },
                None => {
                    warn!(species = i, "no site curve; years to breast height left missing");
                }
            }
        }

        // Complete the age triple wherever two of the three are now known.
        for i in 1..=bank.n_species() {
            if is_missing(bank.years_at_breast_height[i])
                && !is_missing(bank.age_totals[i])
                && !is_missing(bank.years_to_breast_height[i])
            {
                bank.years_at_breast_height[i] =
                    bank.age_totals[i] - bank.years_to_breast_height[i];
            }
        }
    }

    /// Resolve the primary species' dominant height, ages and site index,
    /// borrowing from other species where the primary's own are missing.
    pub(crate) fn calculate_dominant_height_age_site_index(
        &self,
        state: &mut PolygonProcessingState,
    ) -> Result<(), GrowthError> {
        let ranking = state.ranking()?.clone();
        let bank = &state.bank;
        let primary = ranking.primary_species_index;
        let region = bank.bec.region;

        // (1) Dominant height, estimated from lorey height when not supplied.
        let mut dominant_height = bank.dominant_heights[primary];
        if is_missing(dominant_height) {
            let lorey_height = bank.lorey_heights[primary].all();
            if is_missing(lorey_height) {
                return Err(GrowthError::with_reason(
                    format!(
                        "neither dominant nor lorey height is available for primary species {}",
                        bank.genera[primary]
                    ),
                    2,
                ));
            }

            dominant_height = lead_height_from_primary_height(
                self.tables,
                lorey_height,
                &bank.genera[primary],
                region,
                bank.trees_per_hectare[primary].all(),
            )?;
        }

        // (2) Ages, borrowed from the secondary species or any species with
        // data if the primary's own are missing.
        let mut total_age = bank.age_totals[primary];
        let mut years_at_breast_height = bank.years_at_breast_height[primary];
        let mut years_to_breast_height = bank.years_to_breast_height[primary];

        let mut active: Option<usize> = None;

        if is_missing(total_age) {
            if let Some(secondary) = ranking.secondary_species_index {
                if !is_missing(bank.age_totals[secondary]) {
                    active = Some(secondary);
                }
            }
            if active.is_none() {
                active = bank.indices().find(|i| !is_missing(bank.age_totals[*i]));
            }
            let donor = active
                .ok_or_else(|| GrowthError::with_reason("age data unavailable for ALL species", 5))?;

            total_age = bank.age_totals[donor];
            if !is_missing(years_to_breast_height) {
                years_at_breast_height = total_age - years_to_breast_height;
            } else if !is_missing(years_at_breast_height) {
                years_to_breast_height = total_age - years_at_breast_height;
            } else {
                years_at_breast_height = bank.years_at_breast_height[donor];
                years_to_breast_height = bank.years_to_breast_height[donor];
            }
        }

        // (3) Site index, same borrowing rule, converted into the stand's
        // curve space when a conversion exists.
        let mut site_index = bank.site_indices[primary];
        if is_missing(site_index) {
            if let Some(secondary) = ranking.secondary_species_index {
                if !is_missing(bank.site_indices[secondary]) {
                    active = Some(secondary);
                }
            }
            let donor_invalid = match active {
                None => true,
                Some(i) => is_missing(bank.site_indices[i]),
            };
            if donor_invalid {
                active = bank.indices().find(|i| !is_missing(bank.site_indices[*i]));
            }
            let donor = active.ok_or_else(|| {
                GrowthError::with_reason("site index data unavailable for ALL species", 7)
            })?;
            site_index = bank.site_indices[donor];
        } else {
            active = Some(primary);
        }

        let donor_curve = active.and_then(|donor| bank.site_curve_numbers[donor]);
        let resolved = convert_site_index_or_keep(
            self.curves,
            donor_curve,
            site_index,
            bank.site_curve_numbers[0],
        );
        if let Resolved::Defaulted(_, reason) = &resolved {
            debug!(reason = %reason, "stand site index left unconverted");
        }
        let site_index = resolved.value();

        state.primary_details = Some(PrimarySpeciesDetails {
            dominant_height,
            site_index,
            total_age,
            years_at_breast_height,
            years_to_breast_height,
        });
        Ok(())
    }

    /// Compute, for every species and quantity, the offset between the
    /// model-only ("static") estimate and the supplied value, in logit or log
    /// space. Growth adds these back so trajectories stay anchored to the
    /// input data.
    fn set_compatibility_variables(
        &self,
        state: &mut PolygonProcessingState,
    ) -> Result<(), GrowthError> {
        let details = *state.primary_details()?;
        let primary_years_at_breast_height = details.years_at_breast_height;
        let bec = state.bank.bec.clone();
        let region = bec.region;
        let zero = UtilizationVector::new();

        let n = state.bank.n_species();
        let mut all_compat = vec![SpeciesCompatibility::default(); n + 1];

        for s in 1..=n {
            let bank = &state.bank;
            let genus = bank.genera[s].clone();
            let lorey_height_all = bank.lorey_heights[s].all();
            let volume_group = bank.volume_groups[s];
            let decay_group = bank.decay_groups[s];

            // Scratch vectors seeded from the supplied data; missing band
            // diameters get stand-in values.
            let mut ba = UtilizationVector::new();
            let mut ws = UtilizationVector::new();
            let mut cu = UtilizationVector::new();
            let mut nd = UtilizationVector::new();
            let mut ndw = UtilizationVector::new();
            let mut dq = UtilizationVector::new();
            for uc in UtilizationClass::ALL_AND_BANDS {
                ba.set(uc, bank.basal_areas[s].get(uc));
                ws.set(uc, bank.whole_stem_volumes[s].get(uc));
                cu.set(uc, bank.close_utilization_volumes[s].get(uc));
                nd.set(uc, bank.cu_volumes_net_decay[s].get(uc));
                ndw.set(uc, bank.cu_volumes_net_decay_waste[s].get(uc));

                let mut diameter = bank.quad_mean_diameters[s].get(uc);
                if uc != UtilizationClass::All && diameter <= 0.0 {
                    diameter = DEFAULT_QUAD_MEAN_DIAMETERS[uc.index() as usize];
                }
                dq.set(uc, diameter);
            }

            let mut compat = SpeciesCompatibility::default();

            for uc in UtilizationClass::UTIL_CLASSES {
                // Volume net of decay and waste.
                let base = bank.cu_volumes_net_decay[s].get(uc);
                let mut adjustment = 0.0;
                if base > V_BASE_MIN {
                    net_decay_and_waste_volume(
                        self.tables,
                        region,
                        uc,
                        &zero,
                        &genus,
                        lorey_height_all,
                        &dq,
                        &cu,
                        &nd,
                        &mut ndw,
                    )?;
                    adjustment = compatibility_variable(
                        bank.cu_volumes_net_decay_waste[s].get(uc),
                        base,
                        ndw.get(uc),
                    );
                }
                compat.net_decay_waste_volume.set(uc, adjustment);

                // Volume net of decay.
                let base = bank.close_utilization_volumes[s].get(uc);
                let mut adjustment = 0.0;
                if base > V_BASE_MIN {
                    net_decay_volume(
                        self.tables,
                        &genus,
                        region,
                        uc,
                        &zero,
                        decay_group,
                        primary_years_at_breast_height,
                        &dq,
                        &cu,
                        &mut nd,
                    )?;
                    adjustment = compatibility_variable(
                        bank.cu_volumes_net_decay[s].get(uc),
                        base,
                        nd.get(uc),
                    );
                }
                compat.net_decay_volume.set(uc, adjustment);

                // Close-utilization volume.
                let base = bank.whole_stem_volumes[s].get(uc);
                let mut adjustment = 0.0;
                if base > V_BASE_MIN {
                    close_utilization_volume(
                        self.tables,
                        uc,
                        &zero,
                        volume_group,
                        lorey_height_all,
                        &dq,
                        &ws,
                        &mut cu,
                    )?;
                    adjustment = compatibility_variable(
                        bank.close_utilization_volumes[s].get(uc),
                        base,
                        cu.get(uc),
                    );
                }
                compat.close_utilization_volume.set(uc, adjustment);
            }

            // Whole-stem volume: rebuild the All value from the per-tree
            // estimate, decompose, and compare in log-ratio space.
            let dq_all = bank.quad_mean_diameters[s].all();
            let ws_all = bank.trees_per_hectare[s].all()
                * whole_stem_volume_per_tree(self.tables, volume_group, lorey_height_all, dq_all)?;
            ws.set_all(ws_all);
            whole_stem_volume(
                self.tables,
                UtilizationClass::All,
                &zero,
                volume_group,
                lorey_height_all,
                &dq,
                &ba,
                &mut ws,
            )?;

            for uc in UtilizationClass::UTIL_CLASSES {
                let basal = ba.get(uc);
                let mut adjustment = 0.0;
                if basal > B_BASE_MIN {
                    adjustment = whole_stem_compatibility_variable(
                        bank.whole_stem_volumes[s].get(uc),
                        basal,
                        ws.get(uc),
                    );
                }
                compat.whole_stem_volume.set(uc, adjustment);
            }

            // Static diameter and basal-area decompositions, then the plain
            // differences.
            quad_mean_diameter_by_utilization(self.tables, &bec, &mut dq, &genus)?;
            basal_area_by_utilization(self.tables, &bec, &dq, &mut ba, &genus)?;

            let mut tph = UtilizationVector::new();
            tph.set_all(bank.trees_per_hectare[s].all());
            reconcile_components(&ba, &mut tph, &mut dq);

            for uc in UtilizationClass::UTIL_CLASSES {
                compat
                    .basal_area
                    .set(uc, bank.basal_areas[s].get(uc) - ba.get(uc));

                let original = bank.quad_mean_diameters[s].get(uc);
                let adjusted = dq.get(uc);
                let value = if original < B_BASE_MIN {
                    0.0
                } else if original > 0.0 && adjusted > 0.0 {
                    original - adjusted
                } else {
                    0.0
                };
                compat.quad_mean_diameter.set(uc, value);
            }

            // Small components.
            let estimate = estimate_small_components(
                self.tables,
                bank,
                s,
                region,
                primary_years_at_breast_height,
            )?;

            let input_basal_area_small = bank.basal_areas[s].small();
            compat.small.basal_area = input_basal_area_small - estimate.basal_area;

            compat.small.quad_mean_diameter = if input_basal_area_small > B_BASE_MIN {
                bank.quad_mean_diameters[s].small() - estimate.quad_mean_diameter
            } else {
                0.0
            };

            let input_lorey_height_small = bank.lorey_heights[s].small();
            compat.small.lorey_height = if input_lorey_height_small > 1.3
                && estimate.lorey_height > 1.3
                && input_basal_area_small > 0.0
            {
                ((input_lorey_height_small - 1.3) / (estimate.lorey_height - 1.3)).ln()
            } else {
                0.0
            };

            let input_ws_small = bank.whole_stem_volumes[s].small();
            let input_tph_small = bank.trees_per_hectare[s].small();
            compat.small.whole_stem_volume = if input_ws_small > 0.0
                && estimate.mean_volume > 0.0
                && input_tph_small > 0.0
                && input_basal_area_small >= B_BASE_MIN
            {
                (input_ws_small / input_tph_small / estimate.mean_volume).ln()
            } else {
                0.0
            };

            all_compat[s] = compat;
        }

        state.compatibility = Some(all_compat);
        Ok(())
    }
}

/// Convert a site index between curve spaces, keeping the input value when
/// the conversion is undefined, unresolved or implausibly low. The caller
/// decides whether a defaulted outcome deserves a warning.
fn convert_site_index_or_keep(
    curves: &dyn SiteCurveEvaluator,
    from: Option<CurveId>,
    site_index: f32,
    to: Option<CurveId>,
) -> Resolved<f32> {
    match (from, to) {
        (Some(from), Some(to)) => match curves.convert_site_index(from, site_index, to) {
            Ok(converted) if converted > 1.3 => Resolved::Found(converted),
            Ok(converted) => Resolved::Defaulted(
                site_index,
                format!("converted site index {converted} is below breast height"),
            ),
            Err(e) => Resolved::Defaulted(site_index, e.to_string()),
        },
        _ => Resolved::Defaulted(site_index, "site curves unresolved".to_string()),
    }
}

/// Merge the percentages of a genus pair into whichever member has the
/// higher share (the first encountered wins a tie); the other is zeroed.
/// Nothing happens unless both members are present.
pub fn combine_percentages(genera: &[String], pair: (&str, &str), percentages: &mut [f32]) {
    let first = genera.iter().position(|g| g == pair.0);
    let second = genera.iter().position(|g| g == pair.1);

    if let (Some(i), Some(j)) = (first, second) {
        if i == j {
            return;
        }
        let (winner, loser) = if percentages[i] >= percentages[j] {
            (i, j)
        } else {
            (j, i)
        };
        percentages[winner] += percentages[loser];
        percentages[loser] = 0.0;
    }
}

/// Inventory type group of a stand from its primary and (optional) secondary
/// genera; stands whose primary share exceeds 79.999% are pure and map by
/// genus alone.
pub fn find_inventory_type_group(
    primary_genus: &str,
    secondary_genus: Option<&str>,
    primary_percentage: f32,
) -> Result<i32, GrowthError> {
    if primary_percentage > 79.999 {
        return itg_pure(primary_genus).ok_or_else(|| {
            GrowthError::processing(format!("unrecognized primary species: {primary_genus}"))
        });
    }

    let secondary = secondary_genus.unwrap_or("");
    if primary_genus == secondary {
        return Err(GrowthError::processing(
            "the primary and secondary genera are the same",
        ));
    }
    let is_hardwood = HARDWOODS.contains(&secondary);

    let itg = match primary_genus {
        "F" => match secondary {
            "C" | "Y" => 2,
            "B" | "H" => 3,
            "S" => 4,
            "PL" | "PA" => 5,
            "PY" => 6,
            "L" | "PW" => 7,
            _ => 8,
        },
        "C" | "Y" => match secondary {
            "H" | "B" | "S" => 11,
            _ => 10,
        },
        "H" => match secondary {
            "C" | "Y" => 14,
            "B" => 15,
            "S" => 16,
            _ => 13,
        },
        "B" => match secondary {
            "C" | "Y" | "H" => 19,
            _ => 20,
        },
        "S" => match secondary {
            "C" | "Y" | "H" => 23,
            "B" => 24,
            "PL" => 25,
            _ if is_hardwood => 26,
            _ => 22,
        },
        "PW" => 27,
        "PL" | "PA" => match secondary {
            "PL" | "PA" => 28,
            "F" | "PW" | "L" | "PY" => 29,
            _ if is_hardwood => 31,
            _ => 30,
        },
        "PY" => 32,
        "L" => match secondary {
            "F" => 33,
            _ => 34,
        },
        "AC" => {
            if is_hardwood {
                36
            } else {
                35
            }
        }
        "D" => {
            if is_hardwood {
                38
            } else {
                37
            }
        }
        "MB" => 39,
        "E" => 40,
        "AT" => {
            if is_hardwood {
                42
            } else {
                41
            }
        }
        _ => {
            return Err(GrowthError::processing(format!(
                "unrecognized primary species: {primary_genus}"
            )))
        }
    };
    Ok(itg)
}

fn logit_of_ratio(ratio: f32) -> f32 {
    if ratio <= 0.0 {
        -7.0
    } else if ratio >= 1.0 {
        7.0
    } else {
        (ratio / (1.0 - ratio)).ln().clamp(-7.0, 7.0)
    }
}

/// Compatibility variable of a volume quantity: the difference, in clamped
/// logit space, between the supplied and model ratios over the base volume.
pub fn compatibility_variable(actual: f32, base: f32, model: f32) -> f32 {
    logit_of_ratio(actual / base) - logit_of_ratio(model / base)
}

fn log_of_ratio(ratio: f32) -> f32 {
    if ratio <= 0.0 {
        -2.0
    } else {
        ratio.ln()
    }
}

/// Whole-stem compatibility variable: log-ratio over basal area, floored at
/// -2 for non-positive ratios.
pub fn whole_stem_compatibility_variable(actual: f32, basal_area: f32, model: f32) -> f32 {
    log_of_ratio(actual / basal_area) - log_of_ratio(model / basal_area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn genera(names: &[&str]) -> Vec<String> {
        let mut all = vec![String::new()];
        all.extend(names.iter().map(|n| n.to_string()));
        all
    }

    #[test]
    fn test_execution_step_order() {
        assert!(ExecutionStep::CheckForWork < ExecutionStep::Grow);
        assert!(ExecutionStep::DeterminePolygonRankings < ExecutionStep::SetCompatibilityVariables);
        assert_eq!(ExecutionStep::CheckForWork.predecessor(), None);
        assert_eq!(ExecutionStep::Grow.successor(), None);
        assert_eq!(
            ExecutionStep::CalculateCoverages.successor(),
            Some(ExecutionStep::DeterminePolygonRankings)
        );
        assert_eq!(
            ExecutionStep::Grow.predecessor(),
            Some(ExecutionStep::SetCompatibilityVariables)
        );
    }

    #[test]
    fn test_combine_percentages_absent_pair_is_a_no_op() {
        let g = genera(&["B", "H", "MB"]);
        let mut p = vec![0.0, 20.0, 70.0, 10.0];
        combine_percentages(&g, ("PA", "PL"), &mut p);
        assert_eq!(p, vec![0.0, 20.0, 70.0, 10.0]);
    }

    #[test]
    fn test_combine_percentages_higher_absorbs_lower() {
        let g = genera(&["PA", "PL"]);
        let mut p = vec![0.0, 25.0, 75.0];
        combine_percentages(&g, ("PA", "PL"), &mut p);
        assert_eq!(p, vec![0.0, 0.0, 100.0]);
    }

    #[test]
    fn test_combine_percentages_tie_keeps_first_encountered() {
        let g = genera(&["C", "Y"]);
        let mut p = vec![0.0, 50.0, 50.0];
        combine_percentages(&g, ("C", "Y"), &mut p);
        assert_eq!(p, vec![0.0, 100.0, 0.0]);
    }

    #[test]
    fn test_combine_percentages_one_member_present() {
        let g = genera(&["PL", "F"]);
        let mut p = vec![0.0, 40.0, 60.0];
        combine_percentages(&g, ("PA", "PL"), &mut p);
        assert_eq!(p, vec![0.0, 40.0, 60.0]);
    }

    #[test]
    fn test_inventory_type_group_f_with_c() {
        assert_eq!(find_inventory_type_group("F", Some("C"), 50.0).unwrap(), 2);
    }

    #[test]
    fn test_inventory_type_group_pure_stands() {
        assert_eq!(find_inventory_type_group("H", None, 85.0).unwrap(), 12);
        assert_eq!(find_inventory_type_group("F", None, 85.0).unwrap(), 1);
    }

    #[test]
    fn test_inventory_type_group_secondary_branches() {
        assert_eq!(find_inventory_type_group("F", Some("S"), 60.0).unwrap(), 4);
        assert_eq!(find_inventory_type_group("F", None, 60.0).unwrap(), 8);
        assert_eq!(find_inventory_type_group("S", Some("AT"), 60.0).unwrap(), 26);
        assert_eq!(find_inventory_type_group("PL", Some("PA"), 60.0).unwrap(), 28);
        assert_eq!(find_inventory_type_group("PL", Some("AC"), 60.0).unwrap(), 31);
        assert_eq!(find_inventory_type_group("L", Some("F"), 60.0).unwrap(), 33);
        assert_eq!(find_inventory_type_group("PW", Some("F"), 60.0).unwrap(), 27);
    }

    #[test]
    fn test_inventory_type_group_rejects_unknown_primary() {
        assert!(find_inventory_type_group("ZZ", None, 60.0).is_err());
    }

    #[test]
    fn test_inventory_type_group_rejects_equal_genera() {
        assert!(find_inventory_type_group("F", Some("F"), 60.0).is_err());
    }

    #[test]
    fn test_convert_site_index_or_keep() {
        use crate::site::{CurveBank, CurveParams};
        let mut curves = CurveBank::new();
        let params = CurveParams {
            k: 0.025,
            p: 1.1,
            ytbh_a: 4.0,
            ytbh_b: 50.0,
        };
        curves.insert_curve(1, params);
        curves.insert_curve(2, params);
        curves.insert_conversion(1, 2, 1.0, 0.9);

        let converted = convert_site_index_or_keep(&curves, Some(1), 20.0, Some(2));
        assert_eq!(converted, Resolved::Found(19.0));

        // No conversion in the reverse direction: keep the input.
        let kept = convert_site_index_or_keep(&curves, Some(2), 20.0, Some(1));
        assert!(kept.is_defaulted());
        assert_eq!(kept.value(), 20.0);

        let unresolved = convert_site_index_or_keep(&curves, None, 20.0, Some(1));
        assert!(unresolved.is_defaulted());
    }

    #[test]
    fn test_compatibility_variable_zero_when_model_matches_actual() {
        // actual == static == base: both ratios are 1, both logits clamp to 7.
        assert_eq!(compatibility_variable(10.0, 10.0, 10.0), 0.0);
    }

    #[test]
    fn test_compatibility_variable_sign() {
        // Actual above the model estimate yields a positive offset.
        assert!(compatibility_variable(8.0, 10.0, 6.0) > 0.0);
        assert!(compatibility_variable(4.0, 10.0, 6.0) < 0.0);
    }

    #[test]
    fn test_compatibility_variable_clamped() {
        let cv = compatibility_variable(1.0e-9, 10.0, 10.0);
        assert_approx_eq!(cv, -14.0, 1e-3);
    }

    #[test]
    fn test_whole_stem_compatibility_variable_zero_and_floor() {
        assert_eq!(whole_stem_compatibility_variable(5.0, 10.0, 5.0), 0.0);
        // Non-positive actual ratio floors at -2.
        let cv = whole_stem_compatibility_variable(0.0, 10.0, 10.0);
        assert_approx_eq!(cv, -2.0 - 0.0f32, 1e-5);
    }
}
