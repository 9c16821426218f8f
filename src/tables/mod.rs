pub mod demo;

use std::collections::HashMap;

use crate::error::GrowthError;
use crate::model::{Coefficients, Region};
use crate::site::CurveId;

/// Fraction of full occupancy assumed by the empirical yield equations.
pub const EMPIRICAL_OCCUPANCY: f32 = 0.85;

/// Genus pairs whose percentages are merged before ranking.
pub const PRIMARY_SPECIES_TO_COMBINE: [(&str, &str); 2] = [("PL", "PA"), ("C", "Y")];

/// Hardwood genera, consulted by the inventory-type-group decision table.
pub const HARDWOODS: [&str; 5] = ["AC", "AT", "D", "E", "MB"];

/// Canonical genus ordering; a genus's 1-based position here is its species
/// index into [`DEFAULT_EQUATION_GROUPS`].
pub const GENUS_ORDER: [&str; 16] = [
    "AC", "AT", "B", "C", "D", "E", "F", "H", "L", "MB", "PA", "PL", "PW", "PY", "S", "Y",
];

/// Default (alternate) equation group by species index; slot 0 is a
/// placeholder.
pub const DEFAULT_EQUATION_GROUPS: [i32; 17] =
    [0, 1, 2, 3, 4, 1, 2, 5, 6, 7, 1, 9, 8, 9, 9, 10, 4];

/// Species indices whose alternate equation group shifts by 20 in the
/// interior region.
pub const EXCEPTED_SPECIES_INDICES: [usize; 5] = [3, 4, 5, 6, 10];

/// 1-based species index of a genus, if known.
pub fn species_index(genus: &str) -> Option<usize> {
    GENUS_ORDER.iter().position(|g| *g == genus).map(|i| i + 1)
}

/// Inventory type group of a pure stand (primary species above 79.999%).
pub fn itg_pure(genus: &str) -> Option<i32> {
    let itg = match genus {
        "F" => 1,
        "C" | "Y" => 9,
        "H" => 12,
        "B" => 18,
        "S" => 21,
        "PW" => 27,
        "PL" | "PA" => 28,
        "PY" => 32,
        "L" => 33,
        "AC" => 35,
        "D" => 37,
        "MB" => 39,
        "E" => 40,
        "AT" => 41,
        _ => return None,
    };
    Some(itg)
}

/// How far to grow a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowTarget {
    /// Grow to the per-polygon target year; an error if the polygon has none.
    FromPolygon,
    /// Grow this many years past the polygon's reference year.
    Relative(i32),
    /// Grow to this calendar year.
    Absolute(i32),
}

impl GrowTarget {
    /// Decode the conventional control-variable encoding: -1 reads the
    /// per-polygon target, values up to 400 are year counts, larger values
    /// are calendar years.
    pub fn from_control_value(value: i32) -> Self {
        if value == -1 {
            GrowTarget::FromPolygon
        } else if value <= 400 {
            GrowTarget::Relative(value)
        } else {
            GrowTarget::Absolute(value)
        }
    }
}

/// Run-time switches of the growth engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlVariables {
    pub grow_target: GrowTarget,
    /// Recompute coverages and dominant height / site index at the start of
    /// every simulated year after the first.
    pub update_during_growth: bool,
}

impl Default for ControlVariables {
    fn default() -> Self {
        Self {
            grow_target: GrowTarget::FromPolygon,
            update_during_growth: false,
        }
    }
}

/// Per-equation-group upper bounds on basal area and quadratic mean diameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpperBounds {
    pub basal_area: f32,
    pub quad_mean_diameter: f32,
}

/// Age ceiling parameters of one site curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteCurveAgeMaximum {
    pub age_maximum_coastal: f32,
    pub age_maximum_interior: f32,
    /// Half-life of the asymptotic extension past the age maximum; no
    /// extension when <= 0.
    pub t1: f32,
    /// Horizon beyond which the extension stops growing.
    pub t2: f32,
}

impl SiteCurveAgeMaximum {
    pub fn age_maximum(&self, region: Region) -> f32 {
        match region {
            Region::Coastal => self.age_maximum_coastal,
            Region::Interior => self.age_maximum_interior,
        }
    }
}

impl Default for SiteCurveAgeMaximum {
    fn default() -> Self {
        // Negative maxima disable the ceiling entirely.
        Self {
            age_maximum_coastal: -1.0,
            age_maximum_interior: -1.0,
            t1: 0.0,
            t2: 0.0,
        }
    }
}

/// Lorey-height coefficients of a non-primary species; `equation_index` 1
/// bases the estimate on the lead height, otherwise on the primary species
/// height.
#[derive(Debug, Clone, PartialEq)]
pub struct NonPrimaryHeightCoefficients {
    pub equation_index: i32,
    pub coe: Coefficients,
}

/// All coefficient lookup tables consumed by the engine, built once by the
/// (external) control-file parser and shared read-only across polygon runs.
///
/// Lookup misses surface as [`GrowthError::MissingCoefficient`]; nothing is
/// silently defaulted.
#[derive(Debug, Clone, Default)]
pub struct ControlData {
    /// (genus, region) -> site curve.
    pub site_curves: HashMap<(String, Region), CurveId>,
    /// (genus, BEC alias) -> default basal-area equation group.
    pub default_equation_groups: HashMap<(String, String), i32>,
    /// (default group, inventory type group) -> override group.
    pub equation_modifier_groups: HashMap<(i32, i32), i32>,
    /// (genus, BEC alias) -> volume equation group.
    pub volume_equation_groups: HashMap<(String, String), i32>,
    /// (genus, BEC alias) -> decay equation group.
    pub decay_equation_groups: HashMap<(String, String), i32>,
    /// (genus, BEC alias) -> breakage equation group.
    pub breakage_equation_groups: HashMap<(String, String), i32>,
    /// (genus, region) -> dominant-height multiplier coefficients, 1-based.
    pub primary_height_coefficients: HashMap<(String, Region), Coefficients>,
    /// (genus, region) -> initial lorey-height coefficients, 1-based.
    pub primary_height_initial_coefficients: HashMap<(String, Region), Coefficients>,
    /// (genus, primary genus, region) -> non-primary lorey-height coefficients.
    pub non_primary_height_coefficients:
        HashMap<(String, String, Region), NonPrimaryHeightCoefficients>,
    /// genus -> per-species quadratic-mean-diameter coefficients, 0-based.
    pub by_species_dq: HashMap<String, Coefficients>,
    /// (genus, region) -> component size limits, 1-based.
    pub component_size_limits: HashMap<(String, Region), Coefficients>,
    /// (class index, genus, growth BEC alias) -> basal-area decomposition
    /// coefficients, 1-based.
    pub util_comp_ba: HashMap<(i32, String, String), Coefficients>,
    /// (class index, genus, growth BEC alias) -> diameter decomposition
    /// coefficients, 1-based.
    pub util_comp_dq: HashMap<(i32, String, String), Coefficients>,
    /// volume group -> whole-stem volume-per-tree coefficients, 0-based.
    pub total_stand_whole_stem_volume: HashMap<i32, Coefficients>,
    /// (class index, volume group) -> whole-stem decomposition coefficients,
    /// 0-based.
    pub util_comp_ws_volume: HashMap<(i32, i32), Coefficients>,
    /// (class index, volume group) -> close-utilization coefficients, 1-based.
    pub close_utilization_volume: HashMap<(i32, i32), Coefficients>,
    /// (class index, decay group) -> net-decay coefficients, 1-based.
    pub volume_net_decay: HashMap<(i32, i32), Coefficients>,
    /// (genus, region) -> decay modifier.
    pub decay_modifiers: HashMap<(String, Region), f32>,
    /// genus -> decay-and-waste coefficients, 0-based.
    pub volume_net_decay_waste: HashMap<String, Coefficients>,
    /// (genus, region) -> waste modifier.
    pub waste_modifiers: HashMap<(String, Region), f32>,
    /// breakage group -> breakage coefficients, 1-based.
    pub breakage: HashMap<i32, Coefficients>,
    /// genus -> small-component probability coefficients, 1-based.
    pub small_component_probability: HashMap<String, Coefficients>,
    /// genus -> small-component conditional basal area coefficients, 1-based.
    pub small_component_basal_area: HashMap<String, Coefficients>,
    /// genus -> small-component quadratic-mean-diameter coefficients, 1-based.
    pub small_component_quad_mean_diameter: HashMap<String, Coefficients>,
    /// genus -> small-component lorey-height coefficients, 1-based.
    pub small_component_lorey_height: HashMap<String, Coefficients>,
    /// genus -> small-component whole-stem volume coefficients, 1-based.
    pub small_component_whole_stem_volume: HashMap<String, Coefficients>,
    /// equation group -> basal area / diameter upper bounds.
    pub upper_bounds: HashMap<i32, UpperBounds>,
    /// (growth BEC alias, equation group) -> basal-area yield coefficients,
    /// 0-based.
    pub basal_area_yield: HashMap<(String, i32), Coefficients>,
    /// site curve -> age ceiling parameters.
    pub age_maximums: HashMap<CurveId, SiteCurveAgeMaximum>,
}

fn miss(what: impl Into<String>) -> GrowthError {
    GrowthError::MissingCoefficient(what.into())
}

impl ControlData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn site_curve(&self, genus: &str, region: Region) -> Option<CurveId> {
        self.site_curves.get(&(genus.to_string(), region)).copied()
    }

    pub fn default_equation_group(&self, genus: &str, bec_alias: &str) -> Result<i32, GrowthError> {
        self.default_equation_groups
            .get(&(genus.to_string(), bec_alias.to_string()))
            .copied()
            .ok_or_else(|| miss(format!("default equation group for ({genus}, {bec_alias})")))
    }

    pub fn equation_modifier(&self, group: i32, itg: i32) -> Option<i32> {
        self.equation_modifier_groups.get(&(group, itg)).copied()
    }

    pub fn volume_group(&self, genus: &str, bec_alias: &str) -> Result<i32, GrowthError> {
        self.volume_equation_groups
            .get(&(genus.to_string(), bec_alias.to_string()))
            .copied()
            .ok_or_else(|| miss(format!("volume equation group for ({genus}, {bec_alias})")))
    }

    pub fn decay_group(&self, genus: &str, bec_alias: &str) -> Result<i32, GrowthError> {
        self.decay_equation_groups
            .get(&(genus.to_string(), bec_alias.to_string()))
            .copied()
            .ok_or_else(|| miss(format!("decay equation group for ({genus}, {bec_alias})")))
    }

    pub fn breakage_group(&self, genus: &str, bec_alias: &str) -> Result<i32, GrowthError> {
        self.breakage_equation_groups
            .get(&(genus.to_string(), bec_alias.to_string()))
            .copied()
            .ok_or_else(|| miss(format!("breakage equation group for ({genus}, {bec_alias})")))
    }

    pub fn primary_height_coe(&self, genus: &str, region: Region) -> Result<&Coefficients, GrowthError> {
        self.primary_height_coefficients
            .get(&(genus.to_string(), region))
            .ok_or_else(|| miss(format!("primary height coefficients for ({genus}, {region})")))
    }

    pub fn primary_height_initial_coe(
        &self,
        genus: &str,
        region: Region,
    ) -> Result<&Coefficients, GrowthError> {
        self.primary_height_initial_coefficients
            .get(&(genus.to_string(), region))
            .ok_or_else(|| {
                miss(format!(
                    "initial primary height coefficients for ({genus}, {region})"
                ))
            })
    }

    pub fn non_primary_height_coe(
        &self,
        genus: &str,
        primary_genus: &str,
        region: Region,
    ) -> Result<&NonPrimaryHeightCoefficients, GrowthError> {
        self.non_primary_height_coefficients
            .get(&(genus.to_string(), primary_genus.to_string(), region))
            .ok_or_else(|| {
                miss(format!(
                    "non-primary lorey height coefficients for ({genus}, {primary_genus}, {region})"
                ))
            })
    }

    pub fn by_species_dq_coe(&self, genus: &str) -> Result<&Coefficients, GrowthError> {
        self.by_species_dq
            .get(genus)
            .ok_or_else(|| miss(format!("by-species DQ coefficients for {genus}")))
    }

    pub fn size_limits_coe(&self, genus: &str, region: Region) -> Result<&Coefficients, GrowthError> {
        self.component_size_limits
            .get(&(genus.to_string(), region))
            .ok_or_else(|| miss(format!("component size limits for ({genus}, {region})")))
    }

    pub fn util_comp_ba_coe(
        &self,
        class_index: i32,
        genus: &str,
        growth_bec: &str,
    ) -> Result<&Coefficients, GrowthError> {
        self.util_comp_ba
            .get(&(class_index, genus.to_string(), growth_bec.to_string()))
            .ok_or_else(|| {
                miss(format!(
                    "utilization basal-area coefficients for ({class_index}, {genus}, {growth_bec})"
                ))
            })
    }

    pub fn util_comp_dq_coe(
        &self,
        class_index: i32,
        genus: &str,
        growth_bec: &str,
    ) -> Result<&Coefficients, GrowthError> {
        self.util_comp_dq
            .get(&(class_index, genus.to_string(), growth_bec.to_string()))
            .ok_or_else(|| {
                miss(format!(
                    "utilization diameter coefficients for ({class_index}, {genus}, {growth_bec})"
                ))
            })
    }

    pub fn total_stand_ws_volume_coe(&self, volume_group: i32) -> Result<&Coefficients, GrowthError> {
        self.total_stand_whole_stem_volume
            .get(&volume_group)
            .ok_or_else(|| miss(format!("whole-stem volume coefficients for group {volume_group}")))
    }

    pub fn util_comp_ws_volume_coe(
        &self,
        class_index: i32,
        volume_group: i32,
    ) -> Result<&Coefficients, GrowthError> {
        self.util_comp_ws_volume
            .get(&(class_index, volume_group))
            .ok_or_else(|| {
                miss(format!(
                    "whole-stem utilization coefficients for ({class_index}, group {volume_group})"
                ))
            })
    }

    pub fn close_utilization_coe(
        &self,
        class_index: i32,
        volume_group: i32,
    ) -> Result<&Coefficients, GrowthError> {
        self.close_utilization_volume
            .get(&(class_index, volume_group))
            .ok_or_else(|| {
                miss(format!(
                    "close-utilization coefficients for ({class_index}, group {volume_group})"
                ))
            })
    }

    pub fn net_decay_coe(&self, class_index: i32, decay_group: i32) -> Result<&Coefficients, GrowthError> {
        self.volume_net_decay
            .get(&(class_index, decay_group))
            .ok_or_else(|| {
                miss(format!(
                    "net decay coefficients for ({class_index}, group {decay_group})"
                ))
            })
    }

    pub fn decay_modifier(&self, genus: &str, region: Region) -> Result<f32, GrowthError> {
        self.decay_modifiers
            .get(&(genus.to_string(), region))
            .copied()
            .ok_or_else(|| miss(format!("decay modifier for ({genus}, {region})")))
    }

    pub fn net_decay_waste_coe(&self, genus: &str) -> Result<&Coefficients, GrowthError> {
        self.volume_net_decay_waste
            .get(genus)
            .ok_or_else(|| miss(format!("net waste coefficients for genus {genus}")))
    }

    pub fn waste_modifier(&self, genus: &str, region: Region) -> Result<f32, GrowthError> {
        self.waste_modifiers
            .get(&(genus.to_string(), region))
            .copied()
            .ok_or_else(|| miss(format!("waste modifier for ({genus}, {region})")))
    }

    pub fn breakage_coe(&self, breakage_group: i32) -> Result<&Coefficients, GrowthError> {
        self.breakage
            .get(&breakage_group)
            .ok_or_else(|| miss(format!("net breakage coefficients for group {breakage_group}")))
    }

    pub fn small_probability_coe(&self, genus: &str) -> Result<&Coefficients, GrowthError> {
        self.small_component_probability
            .get(genus)
            .ok_or_else(|| miss(format!("small component probability coefficients for {genus}")))
    }

    pub fn small_basal_area_coe(&self, genus: &str) -> Result<&Coefficients, GrowthError> {
        self.small_component_basal_area
            .get(genus)
            .ok_or_else(|| miss(format!("small component basal area coefficients for {genus}")))
    }

    pub fn small_dq_coe(&self, genus: &str) -> Result<&Coefficients, GrowthError> {
        self.small_component_quad_mean_diameter
            .get(genus)
            .ok_or_else(|| miss(format!("small component diameter coefficients for {genus}")))
    }

    pub fn small_lorey_height_coe(&self, genus: &str) -> Result<&Coefficients, GrowthError> {
        self.small_component_lorey_height
            .get(genus)
            .ok_or_else(|| miss(format!("small component lorey height coefficients for {genus}")))
    }

    pub fn small_ws_volume_coe(&self, genus: &str) -> Result<&Coefficients, GrowthError> {
        self.small_component_whole_stem_volume
            .get(genus)
            .ok_or_else(|| miss(format!("small component volume coefficients for {genus}")))
    }

    pub fn upper_bounds_for(&self, equation_group: i32) -> Result<UpperBounds, GrowthError> {
        self.upper_bounds
            .get(&equation_group)
            .copied()
            .ok_or_else(|| miss(format!("upper bounds for equation group {equation_group}")))
    }

    pub fn basal_area_yield_coe(
        &self,
        growth_bec: &str,
        equation_group: i32,
    ) -> Result<&Coefficients, GrowthError> {
        self.basal_area_yield
            .get(&(growth_bec.to_string(), equation_group))
            .ok_or_else(|| {
                miss(format!(
                    "basal area yield coefficients for ({growth_bec}, group {equation_group})"
                ))
            })
    }

    /// Age ceiling parameters for a curve; curves without an entry have no
    /// ceiling.
    pub fn age_maximum(&self, curve: CurveId) -> SiteCurveAgeMaximum {
        self.age_maximums
            .get(&curve)
            .copied()
            .unwrap_or_default()
    }
}
