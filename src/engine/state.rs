use crate::error::GrowthError;
use crate::model::{Bank, UtilizationVector};

/// Outcome of the ranking stage: which species lead the stand and which
/// equation groups follow from that.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesRanking {
    pub primary_species_index: usize,
    pub secondary_species_index: Option<usize>,
    pub inventory_type_group: i32,
    /// Basal-area equation group from the default/modifier tables.
    pub primary_species_group: i32,
    /// Alternate equation group from the fixed per-genus table.
    pub alternate_species_group: i32,
}

/// Resolved height, age and site values of the primary species.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimarySpeciesDetails {
    pub dominant_height: f32,
    pub site_index: f32,
    pub total_age: f32,
    pub years_at_breast_height: f32,
    pub years_to_breast_height: f32,
}

/// Small-component compatibility adjustments of one species.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmallCompatibility {
    pub basal_area: f32,
    pub quad_mean_diameter: f32,
    /// Log-ratio adjustment.
    pub lorey_height: f32,
    /// Log-ratio adjustment.
    pub whole_stem_volume: f32,
}

/// Compatibility variables of one species: the logit- or log-space offsets
/// that anchor grown estimates to the originally supplied stand data. Band
/// slots hold the adjustments; the All and Small slots stay zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeciesCompatibility {
    pub whole_stem_volume: UtilizationVector,
    pub close_utilization_volume: UtilizationVector,
    pub net_decay_volume: UtilizationVector,
    pub net_decay_waste_volume: UtilizationVector,
    pub basal_area: UtilizationVector,
    pub quad_mean_diameter: UtilizationVector,
    pub small: SmallCompatibility,
}

/// Working state of one polygon run: the bank plus everything the stages
/// derive from it. Created per polygon and discarded when the run ends.
#[derive(Debug, Clone)]
pub struct PolygonProcessingState {
    pub polygon_id: String,
    pub reference_year: i32,
    pub bank: Bank,
    pub(crate) ranking: Option<SpeciesRanking>,
    pub(crate) primary_details: Option<PrimarySpeciesDetails>,
    /// Indexed like the bank's species arrays; slot 0 is unused.
    pub(crate) compatibility: Option<Vec<SpeciesCompatibility>>,
}

impl PolygonProcessingState {
    pub fn new(polygon_id: impl Into<String>, reference_year: i32, bank: Bank) -> Self {
        Self {
            polygon_id: polygon_id.into(),
            reference_year,
            bank,
            ranking: None,
            primary_details: None,
            compatibility: None,
        }
    }

    pub fn ranking(&self) -> Result<&SpeciesRanking, GrowthError> {
        self.ranking
            .as_ref()
            .ok_or_else(|| GrowthError::processing("polygon rankings have not been determined"))
    }

    pub fn primary_details(&self) -> Result<&PrimarySpeciesDetails, GrowthError> {
        self.primary_details.as_ref().ok_or_else(|| {
            GrowthError::processing("dominant height / age / site index have not been resolved")
        })
    }

    pub fn compatibility(&self, species: usize) -> Result<&SpeciesCompatibility, GrowthError> {
        self.compatibility
            .as_ref()
            .and_then(|cv| cv.get(species))
            .ok_or_else(|| GrowthError::processing("compatibility variables have not been set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BecZone, PolygonDescriptor, Region, SpeciesInput};
    use crate::tables::demo::demo_control_data;

    fn make_state() -> PolygonProcessingState {
        let mut ba = UtilizationVector::new();
        ba.set_all(20.0);
        let mut tph = UtilizationVector::new();
        tph.set_all(600.0);
        let mut hl = UtilizationVector::new();
        hl.set_all(21.0);
        let poly = PolygonDescriptor {
            id: "S1".to_string(),
            year: 2015,
            bec: BecZone::new("IDF", Region::Interior),
            target_year: None,
            species: vec![SpeciesInput {
                genus: "F".to_string(),
                percent: 100.0,
                sub_genus: None,
                age_total: Some(80.0),
                years_to_breast_height: Some(9.0),
                site_index: Some(19.0),
                site_curve_number: Some(3),
                dominant_height: Some(25.0),
                basal_area: ba,
                trees_per_hectare: tph,
                lorey_height: hl,
                quad_mean_diameter: None,
                whole_stem_volume: UtilizationVector::new(),
                close_utilization_volume: UtilizationVector::new(),
                close_utilization_volume_net_decay: UtilizationVector::new(),
                close_utilization_volume_net_decay_waste: UtilizationVector::new(),
                close_utilization_volume_net_decay_waste_breakage: UtilizationVector::new(),
            }],
            veteran_basal_area: None,
        };
        let tables = demo_control_data();
        let bank = Bank::from_polygon(&poly, &tables).unwrap();
        PolygonProcessingState::new("S1", 2015, bank)
    }

    #[test]
    fn test_accessors_error_before_stages_run() {
        let state = make_state();
        assert!(state.ranking().is_err());
        assert!(state.primary_details().is_err());
        assert!(state.compatibility(1).is_err());
    }

    #[test]
    fn test_accessors_after_set() {
        let mut state = make_state();
        state.ranking = Some(SpeciesRanking {
            primary_species_index: 1,
            secondary_species_index: None,
            inventory_type_group: 1,
            primary_species_group: 5,
            alternate_species_group: 5,
        });
        state.primary_details = Some(PrimarySpeciesDetails {
            dominant_height: 25.0,
            site_index: 19.0,
            total_age: 80.0,
            years_at_breast_height: 71.0,
            years_to_breast_height: 9.0,
        });
        state.compatibility = Some(vec![
            SpeciesCompatibility::default(),
            SpeciesCompatibility::default(),
        ]);

        assert_eq!(state.ranking().unwrap().primary_species_index, 1);
        assert_eq!(state.primary_details().unwrap().total_age, 80.0);
        assert!(state.compatibility(1).is_ok());
    }
}
