use crate::error::GrowthError;
use crate::estimation::reconcile::quad_mean_diameter;
use crate::tables::ControlData;

use super::{BecZone, PolygonDescriptor, UtilizationClass, UtilizationVector};

/// Missing-value sentinel for the bank's float fields.
pub const MISSING: f32 = f32::NAN;

/// True when the value is the missing sentinel.
pub fn is_missing(value: f32) -> bool {
    value.is_nan()
}

/// Per-species numeric state of one polygon layer for one time step.
///
/// Every species-indexed array reserves index 0 for the stand total; indices
/// 1..=n are the individual species in input order. The growth loop never
/// mutates a bank in place across a year boundary: `grow_year` reads one bank
/// and produces a fresh one.
#[derive(Debug, Clone)]
pub struct Bank {
    pub bec: BecZone,

    pub genera: Vec<String>,
    pub sub_genera: Vec<Option<String>>,
    /// Percent of forested land, 0-100.
    pub percentages: Vec<f32>,
    /// `percentages / 100`.
    pub fractions: Vec<f32>,

    pub age_totals: Vec<f32>,
    pub years_to_breast_height: Vec<f32>,
    pub years_at_breast_height: Vec<f32>,
    pub site_indices: Vec<f32>,
    pub site_curve_numbers: Vec<Option<i32>>,
    pub dominant_heights: Vec<f32>,

    pub volume_groups: Vec<i32>,
    pub decay_groups: Vec<i32>,
    pub breakage_groups: Vec<i32>,

    pub basal_areas: Vec<UtilizationVector>,
    pub trees_per_hectare: Vec<UtilizationVector>,
    pub quad_mean_diameters: Vec<UtilizationVector>,
    pub lorey_heights: Vec<UtilizationVector>,
    pub whole_stem_volumes: Vec<UtilizationVector>,
    pub close_utilization_volumes: Vec<UtilizationVector>,
    pub cu_volumes_net_decay: Vec<UtilizationVector>,
    pub cu_volumes_net_decay_waste: Vec<UtilizationVector>,
    pub cu_volumes_net_decay_waste_breakage: Vec<UtilizationVector>,

    pub veteran_basal_area: Option<f32>,
}

impl Bank {
    /// Populate a bank from a polygon descriptor, resolving each species'
    /// volume, decay and breakage equation groups from the control data.
    pub fn from_polygon(polygon: &PolygonDescriptor, tables: &ControlData) -> Result<Self, GrowthError> {
        polygon.validate()?;

        let n = polygon.species.len();
        let mut bank = Bank {
            bec: polygon.bec.clone(),
            genera: vec![String::new(); n + 1],
            sub_genera: vec![None; n + 1],
            percentages: vec![MISSING; n + 1],
            fractions: vec![MISSING; n + 1],
            age_totals: vec![MISSING; n + 1],
            years_to_breast_height: vec![MISSING; n + 1],
            years_at_breast_height: vec![MISSING; n + 1],
            site_indices: vec![MISSING; n + 1],
            site_curve_numbers: vec![None; n + 1],
            dominant_heights: vec![MISSING; n + 1],
            volume_groups: vec![0; n + 1],
            decay_groups: vec![0; n + 1],
            breakage_groups: vec![0; n + 1],
            basal_areas: vec![UtilizationVector::new(); n + 1],
            trees_per_hectare: vec![UtilizationVector::new(); n + 1],
            quad_mean_diameters: vec![UtilizationVector::new(); n + 1],
            lorey_heights: vec![UtilizationVector::new(); n + 1],
            whole_stem_volumes: vec![UtilizationVector::new(); n + 1],
            close_utilization_volumes: vec![UtilizationVector::new(); n + 1],
            cu_volumes_net_decay: vec![UtilizationVector::new(); n + 1],
            cu_volumes_net_decay_waste: vec![UtilizationVector::new(); n + 1],
            cu_volumes_net_decay_waste_breakage: vec![UtilizationVector::new(); n + 1],
            veteran_basal_area: polygon.veteran_basal_area,
        };

        bank.percentages[0] = 100.0;
        bank.fractions[0] = 1.0;

        for (i, sp) in polygon.species.iter().enumerate() {
            let s = i + 1;
            bank.genera[s] = sp.genus.clone();
            bank.sub_genera[s] = sp.sub_genus.clone();
            bank.percentages[s] = sp.percent;
            bank.fractions[s] = sp.percent / 100.0;
            bank.age_totals[s] = sp.age_total.unwrap_or(MISSING);
            bank.years_to_breast_height[s] = sp.years_to_breast_height.unwrap_or(MISSING);
            bank.years_at_breast_height[s] =
                match (sp.age_total, sp.years_to_breast_height) {
                    (Some(total), Some(ytbh)) => total - ytbh,
                    _ => MISSING,
                };
            bank.site_indices[s] = sp.site_index.unwrap_or(MISSING);
            bank.site_curve_numbers[s] = sp.site_curve_number;
            bank.dominant_heights[s] = sp.dominant_height.unwrap_or(MISSING);

            bank.volume_groups[s] = tables.volume_group(&sp.genus, &polygon.bec.alias)?;
            bank.decay_groups[s] = tables.decay_group(&sp.genus, &polygon.bec.alias)?;
            bank.breakage_groups[s] = tables.breakage_group(&sp.genus, &polygon.bec.alias)?;

            bank.basal_areas[s] = sp.basal_area;
            bank.trees_per_hectare[s] = sp.trees_per_hectare;
            bank.lorey_heights[s] = sp.lorey_height;
            bank.quad_mean_diameters[s] = match sp.quad_mean_diameter {
                Some(dq) => dq,
                None => derive_quad_mean_diameters(&sp.basal_area, &sp.trees_per_hectare),
            };
            bank.whole_stem_volumes[s] = sp.whole_stem_volume;
            bank.close_utilization_volumes[s] = sp.close_utilization_volume;
            bank.cu_volumes_net_decay[s] = sp.close_utilization_volume_net_decay;
            bank.cu_volumes_net_decay_waste[s] = sp.close_utilization_volume_net_decay_waste;
            bank.cu_volumes_net_decay_waste_breakage[s] =
                sp.close_utilization_volume_net_decay_waste_breakage;
        }

        bank.refresh_stand_totals();
        Ok(bank)
    }

    pub fn n_species(&self) -> usize {
        self.genera.len() - 1
    }

    /// Indices of the individual species (1..=n).
    pub fn indices(&self) -> std::ops::RangeInclusive<usize> {
        1..=self.n_species()
    }

    /// Recompute the stand-total row (index 0) from the species rows: sums for
    /// area, density and volumes; basal-area-weighted means for lorey height;
    /// quadratic mean diameter from the identity.
    pub fn refresh_stand_totals(&mut self) {
        let classes = [
            UtilizationClass::Small,
            UtilizationClass::All,
            UtilizationClass::U75To125,
            UtilizationClass::U125To175,
            UtilizationClass::U175To225,
            UtilizationClass::Over225,
        ];

        for uc in classes {
            let mut ba_sum = 0.0;
            let mut tph_sum = 0.0;
            let mut hl_weighted = 0.0;
            let mut ws = 0.0;
            let mut cu = 0.0;
            let mut nd = 0.0;
            let mut ndw = 0.0;
            let mut ndwb = 0.0;

            for s in 1..=self.n_species() {
                let ba = self.basal_areas[s].get(uc);
                ba_sum += ba;
                tph_sum += self.trees_per_hectare[s].get(uc);
                let hl = self.lorey_heights[s].get(uc);
                if ba > 0.0 && !is_missing(hl) {
                    hl_weighted += ba * hl;
                }
                ws += self.whole_stem_volumes[s].get(uc);
                cu += self.close_utilization_volumes[s].get(uc);
                nd += self.cu_volumes_net_decay[s].get(uc);
                ndw += self.cu_volumes_net_decay_waste[s].get(uc);
                ndwb += self.cu_volumes_net_decay_waste_breakage[s].get(uc);
            }

            self.basal_areas[0].set(uc, ba_sum);
            self.trees_per_hectare[0].set(uc, tph_sum);
            self.quad_mean_diameters[0].set(uc, quad_mean_diameter(ba_sum, tph_sum));
            self.lorey_heights[0].set(
                uc,
                if ba_sum > 0.0 { hl_weighted / ba_sum } else { MISSING },
            );
            self.whole_stem_volumes[0].set(uc, ws);
            self.close_utilization_volumes[0].set(uc, cu);
            self.cu_volumes_net_decay[0].set(uc, nd);
            self.cu_volumes_net_decay_waste[0].set(uc, ndw);
            self.cu_volumes_net_decay_waste_breakage[0].set(uc, ndwb);
        }
    }
}

fn derive_quad_mean_diameters(
    basal_area: &UtilizationVector,
    trees_per_hectare: &UtilizationVector,
) -> UtilizationVector {
    let mut dq = UtilizationVector::new();
    for uc in [
        UtilizationClass::Small,
        UtilizationClass::All,
        UtilizationClass::U75To125,
        UtilizationClass::U125To175,
        UtilizationClass::U175To225,
        UtilizationClass::Over225,
    ] {
        dq.set(
            uc,
            quad_mean_diameter(basal_area.get(uc), trees_per_hectare.get(uc)),
        );
    }
    dq
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Region, SpeciesInput};
    use crate::tables::demo::demo_control_data;
    use assert_approx_eq::assert_approx_eq;

    fn make_species(genus: &str, percent: f32, ba_all: f32, tph_all: f32) -> SpeciesInput {
        let mut ba = UtilizationVector::new();
        ba.set_all(ba_all);
        let mut tph = UtilizationVector::new();
        tph.set_all(tph_all);
        let mut hl = UtilizationVector::new();
        hl.set_all(22.0);
        SpeciesInput {
            genus: genus.to_string(),
            percent,
            sub_genus: None,
            age_total: Some(70.0),
            years_to_breast_height: Some(9.0),
            site_index: Some(17.0),
            site_curve_number: Some(3),
            dominant_height: Some(24.0),
            basal_area: ba,
            trees_per_hectare: tph,
            lorey_height: hl,
            quad_mean_diameter: None,
            whole_stem_volume: UtilizationVector::new(),
            close_utilization_volume: UtilizationVector::new(),
            close_utilization_volume_net_decay: UtilizationVector::new(),
            close_utilization_volume_net_decay_waste: UtilizationVector::new(),
            close_utilization_volume_net_decay_waste_breakage: UtilizationVector::new(),
        }
    }

    fn make_polygon() -> PolygonDescriptor {
        PolygonDescriptor {
            id: "B1".to_string(),
            year: 2000,
            bec: BecZone::new("IDF", Region::Interior),
            target_year: None,
            species: vec![
                make_species("F", 70.0, 21.0, 700.0),
                make_species("PL", 30.0, 9.0, 450.0),
            ],
            veteran_basal_area: None,
        }
    }

    #[test]
    fn test_from_polygon_species_rows() {
        let tables = demo_control_data();
        let bank = Bank::from_polygon(&make_polygon(), &tables).unwrap();
        assert_eq!(bank.n_species(), 2);
        assert_eq!(bank.genera[1], "F");
        assert_eq!(bank.genera[2], "PL");
        assert_approx_eq!(bank.fractions[1], 0.7, 1e-6);
    }

    #[test]
    fn test_from_polygon_stand_totals() {
        let tables = demo_control_data();
        let bank = Bank::from_polygon(&make_polygon(), &tables).unwrap();
        assert_approx_eq!(bank.basal_areas[0].all(), 30.0, 1e-4);
        assert_approx_eq!(bank.trees_per_hectare[0].all(), 1150.0, 1e-3);
        // Stand lorey height is BA-weighted; both species are 22.0 here.
        assert_approx_eq!(bank.lorey_heights[0].all(), 22.0, 1e-4);
    }

    #[test]
    fn test_from_polygon_years_at_breast_height() {
        let tables = demo_control_data();
        let bank = Bank::from_polygon(&make_polygon(), &tables).unwrap();
        assert_approx_eq!(bank.years_at_breast_height[1], 61.0, 1e-4);
    }

    #[test]
    fn test_from_polygon_derives_quad_mean_diameter() {
        let tables = demo_control_data();
        let bank = Bank::from_polygon(&make_polygon(), &tables).unwrap();
        let dq = bank.quad_mean_diameters[1].all();
        // BA = PI/40000 * DQ^2 * TPH
        let ba = std::f32::consts::PI / 40_000.0 * dq * dq * 700.0;
        assert_approx_eq!(ba, 21.0, 1e-3);
    }

    #[test]
    fn test_from_polygon_missing_age_is_nan() {
        let tables = demo_control_data();
        let mut poly = make_polygon();
        poly.species[1].age_total = None;
        let bank = Bank::from_polygon(&poly, &tables).unwrap();
        assert!(is_missing(bank.age_totals[2]));
        assert!(is_missing(bank.years_at_breast_height[2]));
    }

    #[test]
    fn test_from_polygon_rejects_bad_percent_sum() {
        let tables = demo_control_data();
        let mut poly = make_polygon();
        poly.species[0].percent = 50.0;
        assert!(Bank::from_polygon(&poly, &tables).is_err());
    }

    #[test]
    fn test_from_polygon_unknown_genus_is_missing_coefficient() {
        let tables = demo_control_data();
        let mut poly = make_polygon();
        poly.species[0].genus = "ZZ".to_string();
        let err = Bank::from_polygon(&poly, &tables).unwrap_err();
        assert!(matches!(err, GrowthError::MissingCoefficient(_)));
    }

    #[test]
    fn test_indices_range() {
        let tables = demo_control_data();
        let bank = Bank::from_polygon(&make_polygon(), &tables).unwrap();
        let idx: Vec<usize> = bank.indices().collect();
        assert_eq!(idx, vec![1, 2]);
    }
}
