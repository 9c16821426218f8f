use serde::{Deserialize, Serialize};

use crate::error::GrowthError;

use super::UtilizationVector;

/// Geographic region of a biogeoclimatic zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Coastal,
    Interior,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Coastal => write!(f, "Coastal"),
            Region::Interior => write!(f, "Interior"),
        }
    }
}

impl std::str::FromStr for Region {
    type Err = GrowthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "coastal" | "c" => Ok(Region::Coastal),
            "interior" | "i" => Ok(Region::Interior),
            _ => Err(GrowthError::StandValidation(format!(
                "Unknown region: '{s}'"
            ))),
        }
    }
}

/// Biogeoclimatic zone of a polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BecZone {
    /// Zone alias, e.g. "IDF" or "CWH".
    pub alias: String,
    pub region: Region,
    /// Alias of the zone whose growth coefficients apply, when different.
    #[serde(default)]
    pub growth_alias: Option<String>,
}

impl BecZone {
    pub fn new(alias: impl Into<String>, region: Region) -> Self {
        Self {
            alias: alias.into(),
            region,
            growth_alias: None,
        }
    }

    /// The zone alias used to look up growth coefficients.
    pub fn growth_alias(&self) -> &str {
        self.growth_alias.as_deref().unwrap_or(&self.alias)
    }
}

/// One species row of a polygon layer, as supplied by input parsing.
///
/// Site attributes are optional; missing values are estimated by the pipeline.
/// Utilization vectors not supplied default to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesInput {
    /// Genus code, e.g. "PL".
    pub genus: String,
    /// Percent of stand, 0-100.
    pub percent: f32,
    /// Genus of the first entry of the species distribution, when finer than
    /// the genus itself; used first when looking up a site curve.
    #[serde(default)]
    pub sub_genus: Option<String>,
    #[serde(default)]
    pub age_total: Option<f32>,
    #[serde(default)]
    pub years_to_breast_height: Option<f32>,
    #[serde(default)]
    pub site_index: Option<f32>,
    #[serde(default)]
    pub site_curve_number: Option<i32>,
    #[serde(default)]
    pub dominant_height: Option<f32>,
    pub basal_area: UtilizationVector,
    pub trees_per_hectare: UtilizationVector,
    pub lorey_height: UtilizationVector,
    #[serde(default)]
    pub quad_mean_diameter: Option<UtilizationVector>,
    #[serde(default)]
    pub whole_stem_volume: UtilizationVector,
    #[serde(default)]
    pub close_utilization_volume: UtilizationVector,
    #[serde(default)]
    pub close_utilization_volume_net_decay: UtilizationVector,
    #[serde(default)]
    pub close_utilization_volume_net_decay_waste: UtilizationVector,
    #[serde(default)]
    pub close_utilization_volume_net_decay_waste_breakage: UtilizationVector,
}

/// One polygon's primary-layer input, as supplied by input parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonDescriptor {
    pub id: String,
    /// Reference (measurement) year of the inventory.
    pub year: i32,
    pub bec: BecZone,
    /// Per-polygon grow-to year override.
    #[serde(default)]
    pub target_year: Option<i32>,
    pub species: Vec<SpeciesInput>,
    /// Basal area of a veteran layer above the primary layer, if any.
    #[serde(default)]
    pub veteran_basal_area: Option<f32>,
}

impl PolygonDescriptor {
    /// Validate that the polygon is structurally fit for processing.
    pub fn validate(&self) -> Result<(), GrowthError> {
        if self.year < 1900 {
            return Err(GrowthError::StandValidation(format!(
                "Polygon {}: year {} is < 1900",
                self.id, self.year
            )));
        }
        if self.species.is_empty() {
            return Err(GrowthError::StandValidation(format!(
                "Polygon {}: no species supplied",
                self.id
            )));
        }
        for sp in &self.species {
            if !(0.0..=100.0).contains(&sp.percent) {
                return Err(GrowthError::StandValidation(format!(
                    "Polygon {}: species {} percent {} out of range 0..=100",
                    self.id, sp.genus, sp.percent
                )));
            }
        }
        let percent_sum: f32 = self.species.iter().map(|s| s.percent).sum();
        if (percent_sum - 100.0).abs() > 0.01 {
            return Err(GrowthError::StandValidation(format!(
                "Polygon {}: species percentages sum to {percent_sum}, expected 100",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_species(genus: &str, percent: f32) -> SpeciesInput {
        let mut ba = UtilizationVector::new();
        ba.set_all(10.0);
        let mut tph = UtilizationVector::new();
        tph.set_all(500.0);
        let mut hl = UtilizationVector::new();
        hl.set_all(20.0);
        SpeciesInput {
            genus: genus.to_string(),
            percent,
            sub_genus: None,
            age_total: Some(60.0),
            years_to_breast_height: Some(8.0),
            site_index: Some(18.0),
            site_curve_number: Some(12),
            dominant_height: None,
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

    fn make_polygon(species: Vec<SpeciesInput>) -> PolygonDescriptor {
        PolygonDescriptor {
            id: "TEST 01".to_string(),
            year: 2010,
            bec: BecZone::new("IDF", Region::Interior),
            target_year: None,
            species,
            veteran_basal_area: None,
        }
    }

    #[test]
    fn test_region_parse() {
        assert_eq!("coastal".parse::<Region>().unwrap(), Region::Coastal);
        assert_eq!("I".parse::<Region>().unwrap(), Region::Interior);
        assert!("north".parse::<Region>().is_err());
    }

    #[test]
    fn test_bec_growth_alias_defaults_to_alias() {
        let bec = BecZone::new("IDF", Region::Interior);
        assert_eq!(bec.growth_alias(), "IDF");
    }

    #[test]
    fn test_bec_growth_alias_override() {
        let mut bec = BecZone::new("BWBS", Region::Interior);
        bec.growth_alias = Some("SBS".to_string());
        assert_eq!(bec.growth_alias(), "SBS");
    }

    #[test]
    fn test_validate_ok() {
        let poly = make_polygon(vec![make_species("F", 60.0), make_species("PL", 40.0)]);
        assert!(poly.validate().is_ok());
    }

    #[test]
    fn test_validate_year_too_old() {
        let mut poly = make_polygon(vec![make_species("F", 100.0)]);
        poly.year = 1890;
        let err = poly.validate().unwrap_err();
        assert!(err.to_string().contains("1890"));
    }

    #[test]
    fn test_validate_no_species() {
        let poly = make_polygon(vec![]);
        assert!(poly.validate().is_err());
    }

    #[test]
    fn test_validate_percent_sum() {
        let poly = make_polygon(vec![make_species("F", 60.0), make_species("PL", 30.0)]);
        let err = poly.validate().unwrap_err();
        assert!(matches!(err, GrowthError::StandValidation(_)));
    }

    #[test]
    fn test_validate_percent_sum_within_tolerance() {
        let poly = make_polygon(vec![make_species("F", 60.005), make_species("PL", 40.0)]);
        assert!(poly.validate().is_ok());
    }

    #[test]
    fn test_validate_percent_out_of_range() {
        let poly = make_polygon(vec![make_species("F", 120.0), make_species("PL", -20.0)]);
        assert!(poly.validate().is_err());
    }

    #[test]
    fn test_descriptor_json_roundtrip() {
        let poly = make_polygon(vec![make_species("F", 100.0)]);
        let json = serde_json::to_string(&poly).unwrap();
        let back: PolygonDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, poly.id);
        assert_eq!(back.species.len(), 1);
        assert_eq!(back.species[0].genus, "F");
    }
}
