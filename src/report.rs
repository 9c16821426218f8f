use colored::Colorize;
use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, ContentArrangement, Table,
};
use serde::Serialize;

use crate::model::{Bank, UtilizationClass};

/// Stand-level totals of one simulated year, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct YearSummary {
    pub year: i32,
    pub basal_area: f32,
    pub trees_per_hectare: f32,
    pub quad_mean_diameter: f32,
    pub lorey_height: f32,
    pub whole_stem_volume: f32,
    pub close_utilization_volume: f32,
    pub net_volume: f32,
}

impl YearSummary {
    /// Stand totals (species row 0, All class) of the given bank.
    pub fn from_bank(year: i32, bank: &Bank) -> Self {
        Self {
            year,
            basal_area: bank.basal_areas[0].all(),
            trees_per_hectare: bank.trees_per_hectare[0].all(),
            quad_mean_diameter: bank.quad_mean_diameters[0].all(),
            lorey_height: bank.lorey_heights[0].all(),
            whole_stem_volume: bank.whole_stem_volumes[0].all(),
            close_utilization_volume: bank.close_utilization_volumes[0].all(),
            net_volume: bank.cu_volumes_net_decay_waste_breakage[0].all(),
        }
    }
}

/// Format the per-year projection as a table.
pub fn format_projection_table(rows: &[YearSummary]) -> String {
    let mut output = String::new();
    output.push_str(&format!("\n{}\n", "Growth Projection".bold().green()));
    output.push_str(&format!("{}\n", "=".repeat(50)));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Year",
            "BA (m²/ha)",
            "Stems/ha",
            "DQ (cm)",
            "HL (m)",
            "WS Vol (m³/ha)",
            "CU Vol (m³/ha)",
            "Net Vol (m³/ha)",
        ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(row.year),
            Cell::new(format!("{:.1}", row.basal_area)),
            Cell::new(format!("{:.0}", row.trees_per_hectare)),
            Cell::new(format!("{:.1}", row.quad_mean_diameter)),
            Cell::new(format!("{:.1}", row.lorey_height)),
            Cell::new(format!("{:.1}", row.whole_stem_volume)),
            Cell::new(format!("{:.1}", row.close_utilization_volume)),
            Cell::new(format!("{:.1}", row.net_volume)),
        ]);
    }

    output.push_str(&format!("{table}"));
    output
}

pub fn print_projection_table(rows: &[YearSummary]) {
    println!("{}", format_projection_table(rows));
}

/// Format the per-species composition of a bank.
pub fn format_species_table(bank: &Bank) -> String {
    let mut output = String::new();
    output.push_str(&format!("\n{}\n", "Species Composition".bold().green()));
    output.push_str(&format!("{}\n", "=".repeat(50)));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Species",
            "Percent",
            "BA (m²/ha)",
            "Stems/ha",
            "DQ (cm)",
            "HL (m)",
            "Site Index",
        ]);

    for s in bank.indices() {
        table.add_row(vec![
            Cell::new(&bank.genera[s]),
            Cell::new(format!("{:.1}", bank.percentages[s])),
            Cell::new(format!("{:.1}", bank.basal_areas[s].all())),
            Cell::new(format!("{:.0}", bank.trees_per_hectare[s].all())),
            Cell::new(format!("{:.1}", bank.quad_mean_diameters[s].all())),
            Cell::new(format!("{:.1}", bank.lorey_heights[s].all())),
            Cell::new(format!("{:.1}", bank.site_indices[s])),
        ]);
    }

    output.push_str(&format!("{table}"));
    output
}

pub fn print_species_table(bank: &Bank) {
    println!("{}", format_species_table(bank));
}

/// Format the utilization-class breakdown of one species row.
pub fn format_utilization_table(bank: &Bank, species: usize) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "\n{}\n",
        format!("Utilization Classes: {}", bank.genera[species])
            .bold()
            .green()
    ));
    output.push_str(&format!("{}\n", "=".repeat(50)));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Class", "BA (m²/ha)", "Stems/ha", "DQ (cm)", "WS Vol (m³/ha)"]);

    for uc in [
        UtilizationClass::Small,
        UtilizationClass::All,
        UtilizationClass::U75To125,
        UtilizationClass::U125To175,
        UtilizationClass::U175To225,
        UtilizationClass::Over225,
    ] {
        table.add_row(vec![
            Cell::new(uc.to_string()),
            Cell::new(format!("{:.2}", bank.basal_areas[species].get(uc))),
            Cell::new(format!("{:.0}", bank.trees_per_hectare[species].get(uc))),
            Cell::new(format!("{:.1}", bank.quad_mean_diameters[species].get(uc))),
            Cell::new(format!("{:.1}", bank.whole_stem_volumes[species].get(uc))),
        ]);
    }

    output.push_str(&format!("{table}"));
    output
}
