use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use stand_growth_engine::{
    engine::ExecutionStep,
    model::PolygonDescriptor,
    report::{self, YearSummary},
    tables::demo::{demo_control_data, demo_curve_bank},
    ControlVariables, GrowTarget, GrowthEngine,
};

#[derive(Parser)]
#[command(
    name = "stand-growth",
    about = "Stand growth projection engine - per-species utilization-class estimation",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grow a polygon year by year and print the projection
    Project {
        /// Path to a polygon descriptor (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Number of years to grow (overrides the polygon's target year)
        #[arg(short, long)]
        years: Option<i32>,

        /// Calendar year to grow to (overrides --years)
        #[arg(short, long)]
        target_year: Option<i32>,

        /// Recompute coverages and dominant height each simulated year
        #[arg(long)]
        update_during_growth: bool,

        /// Show the final per-species utilization breakdown
        #[arg(long)]
        utilization: bool,
    },

    /// Validate a polygon and print its composition and rankings
    Summary {
        /// Path to a polygon descriptor (JSON)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print a sample polygon descriptor (JSON) to stdout
    Sample,
}

fn load_polygon(path: &PathBuf) -> Result<PolygonDescriptor> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading polygon file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing polygon file {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let tables = demo_control_data();
    let curves = demo_curve_bank();

    match cli.command {
        Commands::Project {
            input,
            years,
            target_year,
            update_during_growth,
            utilization,
        } => {
            let polygon = load_polygon(&input)?;

            let grow_target = if let Some(year) = target_year {
                GrowTarget::Absolute(year)
            } else if let Some(n) = years {
                GrowTarget::Relative(n)
            } else {
                GrowTarget::FromPolygon
            };
            let variables = ControlVariables {
                grow_target,
                update_during_growth,
            };

            println!(
                "\n{}",
                format!("Stand Growth Projection: {}", polygon.id)
                    .bold()
                    .cyan()
            );

            let engine = GrowthEngine::new(&tables, &curves, variables);
            let mut rows: Vec<YearSummary> = Vec::new();
            let state = engine.process_polygon(&polygon, &mut |year, bank| {
                rows.push(YearSummary::from_bank(year, bank));
            })?;

            report::print_projection_table(&rows);
            report::print_species_table(&state.bank);
            if utilization {
                for s in state.bank.indices() {
                    println!("{}", report::format_utilization_table(&state.bank, s));
                }
            }
        }

        Commands::Summary { input } => {
            let polygon = load_polygon(&input)?;
            let engine = GrowthEngine::new(&tables, &curves, ControlVariables::default());

            let state = engine.process_polygon_until(
                &polygon,
                ExecutionStep::CalculateDominantHeightAgeSiteIndex,
                &mut |_, _| {},
            )?;
            let ranking = state.ranking()?;
            let details = state.primary_details()?;

            println!("\n{}", "Polygon Summary".bold().cyan());
            println!("{}", "=".repeat(40));
            println!("  Polygon:          {}", state.polygon_id);
            println!("  Reference year:   {}", state.reference_year);
            println!("  BEC zone:         {}", state.bank.bec.alias);
            println!(
                "  Primary species:  {}",
                state.bank.genera[ranking.primary_species_index]
            );
            if let Some(secondary) = ranking.secondary_species_index {
                println!("  Secondary:        {}", state.bank.genera[secondary]);
            }
            println!("  Inventory group:  {}", ranking.inventory_type_group);
            println!("  Equation group:   {}", ranking.primary_species_group);
            println!("  Dominant height:  {:.1} m", details.dominant_height);
            println!("  Site index:       {:.1}", details.site_index);
            println!("  Total age:        {:.0}", details.total_age);
            report::print_species_table(&state.bank);
        }

        Commands::Sample => {
            let polygon = stand_growth_engine::tables::demo::demo_polygon();
            println!("{}", serde_json::to_string_pretty(&polygon)?);
        }
    }

    Ok(())
}
