use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::Path;

mod current;
mod dataset;
mod error;
mod extract;
mod locations;
mod map;
mod net;
mod probe;
mod scan;
mod types;
mod utils;

pub use locations::LOCATIONS_FILE;
pub use types::*;

/// Firefighter I course listing; detail pages live at `{BASE_URL}/{S-code}/{year}/`
pub const BASE_URL: &str = "https://www.mfri.org/course/msfs/FIRE/101";
pub const SCAN_USER_AGENT: &str = "MFRI Course Data Collector Bot/1.3";
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub const ALL_COURSES_FILE: &str = "mfri_firefigher_I_old_and_new_courses.json";
pub const CURRENT_FILE: &str = "current_firefighter_I_classes.json";
pub const MAP_OUTPUT: &str = "docs/index.html";
pub const BOUNDARY_FILE: &str = "maryland-single.geojson";

#[derive(Parser)]
#[command(name = "ff1-classes")]
#[command(about = "Find MFRI Firefighter I classes and map them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every course code for the previous, current and next year (slow)
    Scan,
    /// Scrape the live course listing into the current snapshot
    Current,
    /// Render the Leaflet map to docs/index.html
    Map,
    /// Remove generated files (datasets and map)
    Clean,
}

fn run_clean() -> Result<()> {
    println!("Cleaning generated files...");

    for file in [ALL_COURSES_FILE, CURRENT_FILE, MAP_OUTPUT] {
        let path = Path::new(file);
        if path.exists() {
            fs::remove_file(path)?;
            println!("  Removed {}", file);
        }
    }

    println!("Clean complete!");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan => scan::run_scan(),
        Commands::Current => current::run_current(),
        Commands::Map => map::run_map(),
        Commands::Clean => run_clean(),
    }
}
