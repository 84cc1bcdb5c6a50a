#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Nearby parking lookups from the command line.
//!
//! Builds a [`ProximityEngine`] from the environment (see
//! [`can_i_park_proximity`] for the variables), runs one lookup and prints
//! the result as JSON on stdout. Logs go to stderr via `RUST_LOG`.

use can_i_park_feature_models::FeatureKind;
use can_i_park_proximity::{ProximityConfig, ProximityEngine, build_engine, registry};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "can_i_park", about = "Find parking signs and facilities near a point")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parking signs near a point
    Signs(NearbyArgs),
    /// Public garages and parking lots near a point
    PublicParking(NearbyArgs),
    /// Street parking segments near a point
    StreetParking(NearbyArgs),
    /// Signs and public parking together
    Search(SearchArgs),
}

#[derive(Args)]
struct Location {
    /// Latitude in degrees (WGS84)
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,
    /// Longitude in degrees (WGS84)
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,
}

#[derive(Args)]
struct NearbyArgs {
    #[command(flatten)]
    location: Location,
    /// Search radius in meters [default: per dataset]
    #[arg(long, allow_negative_numbers = true)]
    radius: Option<f64>,
    /// Maximum number of results
    #[arg(long, default_value_t = 10)]
    top_n: usize,
    /// Log the constructed query and per-feature distances
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    location: Location,
    /// Search radius in meters, 10 to 5000 [default: 100]
    #[arg(long)]
    radius: Option<f64>,
    /// Maximum number of results per list [default: 20]
    #[arg(long)]
    top_n: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let config = ProximityConfig::from_env()?;
    log::info!("Using {} backend", config.backend);
    let engine = build_engine(&config).await?;

    let output = match cli.command {
        Commands::Signs(args) => nearby(&engine, FeatureKind::Sign, &args).await?,
        Commands::PublicParking(args) => nearby(&engine, FeatureKind::PublicParking, &args).await?,
        Commands::StreetParking(args) => nearby(&engine, FeatureKind::StreetParking, &args).await?,
        Commands::Search(args) => {
            let search = engine
                .search_parking(args.location.lat, args.location.lon, args.radius, args.top_n)
                .await?;
            log::info!(
                "Found {} signs and {} public parking facilities",
                search.signs.len(),
                search.public_parking.len()
            );
            serde_json::to_value(search)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn nearby(
    engine: &ProximityEngine,
    kind: FeatureKind,
    args: &NearbyArgs,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let radius = args.radius.unwrap_or_else(|| {
        registry::dataset(kind).map_or(100.0, |def| def.default_radius_m)
    });
    let (lat, lon) = (args.location.lat, args.location.lon);

    let features = match kind {
        FeatureKind::Sign => {
            engine
                .find_signs_nearby(lat, lon, radius, args.top_n, args.debug)
                .await?
        }
        FeatureKind::PublicParking => {
            engine
                .find_public_parking_nearby(lat, lon, radius, args.top_n, args.debug)
                .await?
        }
        FeatureKind::StreetParking => {
            engine
                .find_street_parking_nearby(lat, lon, radius, args.top_n, args.debug)
                .await?
        }
    };
    log::info!("Found {} {kind} features within {radius} m", features.len());

    Ok(serde_json::to_value(features)?)
}
