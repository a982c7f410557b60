pub mod types;
pub mod config;
pub mod data;
pub mod centroid;
pub mod geoquery;
pub mod session;
pub mod auth;
pub mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the dataset and print a summary
    Check {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the dashboard API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Check { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let bundle = data::load_data(&app_config)?;

            let eligible = bundle
                .tracts
                .iter()
                .filter(|t| t.eligibility == types::Eligibility::Eligible)
                .count();
            println!("Tracts: {} ({} eligible)", bundle.tracts.len(), eligible);
            println!("Anchors: {}", bundle.anchors.len());
            println!(
                "Boundaries: {} ({} with centroids)",
                bundle.boundaries.len(),
                bundle.centroids.len()
            );
        }
        Commands::Serve { config } => {
            println!("Serving dashboard with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let loader =
                data::CachedLoader::new(Duration::from_secs(app_config.data.cache_ttl_secs));
            let initial = loader.get_or_load(&app_config)?;

            server::start_server(app_config, loader, initial).await?;
        }
    }

    Ok(())
}
