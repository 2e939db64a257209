//! CLI for the omap offline map region manager.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use omap_core::config;
use omap_core::tile::GeoRect;

use commands::{run_cancel, run_create, run_delete, run_download, run_list, run_pause, run_usage};

/// Top-level CLI for omap.
#[derive(Debug, Parser)]
#[command(name = "omap")]
#[command(about = "omap: download map regions for offline use", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Register a region (nothing is downloaded yet).
    Create {
        /// Display name.
        name: String,
        /// Bounding box in degrees.
        #[arg(long, value_name = "MIN_LAT,MIN_LON,MAX_LAT,MAX_LON", value_parser = parse_bounds, allow_hyphen_values = true)]
        bounds: GeoRect,
        /// Zoom range, e.g. `10-14` (or a single level).
        #[arg(long, value_name = "MIN-MAX", value_parser = parse_zoom_range)]
        zoom: (u8, u8),
    },

    /// Download (or resume) a region in the foreground. Ctrl-C pauses.
    Download {
        /// Region identifier.
        id: i64,
    },

    /// Pause the region being downloaded by a running `omap download`.
    Pause {
        /// Region identifier.
        id: i64,
    },

    /// Cancel the region being downloaded by a running `omap download`.
    Cancel {
        /// Region identifier.
        id: i64,
    },

    /// Show all regions.
    List,

    /// Show disk usage per region and in total.
    Usage,

    /// Delete a region and its cached tiles.
    Delete {
        /// Region identifier.
        id: i64,
    },
}

/// Parses `min_lat,min_lon,max_lat,max_lon`.
fn parse_bounds(s: &str) -> Result<GeoRect, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid coordinate: {}", e))?;
    match parts.as_slice() {
        &[min_lat, min_lon, max_lat, max_lon] => {
            GeoRect::new(min_lat, min_lon, max_lat, max_lon).map_err(|e| e.to_string())
        }
        _ => Err(format!("expected 4 comma-separated numbers, got {}", parts.len())),
    }
}

/// Parses `min-max` or a single zoom level.
fn parse_zoom_range(s: &str) -> Result<(u8, u8), String> {
    let parse = |p: &str| {
        p.trim()
            .parse::<u8>()
            .map_err(|e| format!("invalid zoom '{}': {}", p.trim(), e))
    };
    match s.split_once('-') {
        Some((min, max)) => Ok((parse(min)?, parse(max)?)),
        None => {
            let z = parse(s)?;
            Ok((z, z))
        }
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Create { name, bounds, zoom } => run_create(&cfg, &name, bounds, zoom).await?,
            CliCommand::Download { id } => run_download(&cfg, id).await?,
            CliCommand::Pause { id } => run_pause(id).await?,
            CliCommand::Cancel { id } => run_cancel(id).await?,
            CliCommand::List => run_list().await?,
            CliCommand::Usage => run_usage().await?,
            CliCommand::Delete { id } => run_delete(&cfg, id).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
