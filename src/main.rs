mod cmd;
mod config;
mod error;
mod filter;
mod progress;
mod registry;
mod resolver;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::Config;
use crate::registry::http::{DOCKER_HUB, HttpRegistry};

#[derive(Parser)]
#[command(name = "regextract")]
#[command(about = "Extract files from a single container image layer straight from a registry")]
#[command(version)]
struct Cli {
    /// Layer to extract from; negative values count back from the newest layer
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    layer: i64,

    /// Write the compressed layer blob to this file instead of a tar on stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Registry base URL
    #[arg(long, env = "REGEXTRACT_REGISTRY", default_value = DOCKER_HUB)]
    registry: String,

    /// Registry username (requires --password)
    #[arg(long, env = "REGEXTRACT_USERNAME")]
    username: Option<String>,

    /// Registry password
    #[arg(long, env = "REGEXTRACT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Don't print progress to stderr
    #[arg(short, long)]
    quiet: bool,

    /// Image to read, as name[:tag]
    image: Option<String>,

    /// Entries to extract (all entries when none are given)
    files: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_cli(&cli)?;

    let mut registry = HttpRegistry::new(&config.registry_url, config.credentials.clone())?;
    cmd::extract::run(&config, &mut registry, io::stdout().lock())?;

    Ok(())
}
