//! Command-line options for the server binary.

use clap::Parser;
use std::path::PathBuf;

const DEFAULT_CONFIG: &str = "config.toml";

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file
    #[arg(value_name = "CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Configuration file, as an option
    #[arg(long = "config", value_name = "PATH", conflicts_with = "config_file")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// The configuration file to load; `config.toml` when none is given.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .or_else(|| self.config_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
    }
}
