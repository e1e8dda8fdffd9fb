//! Command-line interface definition using clap

use clap::Parser;
use std::path::PathBuf;

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG: &str = "powerbase.toml";

/// Drive a slot-car powerbase over its serial link
#[derive(Parser, Debug)]
#[command(name = "powerbase-link")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Serial device of the powerbase (overrides config)
    #[arg(long, value_name = "PATH")]
    pub port: Option<String>,

    /// Configuration file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Target laps for this run (overrides config, not saved)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(1..))]
    pub laps: Option<u8>,

    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Print every race event as one JSON line on stdout
    #[arg(long)]
    pub json: bool,
}
