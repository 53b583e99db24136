use std::path::PathBuf;

use clap::Parser;

/// Command-line interface for the download service.
#[derive(Debug, Clone, Parser)]
#[command(name = "arias", about = "Download orchestration service for aria2", version)]
pub struct Cli {
    /// YAML configuration file; defaults plus `ARIAS_*` overrides when absent.
    #[arg(long, short = 'c', env = "ARIAS_CONFIG")]
    pub config: Option<PathBuf>,
}
