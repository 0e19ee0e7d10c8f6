use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Terminal dashboard for the NYC taxi statistics API.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Base URL of the statistics API.
    #[arg(long, env = "TAXI_API_BASE", default_value = "http://localhost:5000/api")]
    pub api_base: String,

    /// Trips per page in the Data view.
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: u32,

    /// Request timeout in seconds. 0 waits indefinitely.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Directory CSV exports are written to.
    #[arg(long, default_value = ".")]
    pub export_dir: PathBuf,

    /// Also write debug-level logs to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
