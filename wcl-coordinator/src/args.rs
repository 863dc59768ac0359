use std::time::Duration;

use clap::Parser;

use wcl_coordinator::jobs::{DEFAULT_DOWNLOAD_HOST, DEFAULT_PLAY_IDS};
use wcl_coordinator::CoordinatorConfig;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The port for the server to run on. 0 picks any free port.
    #[arg(short, long, default_value = "5791")]
    pub port: u16,

    /// Host the workers download plays from.
    #[arg(short, long, default_value = DEFAULT_DOWNLOAD_HOST)]
    pub download_host: String,

    /// Project Gutenberg ids of the plays to analyze.
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_PLAY_IDS)]
    pub play_ids: Vec<u32>,

    /// How long to wait for a connection before checking whether all work is done.
    #[arg(long, default_value = "500")]
    pub accept_timeout_ms: u64,

    /// How long an accepted connection may take to deliver its request.
    #[arg(long, default_value = "5000")]
    pub read_timeout_ms: u64,
}

impl Args {
    pub fn config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            port: self.port,
            download_host: self.download_host.clone(),
            accept_timeout: Duration::from_millis(self.accept_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}
