use std::time::Duration;

use clap::Parser;

use wcl_worker::core::DEFAULT_COORDINATOR;
use wcl_worker::fetch::{DEFAULT_MIN_WORD_LEN, DEFAULT_TOP};
use wcl_worker::ClientConfig;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The address of the coordinator server
    #[arg(short = 'j', long = "join", default_value = DEFAULT_COORDINATOR)]
    pub address: String,

    /// Deadline in milliseconds for each exchange with the coordinator.
    #[arg(short, long, default_value = "10000")]
    pub timeout_ms: u64,

    /// Only words longer than this many characters are counted.
    #[arg(long, default_value_t = DEFAULT_MIN_WORD_LEN)]
    pub min_word_len: usize,

    /// How many of the most frequent words to report per play.
    #[arg(long, default_value_t = DEFAULT_TOP)]
    pub top: usize,
}

impl Args {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            address: self.address.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}
