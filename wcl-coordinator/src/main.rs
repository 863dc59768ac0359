mod args;

use args::Args;

use clap::Parser;
use tracing::info;

use wcl_coordinator::{Coordinator, JobTracker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Note: There are default values for EACH argument.
    let args = Args::parse();

    let tracker = JobTracker::for_plays(&args.play_ids);
    info!("Tracking {} plays on {}", tracker.len(), args.download_host);

    let mut coordinator = Coordinator::bind(args.config(), tracker)?;
    let ranking = coordinator.serve().await;

    info!("Aggregated {} distinct words", ranking.len());
    for (word, count) in ranking {
        println!("{word} {count}");
    }

    Ok(())
}
