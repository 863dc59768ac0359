use clap::Parser;
use tracing::{error, info};

mod args;
use args::Args;

use wcl_worker::{CoordinatorClient, HttpsFetcher, StopReason, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let fetcher = HttpsFetcher::new(args.min_word_len, args.top)?;
    let client = CoordinatorClient::new(args.client_config());

    info!("Worker joining coordinator at {}", args.address);
    let summary = Worker::new(client, fetcher).run().await;

    match summary.stop {
        StopReason::NoWorkLeft => Ok(()),
        StopReason::RequestFailed(e) | StopReason::ReportFailed(e) => {
            error!("Worker exited after {} reports", summary.reported);
            Err(e.into())
        }
        StopReason::FetchFailed(e) => {
            error!("Worker exited after {} reports", summary.reported);
            Err(e)
        }
    }
}
