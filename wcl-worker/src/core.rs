use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use common::{Message, ProtocolError, ResultReport, WordCounts, WorkAssignment};

use crate::fetch::Fetcher;

pub const DEFAULT_COORDINATOR: &str = "127.0.0.1:5791";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure to complete an exchange with the coordinator.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to coordinator at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("connection to coordinator failed: {0}")]
    Transport(#[source] io::Error),

    #[error("coordinator sent a malformed response: {0}")]
    Malformed(#[source] ProtocolError),

    #[error("coordinator answered with an unexpected {0}")]
    Unexpected(&'static str),

    #[error("report cannot be sent: {0}")]
    Invalid(#[source] ProtocolError),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the coordinator.
    pub address: String,

    /// Deadline for connecting, and separately for the request/response.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_COORDINATOR.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Talks to the coordinator, one connection per request.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    config: ClientConfig,
}

impl CoordinatorClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Ask for a job. A "no work left" assignment is a valid answer, not an
    /// error.
    pub async fn request_work(&self) -> Result<WorkAssignment, ClientError> {
        match self.exchange(&Message::WorkRequest).await? {
            Message::WorkAssignment(assignment) => Ok(assignment),
            other => Err(ClientError::Unexpected(other.kind())),
        }
    }

    /// Report the counts for an assigned path.
    pub async fn report_result(&self, path: &str, counts: WordCounts) -> Result<(), ClientError> {
        let report = ResultReport::new(path, counts).map_err(ClientError::Invalid)?;
        match self.exchange(&report.into()).await? {
            Message::ResultAck => Ok(()),
            other => Err(ClientError::Unexpected(other.kind())),
        }
    }

    async fn exchange(&self, request: &Message) -> Result<Message, ClientError> {
        let address = &self.config.address;
        let connect_error = |source: io::Error| ClientError::Connect {
            address: address.clone(),
            source,
        };

        let mut stream = timeout(self.config.timeout, TcpStream::connect(address.as_str()))
            .await
            .map_err(|_| connect_error(io::ErrorKind::TimedOut.into()))?
            .map_err(connect_error)?;

        let exchange = async {
            stream.write_all(&request.encode()).await?;
            let mut reader = BufReader::new(&mut stream);
            Ok::<_, ProtocolError>(Message::decode(&mut reader).await?)
        };

        match timeout(self.config.timeout, exchange).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(ProtocolError::Io(e))) => Err(ClientError::Transport(e)),
            Ok(Err(e)) => Err(ClientError::Malformed(e)),
            Err(_) => Err(ClientError::Transport(io::ErrorKind::TimedOut.into())),
        }
    }
}

/// Why a worker stopped.
#[derive(Debug)]
pub enum StopReason {
    /// The coordinator has nothing left to hand out.
    NoWorkLeft,

    /// Asking for work failed.
    RequestFailed(ClientError),

    /// The assigned document could not be fetched or analyzed.
    FetchFailed(anyhow::Error),

    /// The coordinator did not take the report.
    ReportFailed(ClientError),
}

#[derive(Debug)]
pub struct RunSummary {
    /// Reports the coordinator acknowledged.
    pub reported: usize,

    pub stop: StopReason,
}

/// Asks for work, does it, reports it, until told to stop.
#[derive(Debug)]
pub struct Worker<F> {
    client: CoordinatorClient,
    fetcher: F,
}

impl<F: Fetcher> Worker<F> {
    pub fn new(client: CoordinatorClient, fetcher: F) -> Self {
        Self { client, fetcher }
    }

    /// Work until the coordinator runs out of jobs or any step fails. Nothing
    /// is retried; the coordinator re-issues jobs that never get reported.
    pub async fn run(&self) -> RunSummary {
        let mut reported = 0;

        let stop = loop {
            let assignment = match self.client.request_work().await {
                Ok(assignment) => assignment,
                Err(e) => break StopReason::RequestFailed(e),
            };
            if assignment.is_no_work() {
                break StopReason::NoWorkLeft;
            }

            info!("Assigned {}{}", assignment.host(), assignment.path());
            let counts = match self.fetcher.fetch(assignment.host(), assignment.path()).await {
                Ok(counts) => counts,
                Err(e) => break StopReason::FetchFailed(e),
            };
            debug!("{} words counted in {}", counts.len(), assignment.path());

            if let Err(e) = self.client.report_result(assignment.path(), counts).await {
                break StopReason::ReportFailed(e);
            }
            reported += 1;
        };

        match &stop {
            StopReason::NoWorkLeft => info!("No work left after {} reports", reported),
            StopReason::RequestFailed(e) => warn!("Stopping, could not get work: {}", e),
            StopReason::FetchFailed(e) => warn!("Stopping, fetch failed: {:#}", e),
            StopReason::ReportFailed(e) => warn!("Stopping, could not report: {}", e),
        }

        RunSummary { reported, stop }
    }
}
