use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use common::{Message, Ranking, ResultReport, WorkAssignment};

use crate::jobs::{Aggregation, JobTracker, DEFAULT_DOWNLOAD_HOST};

/// Pending connections the kernel queues for us.
const LISTEN_BACKLOG: u32 = 64;

pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Port to listen on. 0 picks any free port.
    pub port: u16,

    /// Host workers download documents from.
    pub download_host: String,

    /// Longest wait for a connection before re-checking completion.
    pub accept_timeout: Duration,

    /// Longest wait for a complete request on an accepted connection.
    pub read_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            port: 0,
            download_host: DEFAULT_DOWNLOAD_HOST.to_string(),
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Accepting and answering requests.
    Listening,

    /// All work finished, listener being torn down.
    ShuttingDown,

    /// Listener closed, final counts available.
    Stopped,
}

/// Hands out jobs to workers and collects their results, one connection at a
/// time.
///
/// Connections are handled strictly in sequence, so the tracker is never
/// touched by two requests at once. The accept wait is bounded so the loop
/// notices completion without further traffic; this polls rather than
/// reacting to completion directly, trading a little shutdown latency for a
/// much simpler loop.
#[derive(Debug)]
pub struct Coordinator {
    config: CoordinatorConfig,
    tracker: JobTracker,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    state: ServerState,
}

impl Coordinator {
    /// Bind the IPv4 listening socket. Fails if the socket cannot be bound,
    /// or if the download host or a job path could not be sent to workers.
    pub fn bind(config: CoordinatorConfig, tracker: JobTracker) -> Result<Self> {
        if config.download_host.is_empty() {
            bail!("download host must not be empty");
        }
        for path in tracker.paths() {
            if path.is_empty() {
                bail!("job paths must not be empty");
            }
            WorkAssignment::new(config.download_host.as_str(), path)
                .with_context(|| format!("job {path:?} cannot be assigned to workers"))?;
        }

        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));

        let socket = TcpSocket::new_v4().context("failed to create listening socket")?;
        socket
            .set_reuseaddr(true)
            .context("failed to set SO_REUSEADDR")?;
        socket
            .bind(addr)
            .with_context(|| format!("failed to bind {addr}"))?;
        let listener = socket
            .listen(LISTEN_BACKLOG)
            .with_context(|| format!("failed to listen on {addr}"))?;
        let local_addr = listener.local_addr().context("failed to read bound address")?;

        info!("Coordinator listening on {}", local_addr);

        Ok(Self {
            config,
            tracker,
            listener: Some(listener),
            local_addr,
            state: ServerState::Listening,
        })
    }

    /// The port actually bound.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Answer requests until every job is finished, then close the listener
    /// and return the aggregate counts.
    pub async fn serve(&mut self) -> Ranking {
        if let Some(listener) = self.listener.take() {
            self.accept_until_complete(&listener).await;

            self.state = ServerState::ShuttingDown;
            info!("All work done, shutting down");
            drop(listener);
        }

        self.state = ServerState::Stopped;
        self.tracker.snapshot()
    }

    async fn accept_until_complete(&mut self, listener: &TcpListener) {
        loop {
            match timeout(self.config.accept_timeout, listener.accept()).await {
                Ok(Ok((stream, peer))) => self.handle_connection(stream, peer).await,
                Ok(Err(e)) => {
                    if self.accept_failed(e).await {
                        return;
                    }
                }
                Err(_) => {
                    // Nothing pending.
                    if self.tracker.is_complete() {
                        return;
                    }
                }
            }
        }
    }

    /// Log a failed accept. Returns true when the loop should end; otherwise
    /// waits `accept_timeout` first so a persistent error does not spin.
    async fn accept_failed(&self, e: io::Error) -> bool {
        warn!("failed to accept connection: {}", e);
        if self.tracker.is_complete() {
            return true;
        }
        sleep(self.config.accept_timeout).await;
        false
    }

    /// Run one request/response exchange, then drop the connection.
    async fn handle_connection(&mut self, mut stream: TcpStream, peer: SocketAddr) {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);

        let request = match timeout(self.config.read_timeout, Message::decode(&mut reader)).await {
            Ok(Ok(request)) => request,
            Ok(Err(e)) => {
                warn!(%peer, "dropping connection: {}", e);
                return;
            }
            Err(_) => {
                warn!(%peer, "dropping connection: no request within {:?}", self.config.read_timeout);
                return;
            }
        };

        debug!(%peer, "received {}", request.kind());

        let Some(response) = self.dispatch(request) else {
            debug!(%peer, "ignoring message the coordinator does not serve");
            return;
        };

        if let Err(e) = writer.write_all(&response.encode()).await {
            warn!(%peer, "failed to send {}: {}", response.kind(), e);
            return;
        }
        if let Err(e) = writer.shutdown().await {
            debug!(%peer, "failed to close connection: {}", e);
        }
    }

    /// Apply a request to the tracker and build the response, if any.
    fn dispatch(&mut self, request: Message) -> Option<Message> {
        match request {
            Message::WorkRequest => Some(self.next_assignment().into()),
            Message::ResultReport(report) => {
                self.record(report);
                Some(Message::ResultAck)
            }
            _ => None,
        }
    }

    fn next_assignment(&mut self) -> WorkAssignment {
        if self.tracker.is_complete() {
            return WorkAssignment::no_work();
        }

        match self.tracker.assign() {
            Some(path) => {
                debug!(%path, "assigning");
                match WorkAssignment::new(self.config.download_host.as_str(), path.as_str()) {
                    Ok(assignment) => assignment,
                    Err(e) => {
                        warn!(%path, "cannot assign: {}", e);
                        WorkAssignment::no_work()
                    }
                }
            }
            None => WorkAssignment::no_work(),
        }
    }

    fn record(&mut self, report: ResultReport) {
        let path = report.path();
        match self.tracker.aggregate(path, report.counts()) {
            Aggregation::Recorded => {
                let progress = self.tracker.progress();
                info!(
                    %path,
                    "result recorded ({}/{} finished, {} in flight)",
                    progress.finished,
                    self.tracker.len(),
                    progress.started
                );
            }
            Aggregation::Duplicate => info!(%path, "ignoring duplicate result"),
            Aggregation::NotAssigned => warn!(%path, "ignoring result for a path that was never assigned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::WordCounts;

    use super::*;

    fn coordinator(paths: &[&str]) -> Coordinator {
        Coordinator::bind(CoordinatorConfig::default(), JobTracker::new(paths.iter().copied()))
            .unwrap()
    }

    #[tokio::test]
    async fn binds_a_free_port_when_asked_for_zero() {
        let a = coordinator(&["/a"]);
        let b = coordinator(&["/a"]);

        assert_ne!(a.port(), 0);
        assert_ne!(a.port(), b.port());
        assert_eq!(a.state(), ServerState::Listening);
    }

    #[tokio::test]
    async fn binding_a_taken_port_fails() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let config = CoordinatorConfig {
            port: taken.local_addr().unwrap().port(),
            ..CoordinatorConfig::default()
        };

        assert!(Coordinator::bind(config, JobTracker::new(["/a"])).is_err());
    }

    #[tokio::test]
    async fn work_request_is_answered_with_download_host_and_path() {
        let mut coordinator = coordinator(&["/a"]);

        let response = coordinator.dispatch(Message::WorkRequest);

        assert_eq!(
            response,
            Some(Message::WorkAssignment(
                WorkAssignment::new(DEFAULT_DOWNLOAD_HOST, "/a").unwrap()
            ))
        );
    }

    #[tokio::test]
    async fn report_is_acknowledged_even_when_duplicate() {
        let mut coordinator = coordinator(&["/a"]);
        coordinator.dispatch(Message::WorkRequest);
        let report = ResultReport::new("/a", WordCounts::default()).unwrap();

        assert_eq!(coordinator.dispatch(report.clone().into()), Some(Message::ResultAck));
        assert_eq!(coordinator.dispatch(report.into()), Some(Message::ResultAck));
        assert!(coordinator.tracker().is_complete());
        assert_eq!(
            coordinator.dispatch(Message::WorkRequest),
            Some(Message::WorkAssignment(WorkAssignment::no_work()))
        );
    }

    #[tokio::test]
    async fn messages_meant_for_workers_get_no_response() {
        let mut coordinator = coordinator(&["/a"]);

        assert_eq!(coordinator.dispatch(Message::ResultAck), None);
        assert_eq!(coordinator.dispatch(WorkAssignment::no_work().into()), None);
        assert_eq!(
            coordinator.dispatch(common::FetchRequest::new("h", "/a").unwrap().into()),
            None
        );
        assert_eq!(coordinator.tracker().progress().unstarted, 1);
    }

    #[tokio::test]
    async fn jobs_that_cannot_be_sent_are_rejected_at_bind() {
        let spaced = JobTracker::new(["/a", "/b c"]);
        assert!(Coordinator::bind(CoordinatorConfig::default(), spaced).is_err());

        let empty = JobTracker::new([""]);
        assert!(Coordinator::bind(CoordinatorConfig::default(), empty).is_err());

        for host in ["", "two hosts"] {
            let config = CoordinatorConfig {
                download_host: host.to_string(),
                ..CoordinatorConfig::default()
            };
            assert!(Coordinator::bind(config, JobTracker::new(["/a"])).is_err());
        }
    }

    #[tokio::test]
    async fn accept_error_backs_off_while_work_remains() {
        let config = CoordinatorConfig {
            accept_timeout: Duration::from_millis(50),
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::bind(config, JobTracker::new(["/a"])).unwrap();

        let started = tokio::time::Instant::now();
        let stop = coordinator.accept_failed(io::ErrorKind::Other.into()).await;

        assert!(!stop);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn accept_error_after_completion_ends_the_loop() {
        let coordinator = coordinator(&[]);

        let stop = timeout(
            Duration::from_millis(100),
            coordinator.accept_failed(io::ErrorKind::Other.into()),
        )
        .await
        .unwrap();

        assert!(stop);
    }

    #[tokio::test]
    async fn serve_stops_immediately_with_nothing_to_do() {
        let mut coordinator = coordinator(&[]);

        let ranking = coordinator.serve().await;

        assert!(ranking.is_empty());
        assert_eq!(coordinator.state(), ServerState::Stopped);
    }
}
