use std::collections::HashSet;

use common::{rank, Ranking, WordCounts};
use rand::seq::IteratorRandom;
use tracing::debug;

/// Plays analyzed when no ids are given on the command line.
pub const DEFAULT_PLAY_IDS: [u32; 8] = [
    1513,  // Romeo and Juliet
    27761, // Hamlet
    23042, // Tempest
    1533,  // Macbeth
    1531,  // Othello
    1522,  // Julius Caesar
    1526,  // Twelfth Night
    1515,  // Merchant of Venice
];

pub const DEFAULT_DOWNLOAD_HOST: &str = "www.gutenberg.org";

/// Path of a play's plain text on the download host.
pub fn play_path(id: u32) -> String {
    format!("/cache/epub/{id}/pg{id}.txt")
}

/// State of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Not handed to any worker yet.
    Unstarted,

    /// Handed out at least once, no result yet.
    Started,

    /// Result aggregated.
    Finished,
}

/// What [`JobTracker::aggregate`] did with a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Counts were added and the job is now finished.
    Recorded,

    /// The job was already finished; nothing changed.
    Duplicate,

    /// The path was never handed out; nothing changed.
    NotAssigned,
}

/// Sizes of the three job sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub unstarted: usize,
    pub started: usize,
    pub finished: usize,
}

impl Progress {
    pub fn total(&self) -> usize {
        self.unstarted + self.started + self.finished
    }
}

/// Tracks every job of a fixed universe through
/// unstarted -> started -> finished and sums the word counts reported for
/// them, counting each job exactly once.
///
/// Not synchronized. The owner must serialize calls.
#[derive(Debug)]
pub struct JobTracker {
    /// Number of jobs; never changes.
    universe: usize,

    unstarted: HashSet<String>,
    started: HashSet<String>,
    finished: HashSet<String>,

    /// Aggregate word counts across finished jobs.
    word_counts: WordCounts,
}

impl JobTracker {
    /// Start tracking `paths`, all unstarted. Duplicate paths are one job.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unstarted: HashSet<String> = paths.into_iter().map(Into::into).collect();

        Self {
            universe: unstarted.len(),
            unstarted,
            started: HashSet::new(),
            finished: HashSet::new(),
            word_counts: WordCounts::default(),
        }
    }

    /// Tracker over the plays with the given ids.
    pub fn for_plays(ids: &[u32]) -> Self {
        Self::new(ids.iter().copied().map(play_path))
    }

    /// Pick a path for a worker.
    ///
    /// Unstarted jobs go first and become started. Once none are left, an
    /// already started job is handed out again without changing state, in
    /// case its first worker never reports. `None` means every job is
    /// finished.
    pub fn assign(&mut self) -> Option<String> {
        let mut rng = rand::thread_rng();

        if let Some(path) = self.unstarted.iter().choose(&mut rng).cloned() {
            self.unstarted.remove(&path);
            self.started.insert(path.clone());
            return Some(path);
        }

        let path = self.started.iter().choose(&mut rng).cloned()?;
        debug!(%path, "no unstarted jobs, re-issuing a started one");
        Some(path)
    }

    /// Fold a worker's counts for `path` into the aggregate.
    ///
    /// Only the first report for a started job counts. Later reports for the
    /// same path, and reports for paths that were never handed out, change
    /// nothing. Totals saturate at `u64::MAX`.
    pub fn aggregate(&mut self, path: &str, counts: &WordCounts) -> Aggregation {
        if self.finished.contains(path) {
            return Aggregation::Duplicate;
        }
        if !self.started.remove(path) {
            return Aggregation::NotAssigned;
        }

        for (word, count) in counts {
            let total = self.word_counts.entry(word.clone()).or_insert(0);
            *total = total.saturating_add(*count);
        }
        self.finished.insert(path.to_owned());

        Aggregation::Recorded
    }

    /// Whether every job has been finished.
    pub fn is_complete(&self) -> bool {
        self.finished.len() == self.universe
    }

    /// Aggregate counts, highest first.
    pub fn snapshot(&self) -> Ranking {
        rank(&self.word_counts)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            unstarted: self.unstarted.len(),
            started: self.started.len(),
            finished: self.finished.len(),
        }
    }

    /// Every path in the universe, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.unstarted
            .iter()
            .chain(&self.started)
            .chain(&self.finished)
            .map(String::as_str)
    }

    /// Number of jobs in the universe.
    pub fn len(&self) -> usize {
        self.universe
    }

    pub fn is_empty(&self) -> bool {
        self.universe == 0
    }

    /// Current state of `path`, or `None` if it is not part of the universe.
    pub fn state(&self, path: &str) -> Option<JobState> {
        if self.unstarted.contains(path) {
            Some(JobState::Unstarted)
        } else if self.started.contains(path) {
            Some(JobState::Started)
        } else if self.finished.contains(path) {
            Some(JobState::Finished)
        } else {
            None
        }
    }
}
