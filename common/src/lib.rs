//! Workers ask a coordinator for a document to analyze, fetch it, count its
//! words and report the counts back. This crate holds what both sides share:
//! the line-oriented wire protocol and the word-count types.

use std::cmp::Reverse;

use fnv::FnvHashMap;

pub mod codec;
pub mod message;

pub use codec::ProtocolError;
pub use message::{FetchRequest, Message, ResultReport, WorkAssignment};

/////////////////////////////////////////////////////////////////////////////
// Word counts
/////////////////////////////////////////////////////////////////////////////

/// Word to occurrence count. Keys are unique by construction.
pub type WordCounts = FnvHashMap<String, u64>;

/// Word counts ordered by descending count.
pub type Ranking = Vec<(String, u64)>;

/// Order `counts` by descending count. Ties are broken by the word itself so
/// the ordering is stable across runs.
pub fn rank(counts: &WordCounts) -> Ranking {
    let mut ranking: Ranking = counts
        .iter()
        .map(|(word, count)| (word.clone(), *count))
        .collect();
    ranking.sort_by(|(a_word, a_count), (b_word, b_count)| {
        (Reverse(a_count), a_word).cmp(&(Reverse(b_count), b_word))
    });
    ranking
}
