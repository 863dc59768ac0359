use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Error};
use tracing::debug;
use url::Url;

use common::{rank, FetchRequest, WordCounts};

/// Words of at most this many characters are not counted.
pub const DEFAULT_MIN_WORD_LEN: usize = 5;

/// How many of the most frequent words a report carries.
pub const DEFAULT_TOP: usize = 20;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns an assignment into word counts.
///
/// Implementations issue the document GET through their own HTTP client.
/// [`FetchRequest`] (and so `Message::Fetch`) only names the location and
/// describes the equivalent request line; it is never written to a socket by
/// this crate.
pub trait Fetcher {
    /// Download the document at `host`/`path` and count its words.
    fn fetch(
        &self,
        host: &str,
        path: &str,
    ) -> impl Future<Output = Result<WordCounts, Error>> + Send;
}

/// Downloads documents over HTTPS and counts their long words.
#[derive(Debug, Clone)]
pub struct HttpsFetcher {
    client: reqwest::Client,
    min_word_len: usize,
    top: usize,
}

impl HttpsFetcher {
    pub fn new(min_word_len: usize, top: usize) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .context("failed to build HTTPS client")?;

        Ok(Self {
            client,
            min_word_len,
            top,
        })
    }
}

impl Fetcher for HttpsFetcher {
    async fn fetch(&self, host: &str, path: &str) -> Result<WordCounts, Error> {
        let request = FetchRequest::new(host, path)
            .with_context(|| format!("invalid document location {host}{path}"))?;
        let url = Url::parse(&request.https_url())
            .with_context(|| format!("invalid document location {host}{path}"))?;

        debug!("GET {}", url);
        let text = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to download {url}"))?
            .text()
            .await
            .with_context(|| format!("failed to read body of {url}"))?;

        let counts = count_words(&text, self.min_word_len, self.top);
        debug!("{} bytes from {}, {} words kept", text.len(), url, counts.len());
        Ok(counts)
    }
}

/// Count whitespace-separated words longer than `min_word_len` characters,
/// lower-cased, keeping the `top` most frequent.
pub fn count_words(text: &str, min_word_len: usize, top: usize) -> WordCounts {
    let mut counts = WordCounts::default();
    for word in text.split_whitespace() {
        if word.chars().count() > min_word_len {
            *counts.entry(word.to_lowercase()).or_insert(0) += 1;
        }
    }

    rank(&counts).into_iter().take(top).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_long_words_case_insensitively() {
        let text = "Romeo romeo ROMEO\nwherefore art thou Romeo?\n  Juliet juliet";

        let counts = count_words(text, 5, 20);

        assert_eq!(counts.get("romeo"), None);
        assert_eq!(counts.get("romeo?"), Some(&1));
        assert_eq!(counts.get("wherefore"), Some(&1));
        assert_eq!(counts.get("juliet"), Some(&2));
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn keeps_only_the_most_frequent() {
        let text = "alphabet alphabet alphabet bravados bravados charlies";

        let counts = count_words(text, 5, 2);

        assert_eq!(counts.len(), 2);
        assert_eq!(counts.get("alphabet"), Some(&3));
        assert_eq!(counts.get("bravados"), Some(&2));
    }

    #[test]
    fn length_is_measured_in_characters() {
        // Six characters, more than six bytes.
        let counts = count_words("élégie", 5, 20);
        assert_eq!(counts.get("élégie"), Some(&1));
    }

    #[test]
    fn empty_document_yields_no_counts() {
        assert!(count_words("", DEFAULT_MIN_WORD_LEN, DEFAULT_TOP).is_empty());
    }

    #[tokio::test]
    async fn location_that_is_not_a_valid_request_is_refused_before_download() {
        let fetcher = HttpsFetcher::new(DEFAULT_MIN_WORD_LEN, DEFAULT_TOP).unwrap();

        for (host, path) in [("www.gutenberg.org", ""), ("www.gutenberg.org", "/a b")] {
            let err = fetcher.fetch(host, path).await.unwrap_err();
            assert!(err.to_string().contains("invalid document location"), "{err:#}");
        }
    }
}
