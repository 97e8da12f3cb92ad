use std::time::Duration;

use thiserror::Error;

use crate::browser::BrowserError;

use super::transport::TransportError;

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid page url: {0}")]
    Input(String),
    #[error("page fetch failed: {0}")]
    Fetch(String),
    #[error("no confirmed media candidate found")]
    NoCandidateFound,
    #[error("page render exceeded {0:?}")]
    RenderTimeout(Duration),
    #[error("page render failed: {0}")]
    Render(String),
    #[error("discovery exceeded its {0:?} budget")]
    DeadlineExceeded(Duration),
}

impl DiscoveryError {
    /// `NoCandidateFound` is an expected outcome, everything else is a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiscoveryError::NoCandidateFound)
    }
}

impl From<TransportError> for DiscoveryError {
    fn from(error: TransportError) -> Self {
        DiscoveryError::Fetch(error.to_string())
    }
}

impl From<BrowserError> for DiscoveryError {
    fn from(error: BrowserError) -> Self {
        match error {
            BrowserError::Timeout(budget) => DiscoveryError::RenderTimeout(budget),
            other => DiscoveryError::Render(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("empty candidate")]
    Empty,
    #[error("unparseable url {raw}: {source}")]
    Parse {
        raw: String,
        source: url::ParseError,
    },
    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_timeout_keeps_its_budget() {
        let err = DiscoveryError::from(BrowserError::Timeout(Duration::from_secs(30)));
        assert!(matches!(err, DiscoveryError::RenderTimeout(budget) if budget == Duration::from_secs(30)));
        let err = DiscoveryError::from(BrowserError::Launch("no chromium".to_string()));
        assert!(matches!(err, DiscoveryError::Render(_)));
    }

    #[test]
    fn only_missing_media_counts_as_not_found() {
        assert!(DiscoveryError::NoCandidateFound.is_not_found());
        let fetch = DiscoveryError::from(TransportError::Timeout("https://site.test/".to_string()));
        assert!(matches!(fetch, DiscoveryError::Fetch(_)));
        assert!(!fetch.is_not_found());
    }
}
