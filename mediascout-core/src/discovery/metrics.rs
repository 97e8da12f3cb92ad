use serde::{Deserialize, Serialize};

use super::types::{ValidationResult, ValidationStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryMetrics {
    pub pages_fetched: u64,
    pub pages_rendered: u64,
    pub network_requests: u64,
    pub network_matches: u64,
    pub static_matches: u64,
    pub candidates: u64,
    pub probes_issued: u64,
    pub confirmed: u64,
    pub rejected: u64,
    pub unknown: u64,
}

impl DiscoveryMetrics {
    pub fn record_page_fetch(&mut self) {
        self.pages_fetched = self.pages_fetched.saturating_add(1);
    }

    pub fn record_page_render(&mut self) {
        self.pages_rendered = self.pages_rendered.saturating_add(1);
    }

    pub fn record_network_events(&mut self, observed: u64, matched: u64) {
        self.network_requests = self.network_requests.saturating_add(observed);
        self.network_matches = self.network_matches.saturating_add(matched);
    }

    pub fn record_static_matches(&mut self, count: u64) {
        self.static_matches = self.static_matches.saturating_add(count);
    }

    pub fn record_candidates(&mut self, count: u64) {
        self.candidates = self.candidates.saturating_add(count);
    }

    pub fn record_validation(&mut self, result: &ValidationResult) {
        self.probes_issued = self
            .probes_issued
            .saturating_add(u64::from(result.requests_issued()));
        match result.status() {
            ValidationStatus::Confirmed => self.confirmed = self.confirmed.saturating_add(1),
            ValidationStatus::Rejected => self.rejected = self.rejected.saturating_add(1),
            ValidationStatus::Unknown => self.unknown = self.unknown.saturating_add(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::types::{DiscoveredVia, Evidence, MediaCandidate, MediaFormat};

    fn candidate(sequence: usize) -> MediaCandidate {
        MediaCandidate {
            url: format!("https://cdn.test/{sequence}.mp4"),
            discovered_via: DiscoveredVia::StaticPattern,
            content_type_hint: None,
            sequence,
        }
    }

    #[test]
    fn validation_outcomes_are_tallied() {
        let mut metrics = DiscoveryMetrics::default();
        metrics.record_validation(&ValidationResult::confirmed(
            candidate(0),
            MediaFormat::Mp4,
            Evidence::ContentTypeHeader,
            1,
        ));
        metrics.record_validation(&ValidationResult::rejected(candidate(1), 2));
        metrics.record_validation(&ValidationResult::unknown(candidate(2)));
        metrics.record_validation(&ValidationResult::rejected(candidate(3), 2));
        assert_eq!(metrics.probes_issued, 5);
        assert_eq!((metrics.confirmed, metrics.rejected, metrics.unknown), (1, 2, 1));
    }

    #[test]
    fn counters_saturate() {
        let mut metrics = DiscoveryMetrics {
            network_requests: u64::MAX,
            ..DiscoveryMetrics::default()
        };
        metrics.record_network_events(3, 1);
        assert_eq!(metrics.network_requests, u64::MAX);
        assert_eq!(metrics.network_matches, 1);
    }
}
