use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::browser::{BrowserError, PageRenderer, WaitPolicy};
use crate::config::{PageSource, ScoutConfig};

use super::error::{DiscoveryError, DiscoveryResult};
use super::metrics::DiscoveryMetrics;
use super::normalize::CandidateSet;
use super::observer::NetworkObserver;
use super::patterns::PatternExtractor;
use super::ranker;
use super::transport::{FetchRequest, HttpTransport};
use super::types::{DiscoveredVia, MediaCandidate, ValidationResult};
use super::validator::CandidateValidator;

/// Everything one discovery run learned about a page.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub request_id: Uuid,
    pub page_url: String,
    pub page_source: PageSource,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// One entry per candidate, in discovery order.
    pub results: Vec<ValidationResult>,
    pub winner: Option<ValidationResult>,
    pub metrics: DiscoveryMetrics,
}

impl DiscoveryReport {
    pub fn winner_url(&self) -> Option<&str> {
        self.winner.as_ref().map(ValidationResult::url)
    }
}

/// Page URL in, single playable media URL out.
pub struct MediaDiscovery {
    config: ScoutConfig,
    transport: Arc<dyn HttpTransport>,
    renderer: Option<Arc<dyn PageRenderer>>,
    extractor: PatternExtractor,
    observer: NetworkObserver,
    validator: CandidateValidator,
}

impl MediaDiscovery {
    pub fn new(
        config: ScoutConfig,
        transport: Arc<dyn HttpTransport>,
        renderer: Option<Arc<dyn PageRenderer>>,
    ) -> Self {
        let observer = NetworkObserver::from_config(&config.observer);
        let validator = CandidateValidator::new(Arc::clone(&transport), &config);
        Self {
            config,
            transport,
            renderer,
            extractor: PatternExtractor::new(),
            observer,
            validator,
        }
    }

    pub fn config(&self) -> &ScoutConfig {
        &self.config
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport)
    }

    /// Best confirmed media URL for the page, or `NoCandidateFound`.
    pub async fn discover(&self, page_url: &str) -> DiscoveryResult<String> {
        self.discover_with(page_url, self.config.discovery.page_source)
            .await
    }

    pub async fn discover_with(
        &self,
        page_url: &str,
        source: PageSource,
    ) -> DiscoveryResult<String> {
        let report = self.report_with(page_url, source).await?;
        report
            .winner_url()
            .map(str::to_string)
            .ok_or(DiscoveryError::NoCandidateFound)
    }

    /// Normalized candidates without probing them.
    pub async fn scan(&self, page_url: &str) -> DiscoveryResult<Vec<MediaCandidate>> {
        self.scan_with(page_url, self.config.discovery.page_source)
            .await
    }

    pub async fn scan_with(
        &self,
        page_url: &str,
        source: PageSource,
    ) -> DiscoveryResult<Vec<MediaCandidate>> {
        let page = parse_page_url(page_url)?;
        let deadline = Instant::now() + self.config.discovery.deadline();
        let mut metrics = DiscoveryMetrics::default();
        let candidates = self.gather(&page, source, deadline, &mut metrics).await?;
        debug!(page = %page, source = ?source, candidates = candidates.len(), "scan finished");
        Ok(candidates.into_candidates())
    }

    pub async fn report(&self, page_url: &str) -> DiscoveryResult<DiscoveryReport> {
        self.report_with(page_url, self.config.discovery.page_source)
            .await
    }

    /// `report` with `page_source` overriding the configured one.
    pub async fn report_with(
        &self,
        page_url: &str,
        page_source: PageSource,
    ) -> DiscoveryResult<DiscoveryReport> {
        let page = parse_page_url(page_url)?;
        let request_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = started + self.config.discovery.deadline();
        info!(
            %request_id,
            page = %page,
            source = ?page_source,
            "media discovery started"
        );

        let mut metrics = DiscoveryMetrics::default();
        let candidates = match self.gather(&page, page_source, deadline, &mut metrics).await {
            Ok(candidates) => candidates.into_candidates(),
            Err(err) => {
                warn!(%request_id, page = %page, error = %err, "page acquisition failed");
                return Err(err);
            }
        };
        metrics.record_candidates(candidates.len() as u64);
        for candidate in &candidates {
            debug!(
                %request_id,
                url = %candidate.url,
                via = ?candidate.discovered_via,
                sequence = candidate.sequence,
                "candidate queued"
            );
        }

        let results = self
            .validator
            .validate_all(candidates, Some(page.as_str()), Some(deadline))
            .await;
        for result in &results {
            metrics.record_validation(result);
        }
        let winner = ranker::select(&results).cloned();
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            %request_id,
            candidates = results.len(),
            confirmed = metrics.confirmed,
            unknown = metrics.unknown,
            winner = winner.as_ref().map(ValidationResult::url).unwrap_or("-"),
            elapsed_ms,
            "media discovery finished"
        );

        Ok(DiscoveryReport {
            request_id,
            page_url: page.to_string(),
            page_source,
            started_at,
            elapsed_ms,
            results,
            winner,
            metrics,
        })
    }

    async fn gather(
        &self,
        page: &Url,
        source: PageSource,
        deadline: Instant,
        metrics: &mut DiscoveryMetrics,
    ) -> DiscoveryResult<CandidateSet> {
        let acquire = async {
            match source {
                PageSource::Static => self.gather_static(page, metrics).await,
                PageSource::Rendered => self.gather_rendered(page, metrics).await,
            }
        };
        match timeout_at(deadline, acquire).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::DeadlineExceeded(
                self.config.discovery.deadline(),
            )),
        }
    }

    async fn gather_static(
        &self,
        page: &Url,
        metrics: &mut DiscoveryMetrics,
    ) -> DiscoveryResult<CandidateSet> {
        let (base, content) = self.fetch_page(page).await?;
        metrics.record_page_fetch();
        let candidates = CandidateSet::new();
        let mut inserted = 0u64;
        for url in self.extractor.candidates(&content, &base) {
            if candidates.insert(&url, DiscoveredVia::StaticPattern) {
                inserted += 1;
            }
        }
        metrics.record_static_matches(inserted);
        Ok(candidates)
    }

    async fn gather_rendered(
        &self,
        page: &Url,
        metrics: &mut DiscoveryMetrics,
    ) -> DiscoveryResult<CandidateSet> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| DiscoveryError::Render("no page renderer configured".to_string()))?;
        let wait = WaitPolicy::Settle(Duration::from_millis(self.config.browser.settle_ms));
        let budget = self.config.browser.render_timeout();

        let content = renderer.render_and_get_content(page.as_str(), wait, budget);
        let network = async {
            let requests = renderer
                .observe_outbound_requests(page.as_str(), wait, budget)
                .await?;
            Ok::<_, BrowserError>(self.observer.observe(requests).await)
        };
        let (content, capture) = tokio::join!(content, network);

        let capture = match capture {
            Ok(capture) => {
                metrics.record_network_events(capture.observed as u64, capture.matches.len() as u64);
                capture.matches
            }
            Err(err) => {
                warn!(page = %page, error = %err, "network observation failed");
                Vec::new()
            }
        };

        let content = content.map_err(|err| {
            warn!(
                page = %page,
                error = %err,
                network_matches = capture.len(),
                "render failed"
            );
            DiscoveryError::from(err)
        })?;
        metrics.record_page_render();

        let candidates = CandidateSet::new();
        let mut inserted = 0u64;
        for url in self.extractor.candidates(&content, page) {
            if candidates.insert(&url, DiscoveredVia::StaticPattern) {
                inserted += 1;
            }
        }
        metrics.record_static_matches(inserted);
        for raw in &capture {
            candidates.insert_raw(raw, page, DiscoveredVia::NetworkTraffic);
        }
        Ok(candidates)
    }

    /// GETs the page; the base for relative links is the post-redirect URL.
    async fn fetch_page(&self, page: &Url) -> DiscoveryResult<(Url, String)> {
        let page_timeout = self.config.http.page_timeout();
        let request = FetchRequest::get()
            .header("user-agent", self.config.http.user_agent.as_str())
            .body_limit(self.config.http.max_page_bytes)
            .timeout(page_timeout);
        let response = timeout(page_timeout, self.transport.fetch(page.as_str(), request))
            .await
            .map_err(|_| DiscoveryError::Fetch(format!("{page} timed out after {page_timeout:?}")))??;
        if !response.is_success() {
            return Err(DiscoveryError::Fetch(format!(
                "{page} returned status {}",
                response.status
            )));
        }
        let base = Url::parse(&response.final_url).unwrap_or_else(|_| page.clone());
        Ok((base, String::from_utf8_lossy(&response.body).into_owned()))
    }
}

/// Rejects missing, malformed or non-http(s) page URLs before any I/O.
pub fn parse_page_url(raw: &str) -> DiscoveryResult<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DiscoveryError::Input("page url is missing".to_string()));
    }
    let url = Url::parse(raw).map_err(|err| DiscoveryError::Input(format!("{raw}: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DiscoveryError::Input(format!(
            "{raw}: unsupported scheme {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_url_must_be_absolute_http() {
        assert!(parse_page_url("https://example.com/watch?v=1").is_ok());
        assert!(matches!(parse_page_url("   "), Err(DiscoveryError::Input(_))));
        assert!(matches!(parse_page_url("/relative/page"), Err(DiscoveryError::Input(_))));
        assert!(matches!(
            parse_page_url("ftp://example.com/file.mp4"),
            Err(DiscoveryError::Input(_))
        ));
    }
}
