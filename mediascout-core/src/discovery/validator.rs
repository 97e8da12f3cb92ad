use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::debug;

use crate::config::ScoutConfig;

use super::transport::{FetchRequest, FetchResponse, HttpTransport, TransportError};
use super::types::{
    path_extension, Evidence, MediaCandidate, MediaFormat, ValidationResult,
    BINARY_MEDIA_EXTENSIONS,
};

/// Status codes meaning "this server does not do HEAD", answered with a ranged GET.
const HEAD_UNSUPPORTED: &[u16] = &[400, 403, 405, 501];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const EBML_MAGIC: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];

pub struct CandidateValidator {
    transport: Arc<dyn HttpTransport>,
    user_agent: String,
    probe_timeout: Duration,
    sniff_bytes: u64,
    max_concurrency: usize,
}

impl CandidateValidator {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &ScoutConfig) -> Self {
        Self {
            transport,
            user_agent: config.http.user_agent.clone(),
            probe_timeout: config.http.probe_timeout(),
            sniff_bytes: config.http.sniff_bytes,
            max_concurrency: config.discovery.max_concurrent_probes.max(1),
        }
    }

    /// Probes one candidate: content-type header first, leading bytes second.
    /// Never fails; transport errors reject the candidate.
    pub async fn validate(
        &self,
        candidate: MediaCandidate,
        referer: Option<&str>,
    ) -> ValidationResult {
        let url = candidate.url.clone();
        let extension = path_extension(&url);

        let head = match self.probe(&url, FetchRequest::head(), referer).await {
            Ok(response) => response,
            Err(err) => {
                debug!(target: "discovery.validator", url = %url, error = %err, "header probe failed");
                return ValidationResult::rejected(candidate, 1);
            }
        };

        let mut requests = 1u8;
        let mut sniffed: Option<FetchResponse> = None;
        let header_response = if HEAD_UNSUPPORTED.contains(&head.status) {
            requests += 1;
            match self.probe(&url, self.sniff_request(), referer).await {
                Ok(response) => {
                    sniffed = Some(response.clone());
                    response
                }
                Err(err) => {
                    debug!(target: "discovery.validator", url = %url, error = %err, "ranged fallback failed");
                    return ValidationResult::rejected(candidate, requests);
                }
            }
        } else {
            head
        };

        if header_response.is_success() {
            if let Some(format) = header_response
                .content_type()
                .and_then(|value| format_from_content_type(value, extension.as_deref()))
            {
                debug!(target: "discovery.validator", url = %url, %format, "confirmed by content type");
                return ValidationResult::confirmed(
                    candidate,
                    format,
                    Evidence::ContentTypeHeader,
                    requests,
                );
            }
        }

        let body_response = match sniffed {
            Some(response) => response,
            None => {
                requests += 1;
                match self.probe(&url, self.sniff_request(), referer).await {
                    Ok(response) => response,
                    Err(err) => {
                        debug!(target: "discovery.validator", url = %url, error = %err, "signature probe failed");
                        return ValidationResult::rejected(candidate, requests);
                    }
                }
            }
        };

        if !body_response.is_success() {
            debug!(target: "discovery.validator", url = %url, status = body_response.status, "rejected");
            return ValidationResult::rejected(candidate, requests);
        }
        match sniff(&body_response.body) {
            Some(format) => {
                debug!(target: "discovery.validator", url = %url, %format, "confirmed by signature");
                ValidationResult::confirmed(candidate, format, Evidence::MagicBytes, requests)
            }
            None => {
                debug!(target: "discovery.validator", url = %url, "no known signature");
                ValidationResult::rejected(candidate, requests)
            }
        }
    }

    /// Validates every candidate with bounded concurrency. Probes still running
    /// at `deadline` are reported `Unknown`. Output is ordered by sequence.
    pub async fn validate_all(
        &self,
        candidates: Vec<MediaCandidate>,
        referer: Option<&str>,
        deadline: Option<Instant>,
    ) -> Vec<ValidationResult> {
        let mut results: Vec<ValidationResult> = stream::iter(candidates)
            .map(|candidate| async move {
                let Some(deadline) = deadline else {
                    return self.validate(candidate, referer).await;
                };
                let fallback = candidate.clone();
                match timeout_at(deadline, self.validate(candidate, referer)).await {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(target: "discovery.validator", url = %fallback.url, "probe cut by deadline");
                        ValidationResult::unknown(fallback)
                    }
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;
        results.sort_by_key(|result| result.candidate().sequence);
        results
    }

    fn sniff_request(&self) -> FetchRequest {
        FetchRequest::ranged(self.sniff_bytes)
    }

    async fn probe(
        &self,
        url: &str,
        request: FetchRequest,
        referer: Option<&str>,
    ) -> Result<FetchResponse, TransportError> {
        let mut request = request
            .header("user-agent", self.user_agent.as_str())
            .timeout(self.probe_timeout);
        if let Some(referer) = referer {
            request = request.header("referer", referer);
        }
        match timeout(self.probe_timeout, self.transport.fetch(url, request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(url.to_string())),
        }
    }
}

/// Maps a `Content-Type` value to a format when it is on the media allowlist.
/// Generic binary types only count for binary container extensions.
pub fn format_from_content_type(value: &str, extension: Option<&str>) -> Option<MediaFormat> {
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let from_extension = extension.and_then(MediaFormat::from_extension);

    match essence.as_str() {
        "application/x-mpegurl" | "application/vnd.apple.mpegurl" | "audio/mpegurl"
        | "audio/x-mpegurl" => Some(MediaFormat::Hls),
        "application/dash+xml" => Some(MediaFormat::Dash),
        "video/mp4" | "audio/mp4" => Some(MediaFormat::Mp4),
        "video/webm" | "audio/webm" | "video/x-matroska" => Some(MediaFormat::Webm),
        "application/octet-stream" | "binary/octet-stream" => {
            let extension = extension?.to_ascii_lowercase();
            if BINARY_MEDIA_EXTENSIONS.contains(&extension.as_str()) {
                Some(from_extension.unwrap_or(MediaFormat::Other))
            } else {
                None
            }
        }
        other if other.starts_with("video/") || other.starts_with("audio/") => {
            Some(from_extension.unwrap_or(MediaFormat::Other))
        }
        _ => None,
    }
}

/// Identifies a media format from the first bytes of a response body.
pub fn sniff(prefix: &[u8]) -> Option<MediaFormat> {
    let body = prefix.strip_prefix(UTF8_BOM).unwrap_or(prefix);
    if body.starts_with(b"#EXT") {
        return Some(MediaFormat::Hls);
    }
    if body.len() >= 8 && &body[4..8] == b"ftyp" {
        return Some(MediaFormat::Mp4);
    }
    if body.starts_with(EBML_MAGIC) {
        return Some(MediaFormat::Webm);
    }
    let start = body
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(body.len());
    let xml = &body[start..];
    if xml.starts_with(b"<") && xml.windows(4).any(|window| window == b"<MPD") {
        return Some(MediaFormat::Dash);
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::discovery::transport::{FetchMethod, TransportResult};
    use crate::discovery::types::{DiscoveredVia, ValidationStatus};

    #[derive(Default)]
    struct MockTransport {
        routes: HashMap<(String, FetchMethod), Result<FetchResponse, TransportError>>,
        calls: Mutex<Vec<(String, FetchRequest)>>,
    }

    impl MockTransport {
        fn respond(mut self, url: &str, method: FetchMethod, status: u16, content_type: &str, body: &[u8]) -> Self {
            let mut headers = HashMap::new();
            if !content_type.is_empty() {
                headers.insert("content-type".to_string(), content_type.to_string());
            }
            self.routes.insert(
                (url.to_string(), method),
                Ok(FetchResponse {
                    status,
                    headers,
                    final_url: url.to_string(),
                    body: body.to_vec(),
                }),
            );
            self
        }

        fn fail(mut self, url: &str, method: FetchMethod) -> Self {
            self.routes.insert(
                (url.to_string(), method),
                Err(TransportError::Connect {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                }),
            );
            self
        }

        fn calls_for(&self, url: &str) -> Vec<FetchRequest> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(called, _)| called == url)
                .map(|(_, request)| request.clone())
                .collect()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn fetch(&self, url: &str, request: FetchRequest) -> TransportResult<FetchResponse> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), request.clone()));
            self.routes
                .get(&(url.to_string(), request.method))
                .cloned()
                .unwrap_or_else(|| {
                    Ok(FetchResponse {
                        status: 404,
                        headers: HashMap::new(),
                        final_url: url.to_string(),
                        body: Vec::new(),
                    })
                })
        }
    }

    fn candidate(url: &str, sequence: usize) -> MediaCandidate {
        MediaCandidate {
            url: url.to_string(),
            discovered_via: DiscoveredVia::StaticPattern,
            content_type_hint: None,
            sequence,
        }
    }

    fn validator(transport: Arc<MockTransport>) -> CandidateValidator {
        CandidateValidator::new(transport, &ScoutConfig::default())
    }

    #[tokio::test]
    async fn content_type_header_confirms_in_one_request() {
        let url = "https://cdn.test/a.mp4";
        let transport = Arc::new(MockTransport::default().respond(url, FetchMethod::Head, 200, "video/mp4", b""));
        let result = validator(transport.clone())
            .validate(candidate(url, 0), Some("https://site.test/watch"))
            .await;
        assert_eq!(result.status(), ValidationStatus::Confirmed);
        assert_eq!(result.detected_format(), Some(MediaFormat::Mp4));
        assert_eq!(result.evidence(), Evidence::ContentTypeHeader);
        assert_eq!(result.requests_issued(), 1);

        let calls = transport.calls_for(url);
        assert!(calls[0]
            .headers
            .iter()
            .any(|(name, value)| name == "referer" && value == "https://site.test/watch"));
        assert!(calls[0].headers.iter().any(|(name, _)| name == "user-agent"));
    }

    #[tokio::test]
    async fn octet_stream_playlist_is_confirmed_by_signature() {
        let url = "https://cdn.test/live/index.m3u8";
        let transport = Arc::new(
            MockTransport::default()
                .respond(url, FetchMethod::Head, 200, "application/octet-stream", b"")
                .respond(url, FetchMethod::Get, 206, "application/octet-stream", b"#EXTM3U\n#EXT-X-VERSION:3\n"),
        );
        let result = validator(transport.clone()).validate(candidate(url, 0), None).await;
        assert_eq!(result.detected_format(), Some(MediaFormat::Hls));
        assert_eq!(result.evidence(), Evidence::MagicBytes);
        assert_eq!(result.requests_issued(), 2);
        assert_eq!(transport.calls_for(url)[1].range_bytes, Some(1024));
    }

    #[tokio::test]
    async fn missing_resource_is_rejected_after_both_tiers() {
        let url = "https://cdn.test/gone.mp4";
        let transport = Arc::new(MockTransport::default());
        let result = validator(transport.clone()).validate(candidate(url, 0), None).await;
        assert_eq!(result.status(), ValidationStatus::Rejected);
        assert_eq!(result.detected_format(), None);
        assert_eq!(transport.calls_for(url).len(), 2);
    }

    #[tokio::test]
    async fn head_not_allowed_falls_back_to_single_ranged_get() {
        let url = "https://cdn.test/clip.webm";
        let transport = Arc::new(
            MockTransport::default()
                .respond(url, FetchMethod::Head, 405, "", b"")
                .respond(url, FetchMethod::Get, 206, "text/plain", &[0x1A, 0x45, 0xDF, 0xA3, 0x01]),
        );
        let result = validator(transport.clone()).validate(candidate(url, 0), None).await;
        assert_eq!(result.detected_format(), Some(MediaFormat::Webm));
        assert_eq!(result.evidence(), Evidence::MagicBytes);
        assert_eq!(result.requests_issued(), 2);
        assert_eq!(transport.calls_for(url).len(), 2);
    }

    #[tokio::test]
    async fn failing_candidate_does_not_affect_others() {
        let bad = "https://down.test/a.m3u8";
        let good = "https://cdn.test/b.m3u8";
        let transport = Arc::new(
            MockTransport::default()
                .fail(bad, FetchMethod::Head)
                .respond(good, FetchMethod::Head, 200, "application/vnd.apple.mpegurl", b""),
        );
        let results = validator(transport)
            .validate_all(vec![candidate(bad, 0), candidate(good, 1)], None, None)
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status(), ValidationStatus::Rejected);
        assert_eq!(results[1].status(), ValidationStatus::Confirmed);
        assert_eq!(results[1].detected_format(), Some(MediaFormat::Hls));
    }

    struct SlowTransport;

    #[async_trait]
    impl HttpTransport for SlowTransport {
        async fn fetch(&self, url: &str, _request: FetchRequest) -> TransportResult<FetchResponse> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let mut headers = HashMap::new();
            headers.insert("content-type".to_string(), "video/mp4".to_string());
            Ok(FetchResponse {
                status: 200,
                headers,
                final_url: url.to_string(),
                body: Vec::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probes_past_the_deadline_are_unknown() {
        let validator = CandidateValidator::new(Arc::new(SlowTransport), &ScoutConfig::default());
        let deadline = Instant::now() + Duration::from_secs(1);
        let results = validator
            .validate_all(
                vec![candidate("https://cdn.test/a.mp4", 0), candidate("https://cdn.test/b.mp4", 1)],
                None,
                Some(deadline),
            )
            .await;
        assert!(results
            .iter()
            .all(|result| result.status() == ValidationStatus::Unknown));
        assert_eq!(results[0].candidate().sequence, 0);
    }

    #[test]
    fn signature_table() {
        assert_eq!(sniff(b"#EXTM3U\n"), Some(MediaFormat::Hls));
        assert_eq!(sniff(b"\xEF\xBB\xBF#EXTM3U\n"), Some(MediaFormat::Hls));
        assert_eq!(sniff(b"\x00\x00\x00\x20ftypisom"), Some(MediaFormat::Mp4));
        assert_eq!(sniff(&[0x1A, 0x45, 0xDF, 0xA3, 0x9F]), Some(MediaFormat::Webm));
        assert_eq!(
            sniff(b"<?xml version=\"1.0\"?>\n<MPD xmlns=\"urn:mpeg:dash:schema:mpd:2011\">"),
            Some(MediaFormat::Dash)
        );
        assert_eq!(sniff(b"<!DOCTYPE html><html>"), None);
        assert_eq!(sniff(b""), None);
    }

    #[test]
    fn content_type_allowlist() {
        assert_eq!(
            format_from_content_type("Application/VND.Apple.MPEGURL; charset=utf-8", None),
            Some(MediaFormat::Hls)
        );
        assert_eq!(format_from_content_type("video/mp2t", Some("ts")), Some(MediaFormat::Other));
        assert_eq!(
            format_from_content_type("application/octet-stream", Some("mp4")),
            Some(MediaFormat::Mp4)
        );
        assert_eq!(format_from_content_type("application/octet-stream", Some("m3u8")), None);
        assert_eq!(format_from_content_type("text/html", Some("mp4")), None);
    }
}
