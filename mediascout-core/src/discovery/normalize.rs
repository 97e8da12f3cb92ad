use std::collections::HashSet;
use std::sync::Mutex;

use url::Url;

use super::error::NormalizationError;
use super::types::{path_extension, DiscoveredVia, MediaCandidate, MediaFormat};

const DELIMITERS: &[char] = &['"', '\'', '<', '>', ' ', '\t', '\r', '\n'];

/// Turns a raw pattern capture into an absolute http(s) URL.
pub fn normalize(raw: &str, base: &Url) -> Result<Url, NormalizationError> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('"')
        .or_else(|| trimmed.strip_prefix('\''))
        .unwrap_or(trimmed);
    let truncated = match trimmed.find(DELIMITERS) {
        Some(end) => &trimmed[..end],
        None => trimmed,
    };
    if truncated.is_empty() {
        return Err(NormalizationError::Empty);
    }

    let decoded = truncated
        .replace("&amp;", "&")
        .replace("\\u0026", "&")
        .replace("\\/", "/");

    let mut url = match Url::parse(&decoded) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            base.join(&decoded)
                .map_err(|source| NormalizationError::Parse {
                    raw: decoded.clone(),
                    source,
                })?
        }
        Err(source) => {
            return Err(NormalizationError::Parse {
                raw: decoded,
                source,
            })
        }
    };

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(NormalizationError::UnsupportedScheme(other.to_string())),
    }
    url.set_fragment(None);
    escape_decodable(&mut url);
    Ok(url)
}

/// Percent-encodes whatever the decoding pass would still rewrite, so a
/// normalized URL is a fixed point of `normalize`.
fn escape_decodable(url: &mut Url) {
    if url.path().contains("&amp;") {
        let path = url.path().replace("&amp;", "%26amp;");
        url.set_path(&path);
    }
    let query = url
        .query()
        .filter(|query| query.contains("&amp;") || query.contains('\\'))
        .map(|query| query.replace("&amp;", "%26amp;").replace('\\', "%5C"));
    if let Some(query) = query {
        url.set_query(Some(&query));
    }
}

/// Append-only, deduplicating set of candidates for one discovery run.
/// Safe to share between concurrent producers.
#[derive(Debug, Default)]
pub struct CandidateSet {
    inner: Mutex<CandidateSetInner>,
}

#[derive(Debug, Default)]
struct CandidateSetInner {
    seen: HashSet<String>,
    entries: Vec<MediaCandidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the URL is already present; the first
    /// `discovered_via` wins.
    pub fn insert(&self, url: &Url, via: DiscoveredVia) -> bool {
        let key = url.as_str().to_string();
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !inner.seen.insert(key.clone()) {
            return false;
        }
        let sequence = inner.entries.len();
        let content_type_hint = path_extension(&key)
            .and_then(|ext| MediaFormat::mime_for_extension(&ext))
            .map(str::to_string);
        inner.entries.push(MediaCandidate {
            url: key,
            discovered_via: via,
            content_type_hint,
            sequence,
        });
        true
    }

    /// Normalizes then inserts; invalid raw strings are skipped.
    pub fn insert_raw(&self, raw: &str, base: &Url, via: DiscoveredVia) -> bool {
        match normalize(raw, base) {
            Ok(url) => self.insert(&url, via),
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<MediaCandidate> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
            .clone()
    }

    pub fn into_candidates(self) -> Vec<MediaCandidate> {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
    }
}
