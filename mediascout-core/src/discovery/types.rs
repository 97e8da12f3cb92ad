use std::fmt;

use serde::Serialize;

/// Extensions recognised both in page text and in observed network paths.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "m3u8", "mp4", "mpd", "webm", "ts", "m4s", "mkv", "mp3", "aac", "ogg", "ism",
];

/// Container extensions trusted when a server answers with a generic
/// `application/octet-stream`. Playlists are excluded: a text manifest served
/// as octet-stream is sniffed instead.
pub const BINARY_MEDIA_EXTENSIONS: &[&str] =
    &["mp4", "m4s", "m4v", "webm", "mkv", "mp3", "aac", "ogg"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    pub text: String,
    pub source_pattern_id: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveredVia {
    StaticPattern,
    NetworkTraffic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaCandidate {
    pub url: String,
    pub discovered_via: DiscoveredVia,
    pub content_type_hint: Option<String>,
    /// Insertion index in the candidate set.
    pub sequence: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaFormat {
    Hls,
    Mp4,
    Dash,
    Webm,
    Other,
}

impl MediaFormat {
    /// Lower is better.
    pub fn priority(self) -> u8 {
        match self {
            MediaFormat::Hls => 1,
            MediaFormat::Mp4 => 2,
            MediaFormat::Dash | MediaFormat::Webm | MediaFormat::Other => 3,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let format = match ext.to_ascii_lowercase().as_str() {
            "m3u8" => MediaFormat::Hls,
            "mp4" | "m4s" | "m4v" => MediaFormat::Mp4,
            "mpd" => MediaFormat::Dash,
            "webm" | "mkv" => MediaFormat::Webm,
            "ts" | "mp3" | "aac" | "ogg" | "ism" => MediaFormat::Other,
            _ => return None,
        };
        Some(format)
    }

    /// Nominal MIME type for an extension, used as the candidate's content-type hint.
    pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
        let mime = match ext.to_ascii_lowercase().as_str() {
            "m3u8" => "application/vnd.apple.mpegurl",
            "mp4" | "m4v" => "video/mp4",
            "m4s" => "video/iso.segment",
            "mpd" => "application/dash+xml",
            "webm" => "video/webm",
            "mkv" => "video/x-matroska",
            "ts" => "video/mp2t",
            "mp3" => "audio/mpeg",
            "aac" => "audio/aac",
            "ogg" => "audio/ogg",
            "ism" => "application/vnd.ms-sstr+xml",
            _ => return None,
        };
        Some(mime)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MediaFormat::Hls => "hls",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Dash => "dash",
            MediaFormat::Webm => "webm",
            MediaFormat::Other => "other",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Confirmed,
    Rejected,
    /// The probe did not finish inside the discovery budget.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    ContentTypeHeader,
    MagicBytes,
    None,
}

/// Outcome of probing one candidate. `detected_format` is only ever set on
/// confirmed results; construct through [`ValidationResult::confirmed`],
/// [`ValidationResult::rejected`] or [`ValidationResult::unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    candidate: MediaCandidate,
    status: ValidationStatus,
    detected_format: Option<MediaFormat>,
    evidence: Evidence,
    requests_issued: u8,
}

impl ValidationResult {
    pub fn confirmed(
        candidate: MediaCandidate,
        format: MediaFormat,
        evidence: Evidence,
        requests_issued: u8,
    ) -> Self {
        Self {
            candidate,
            status: ValidationStatus::Confirmed,
            detected_format: Some(format),
            evidence,
            requests_issued,
        }
    }

    pub fn rejected(candidate: MediaCandidate, requests_issued: u8) -> Self {
        Self {
            candidate,
            status: ValidationStatus::Rejected,
            detected_format: None,
            evidence: Evidence::None,
            requests_issued,
        }
    }

    pub fn unknown(candidate: MediaCandidate) -> Self {
        Self {
            candidate,
            status: ValidationStatus::Unknown,
            detected_format: None,
            evidence: Evidence::None,
            requests_issued: 0,
        }
    }

    pub fn candidate(&self) -> &MediaCandidate {
        &self.candidate
    }

    pub fn url(&self) -> &str {
        &self.candidate.url
    }

    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    pub fn detected_format(&self) -> Option<MediaFormat> {
        self.detected_format
    }

    pub fn evidence(&self) -> Evidence {
        self.evidence
    }

    pub fn requests_issued(&self) -> u8 {
        self.requests_issued
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == ValidationStatus::Confirmed
    }
}

/// Lowercased extension of the last path segment, ignoring query and fragment.
pub fn path_extension(url: &str) -> Option<String> {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}
