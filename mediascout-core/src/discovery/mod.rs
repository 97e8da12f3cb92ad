mod error;
mod metrics;
mod normalize;
mod observer;
mod patterns;
mod pipeline;
mod ranker;
mod transport;
mod types;
mod validator;

pub use error::{DiscoveryError, DiscoveryResult, NormalizationError};
pub use metrics::DiscoveryMetrics;
pub use normalize::{normalize, CandidateSet};
pub use observer::{is_media_request, NetworkCapture, NetworkObserver};
pub use patterns::{PatternExtractor, RecognizerRule};
pub use pipeline::{parse_page_url, DiscoveryReport, MediaDiscovery};
pub use ranker::{rank, select};
pub use transport::{
    FetchMethod, FetchRequest, FetchResponse, HttpTransport, ReqwestTransport, TransportError,
    TransportResult,
};
pub use types::{
    path_extension, DiscoveredVia, Evidence, MediaCandidate, MediaFormat, RawCandidate,
    ValidationResult, ValidationStatus, BINARY_MEDIA_EXTENSIONS, MEDIA_EXTENSIONS,
};
pub use validator::{format_from_content_type, sniff, CandidateValidator};
