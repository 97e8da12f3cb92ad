pub mod browser;
pub mod config;
pub mod discovery;
pub mod error;

pub use browser::{BrowserError, ChromiumRenderer, PageRenderer, RequestStream, WaitPolicy};
pub use config::{
    load_scout_config, BrowserSection, DiscoverySection, HttpSection, ObserverPolicy,
    ObserverSection, PageSource, ScoutConfig, ServerSection, DEFAULT_USER_AGENT,
};
pub use discovery::{
    DiscoveryError, DiscoveryReport, DiscoveryResult, HttpTransport, MediaCandidate,
    MediaDiscovery, MediaFormat, ReqwestTransport, ValidationResult,
};
pub use error::{ConfigError, Result};
