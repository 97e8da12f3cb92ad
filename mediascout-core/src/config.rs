use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ScoutConfig {
    pub http: HttpSection,
    pub browser: BrowserSection,
    pub observer: ObserverSection,
    pub discovery: DiscoverySection,
    pub server: ServerSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub user_agent: String,
    pub page_timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
    /// Prefix length requested by the byte-signature probe.
    pub sniff_bytes: u64,
    pub max_redirects: usize,
    pub max_page_bytes: usize,
    pub proxy_body_limit_bytes: usize,
}

impl HttpSection {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_timeout_seconds: 30,
            probe_timeout_seconds: 10,
            sniff_bytes: 1024,
            max_redirects: 10,
            max_page_bytes: 8 * 1024 * 1024,
            proxy_body_limit_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub executable_path: String,
    pub headless: bool,
    pub sandbox: bool,
    pub user_agents: Vec<String>,
    pub render_timeout_seconds: u64,
    /// Extra time the page is left running after navigation completes.
    pub settle_ms: u64,
    pub extra_args: Vec<String>,
}

impl BrowserSection {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_seconds)
    }
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            executable_path: "/usr/bin/chromium".to_string(),
            headless: true,
            sandbox: false,
            user_agents: Vec::new(),
            render_timeout_seconds: 30,
            settle_ms: 8000,
            extra_args: vec!["--mute-audio".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverPolicy {
    FirstMatch,
    Windowed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObserverSection {
    pub policy: ObserverPolicy,
    pub window_seconds: u64,
}

impl ObserverSection {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Default for ObserverSection {
    fn default() -> Self {
        Self {
            policy: ObserverPolicy::Windowed,
            window_seconds: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    /// Plain HTTP GET of the page, no script execution.
    Static,
    /// Headless browser: serialized DOM plus observed network traffic.
    Rendered,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub page_source: PageSource,
    pub max_concurrent_probes: usize,
    pub deadline_seconds: u64,
}

impl DiscoverySection {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            page_source: PageSource::Static,
            max_concurrent_probes: 6,
            deadline_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    /// Page source behind `/stream`; `/api/stream` always scans statically.
    pub stream_source: PageSource,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            stream_source: PageSource::Rendered,
        }
    }
}

impl ScoutConfig {
    pub fn validate(&self) -> Result<()> {
        if self.discovery.max_concurrent_probes == 0 {
            return Err(ConfigError::Invalid {
                field: "discovery.max_concurrent_probes",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.http.sniff_bytes < 8 {
            return Err(ConfigError::Invalid {
                field: "http.sniff_bytes",
                reason: "signatures need at least 8 bytes".to_string(),
            });
        }
        if self.discovery.deadline_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "discovery.deadline_seconds",
                reason: "must be positive".to_string(),
            });
        }
        if self.observer.window_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "observer.window_seconds",
                reason: "must be positive".to_string(),
            });
        }
        if self.http.probe_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "http.probe_timeout_seconds",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

pub fn load_scout_config<P: AsRef<Path>>(path: P) -> Result<ScoutConfig> {
    let config: ScoutConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/mediascout.toml");
        let config = load_scout_config(path).expect("config should parse");
        assert_eq!(config.http.sniff_bytes, 1024);
        assert_eq!(config.observer.policy, ObserverPolicy::Windowed);
        assert_eq!(config.discovery.page_source, PageSource::Static);
        assert!(config.browser.user_agents.len() >= 2);
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.server.stream_source, PageSource::Rendered);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[observer]\npolicy = \"first_match\"\n").unwrap();
        let config = load_scout_config(&path).unwrap();
        assert_eq!(config.observer.policy, ObserverPolicy::FirstMatch);
        assert_eq!(config.observer.window_seconds, 8);
        assert_eq!(config.discovery.max_concurrent_probes, 6);
        assert_eq!(config.http.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn zero_probe_concurrency_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[discovery]\nmax_concurrent_probes = 0\n").unwrap();
        let err = load_scout_config(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "discovery.max_concurrent_probes",
                ..
            }
        ));
    }

    #[test]
    fn zero_windows_and_timeouts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("[observer]\nwindow_seconds = 0\n", "observer.window_seconds"),
            ("[http]\nprobe_timeout_seconds = 0\n", "http.probe_timeout_seconds"),
            ("[discovery]\ndeadline_seconds = 0\n", "discovery.deadline_seconds"),
        ];
        for (idx, (content, expected)) in cases.into_iter().enumerate() {
            let path = dir.path().join(format!("zero-{idx}.toml"));
            std::fs::write(&path, content).unwrap();
            match load_scout_config(&path) {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_scout_config("/nonexistent/mediascout.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/mediascout.toml"));
    }
}
