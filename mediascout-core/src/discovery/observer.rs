use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::config::{ObserverPolicy, ObserverSection};

use super::types::{path_extension, MEDIA_EXTENSIONS};

/// Media-looking request URLs seen during one observation window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkCapture {
    /// Matching URLs in arrival order.
    pub matches: Vec<String>,
    /// Every request seen, matching or not.
    pub observed: usize,
    /// `true` when observation stopped because the window ran out.
    pub window_elapsed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct NetworkObserver {
    policy: ObserverPolicy,
    window: Duration,
}

impl NetworkObserver {
    pub fn new(policy: ObserverPolicy, window: Duration) -> Self {
        Self { policy, window }
    }

    pub fn from_config(config: &ObserverSection) -> Self {
        Self::new(config.policy, config.window())
    }

    pub fn policy(&self) -> ObserverPolicy {
        self.policy
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Drains `requests` until the policy is satisfied, the stream ends or
    /// the window elapses, whichever comes first.
    pub async fn observe<S>(&self, requests: S) -> NetworkCapture
    where
        S: Stream<Item = String>,
    {
        let deadline = Instant::now() + self.window;
        let mut capture = NetworkCapture::default();
        futures::pin_mut!(requests);

        loop {
            let next = match timeout_at(deadline, requests.next()).await {
                Ok(next) => next,
                Err(_) => {
                    capture.window_elapsed = true;
                    break;
                }
            };
            let Some(url) = next else {
                break;
            };
            capture.observed += 1;
            if !is_media_request(&url) {
                continue;
            }
            debug!(target: "discovery.observer", url = %url, "media request observed");
            capture.matches.push(url);
            if self.policy == ObserverPolicy::FirstMatch {
                break;
            }
        }

        capture
    }
}

/// Path-only check; a media extension inside the query string does not count.
pub fn is_media_request(url: &str) -> bool {
    if let Ok(parsed) = url::Url::parse(url) {
        if parsed.path().to_ascii_lowercase().contains(".ism/") {
            return true;
        }
    }
    path_extension(url)
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
