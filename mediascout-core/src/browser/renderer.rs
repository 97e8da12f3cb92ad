use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::error::BrowserResult;

/// Outbound request URLs in the order the page issued them. Ends when the
/// observation budget runs out or the page goes away.
pub type RequestStream = BoxStream<'static, String>;

/// How long a page is left running once navigation has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    Navigation,
    Settle(Duration),
}

impl WaitPolicy {
    pub fn settle_time(&self) -> Duration {
        match self {
            WaitPolicy::Navigation => Duration::ZERO,
            WaitPolicy::Settle(duration) => *duration,
        }
    }
}

/// A script-executing page loader.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Serialized DOM after the page has loaded and settled.
    async fn render_and_get_content(
        &self,
        url: &str,
        wait: WaitPolicy,
        timeout: Duration,
    ) -> BrowserResult<String>;

    /// Loads the page and streams the URL of every request it sends.
    async fn observe_outbound_requests(
        &self,
        url: &str,
        wait: WaitPolicy,
        timeout: Duration,
    ) -> BrowserResult<RequestStream>;
}
