use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, EventRequestWillBeSent};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::config::{BrowserSection, DEFAULT_USER_AGENT};

use super::error::{BrowserError, BrowserResult};
use super::renderer::{PageRenderer, RequestStream, WaitPolicy};

const REQUEST_CHANNEL_CAPACITY: usize = 256;

/// Headless Chromium over CDP. Each call launches a fresh browser so
/// concurrent discoveries never share a page.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    config: Arc<BrowserSection>,
}

impl ChromiumRenderer {
    pub fn new(config: BrowserSection) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BrowserSection {
        &self.config
    }

    fn select_user_agent(&self) -> String {
        let mut rng = rand::thread_rng();
        self.config
            .user_agents
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    fn build_chromium_config(&self, user_agent: &str, timeout: Duration) -> BrowserResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder()
            .chrome_executable(&self.config.executable_path)
            .request_timeout(timeout);

        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }

        let mut args = vec![format!("--user-agent={user_agent}")];
        args.extend(self.config.extra_args.iter().cloned());
        args.push("--disable-background-timer-throttling".into());
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }

    async fn launch(&self, timeout: Duration) -> BrowserResult<RenderSession> {
        let user_agent = self.select_user_agent();
        let chromium_config = self.build_chromium_config(&user_agent, timeout)?;
        info!(
            ua = %user_agent,
            headless = self.config.headless,
            "launching chromium"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        Ok(RenderSession {
            browser,
            handler_task: Some(handler_task),
        })
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render_and_get_content(
        &self,
        url: &str,
        wait: WaitPolicy,
        timeout: Duration,
    ) -> BrowserResult<String> {
        let deadline = Instant::now() + timeout;
        let session = self.launch(timeout).await?;
        let outcome = timeout_at(deadline, async {
            let page = session.blank_page().await?;
            navigate(&page, url).await?;
            sleep(wait.settle_time()).await;
            Ok::<_, BrowserError>(page.content().await?)
        })
        .await;
        session.shutdown().await;

        match outcome {
            Ok(content) => content,
            Err(_) => {
                warn!(url, ?timeout, "render timed out");
                Err(BrowserError::Timeout(timeout))
            }
        }
    }

    async fn observe_outbound_requests(
        &self,
        url: &str,
        wait: WaitPolicy,
        timeout: Duration,
    ) -> BrowserResult<RequestStream> {
        let deadline = Instant::now() + timeout;
        let session = self.launch(timeout).await?;
        let page = match session.blank_page().await {
            Ok(page) => page,
            Err(err) => {
                session.shutdown().await;
                return Err(err);
            }
        };
        let mut events = match page.event_listener::<EventRequestWillBeSent>().await {
            Ok(events) => events,
            Err(err) => {
                session.shutdown().await;
                return Err(err.into());
            }
        };

        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let target = url.to_string();
        tokio::spawn(async move {
            let forward = async {
                loop {
                    tokio::select! {
                        _ = tx.closed() => break,
                        event = events.next() => match event {
                            Some(event) => {
                                if tx.send(event.request.url.clone()).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            };
            let navigate_and_settle = async {
                if let Err(err) = navigate(&page, &target).await {
                    warn!(url = %target, error = %err, "navigation failed while observing");
                }
                sleep(wait.settle_time()).await;
            };
            let watch = async {
                tokio::select! {
                    _ = forward => {}
                    _ = navigate_and_settle => {}
                }
            };
            if timeout_at(deadline, watch).await.is_err() {
                debug!(url = %target, "request observation budget elapsed");
            }
            session.shutdown().await;
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

async fn navigate(page: &Page, url: &str) -> BrowserResult<()> {
    let params = NavigateParams::builder()
        .url(url)
        .build()
        .map_err(BrowserError::Configuration)?;
    page.goto(params)
        .await
        .map_err(|err| BrowserError::Navigation {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
    page.wait_for_navigation().await?;
    Ok(())
}

struct RenderSession {
    browser: Browser,
    handler_task: Option<JoinHandle<()>>,
}

impl RenderSession {
    async fn blank_page(&self) -> BrowserResult<Page> {
        let page = self
            .browser
            .new_page(CreateTargetParams::new("about:blank"))
            .await?;
        page.execute(EnableParams::default()).await?;
        Ok(page)
    }

    async fn shutdown(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "browser handler join error");
            }
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!("render session dropped without explicit shutdown");
                handle.abort();
            }
        }
    }
}
