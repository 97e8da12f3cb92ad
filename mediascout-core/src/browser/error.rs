use std::time::Duration;

use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("page did not settle within {0:?}")]
    Timeout(Duration),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
}
