//! Presenting the authorization page to the user

use tracing::info;
use url::Url;

use crate::error::ConnectionError;

/// Something that can show a URL to the user
pub trait UserAgent: Send + Sync {
    fn open(&self, url: &Url) -> Result<(), ConnectionError>;
}

/// The desktop's default web browser
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl UserAgent for SystemBrowser {
    fn open(&self, url: &Url) -> Result<(), ConnectionError> {
        info!("Opening browser for authorization");
        open::that(url.as_str()).map_err(|e| ConnectionError::AuthorizationFailed {
            reason: format!("Failed to open browser: {}", e),
        })
    }
}

/// Print the URL instead of launching anything (headless sessions)
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintUrl;

impl UserAgent for PrintUrl {
    fn open(&self, url: &Url) -> Result<(), ConnectionError> {
        eprintln!("Open this URL in a browser to authorize:\n\n  {}\n", url);
        Ok(())
    }
}
