/// Explicit HTTP session state shared by the collector and the downloader
use crate::config::Config;
use crate::error::CollectorError;
use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// HTTP client plus cookies for one run.
///
/// Acquired at run start and released with [`SessionContext::release`]
/// (or on drop) at run end; nothing about the session lives in globals.
#[derive(Debug)]
pub struct SessionContext {
    client: Client,
    authenticated: bool,
    requests: std::sync::atomic::AtomicU64,
}

impl SessionContext {
    /// Build the session. With authentication enabled a stored cookie header
    /// must be available, otherwise the run cannot proceed.
    pub async fn acquire(config: &Config) -> Result<Self, CollectorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let authenticated = if config.auth.enabled {
            let cookie = Self::load_cookie(config).await.map_err(|e| {
                CollectorError::AuthenticationRequired(e.to_string())
            })?;
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| CollectorError::AuthenticationRequired(format!("invalid cookie header: {}", e)))?;
            headers.insert(COOKIE, value);
            true
        } else {
            false
        };

        let client = Client::builder()
            .user_agent(config.scraper.user_agent.clone())
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(config.scraper.request_timeout_seconds))
            .build()?;

        info!(
            "🌐 Session acquired ({})",
            if authenticated { "authenticated" } else { "anonymous" }
        );

        Ok(Self {
            client,
            authenticated,
            requests: std::sync::atomic::AtomicU64::new(0),
        })
    }

    async fn load_cookie(config: &Config) -> Result<String> {
        if let Ok(cookie) = std::env::var(&config.auth.cookie_env) {
            if !cookie.trim().is_empty() {
                return Ok(cookie.trim().to_string());
            }
        }

        if let Some(path) = &config.auth.cookie_file {
            let cookie = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| anyhow!("cannot read cookie file {}: {}", path.display(), e))?;
            if !cookie.trim().is_empty() {
                return Ok(cookie.trim().to_string());
            }
        }

        Err(anyhow!(
            "no session cookie found; set {} or auth.cookie_file",
            config.auth.cookie_env
        ))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Count a request against this session
    pub fn note_request(&self) {
        self.requests.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// End the session explicitly
    pub fn release(self) {
        debug!("Session released after {} requests", self.request_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_anonymous_session() {
        let config = Config::default();
        let session = SessionContext::acquire(&config).await.unwrap();
        assert!(!session.is_authenticated());
        session.note_request();
        assert_eq!(session.request_count(), 1);
        session.release();
    }

    #[tokio::test]
    async fn test_auth_without_cookie_is_rejected() {
        let mut config = ConfigBuilder::new().enable_auth(true).build();
        config.auth.cookie_env = "STOCK_SCRAPER_TEST_COOKIE_UNSET".to_string();

        let err = SessionContext::acquire(&config).await.unwrap_err();
        assert!(matches!(err, CollectorError::AuthenticationRequired(_)));
    }

    #[tokio::test]
    async fn test_auth_with_cookie_file() {
        let temp_dir = TempDir::new().unwrap();
        let cookie_path = temp_dir.path().join("cookie.txt");
        tokio::fs::write(&cookie_path, "session=abc; token=def\n").await.unwrap();

        let mut config = ConfigBuilder::new().enable_auth(true).build();
        config.auth.cookie_env = "STOCK_SCRAPER_TEST_COOKIE_UNSET_2".to_string();
        config.auth.cookie_file = Some(cookie_path);

        let session = SessionContext::acquire(&config).await.unwrap();
        assert!(session.is_authenticated());
    }
}
