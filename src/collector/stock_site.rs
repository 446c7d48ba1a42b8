/// Search-page collector for the stock site
use super::extract::extract_candidates;
use super::{Batch, PageToken, ResultCollector, SessionContext};
use crate::config::ScraperConfig;
use crate::error::CollectorError;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const BACKOFF_BASE_MS: u64 = 500;

/// Outcome of fetching one page from one search URL
enum PageFetch {
    Html(String),
    Failed(String),
}

/// Scrapes search result pages, one page per batch
pub struct StockSiteCollector {
    session: Arc<SessionContext>,
    search_urls: Vec<String>,
    page_size: u32,
    max_retries: u32,
    backoff_base: Duration,
}

impl StockSiteCollector {
    pub fn new(session: Arc<SessionContext>, config: &ScraperConfig) -> Self {
        Self {
            session,
            search_urls: config.search_urls.clone(),
            page_size: config.page_size,
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
        }
    }

    /// Override the base retry delay
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Page number carried by a token; the first page when there is none
    pub fn page_number(token: Option<&PageToken>) -> u32 {
        token
            .and_then(|t| t.as_str().parse::<u32>().ok())
            .filter(|page| *page > 0)
            .unwrap_or(1)
    }

    /// Search URL for one page of a query
    pub fn search_url(&self, base: &str, query: &str, page: u32) -> Result<Url, CollectorError> {
        let url = Url::parse_with_params(
            base,
            &[
                ("k", query.to_string()),
                ("content_type:video", "1".to_string()),
                ("order", "relevance".to_string()),
                ("safe_search", "1".to_string()),
                ("search_page", page.to_string()),
                ("limit", self.page_size.to_string()),
            ],
        )?;
        Ok(url)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }

    async fn fetch_page(&self, url: &Url) -> Result<PageFetch, CollectorError> {
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt - 1);
                debug!("Retrying {} in {:?} (attempt {})", url, delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }

            self.session.note_request();
            let response = match self.session.client().get(url.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = e.to_string();
                    warn!("Request failed for {}: {}", url, e);
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(CollectorError::AuthenticationRequired(format!(
                    "HTTP {} from {}",
                    status, url
                )));
            }
            if !status.is_success() {
                last_error = format!("HTTP error {}", status);
                warn!("HTTP error {}: {}", status, url);
                continue;
            }

            match response.text().await {
                Ok(html) => {
                    debug!("📄 Downloaded {} characters of HTML content", html.len());
                    return Ok(PageFetch::Html(html));
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!("Failed to read body from {}: {}", url, e);
                }
            }
        }

        Ok(PageFetch::Failed(last_error))
    }
}

#[async_trait]
impl ResultCollector for StockSiteCollector {
    async fn next_batch(&self, query: &str, page: Option<&PageToken>) -> Result<Batch, CollectorError> {
        let page_number = Self::page_number(page);
        let following = Some(PageToken::new((page_number + 1).to_string()));
        info!("🔍 Searching page {} for: {}", page_number, query);

        let mut fetched_any = false;
        for base in &self.search_urls {
            let url = self.search_url(base, query, page_number)?;
            match self.fetch_page(&url).await? {
                PageFetch::Html(html) => {
                    fetched_any = true;
                    let items = extract_candidates(&html);
                    if !items.is_empty() {
                        return Ok(Batch {
                            items,
                            next_page: following,
                        });
                    }
                    debug!("No candidates on {}", url);
                }
                PageFetch::Failed(reason) => {
                    warn!("Giving up on {} after retries: {}", url, reason);
                }
            }
        }

        if fetched_any {
            // the site answered but has nothing more for this query
            info!("📭 No more results for: {}", query);
            Ok(Batch::default())
        } else {
            Ok(Batch {
                items: Vec::new(),
                next_page: following,
            })
        }
    }
}
