//! Upstream book sources: a metadata API and a plain-text content API.

use crate::config::ProviderConfig;
use crate::error::FetchError;
use crate::index::BookId;
use crate::Result;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::time::Duration;

/// Source of a book's full text, keyed by numeric id.
pub trait ContentProvider: Send + Sync + 'static {
    fn fetch_content(&self, book_id: BookId) -> impl Future<Output = std::result::Result<String, FetchError>> + Send;
}

/// HTTP client for Gutendex-style metadata and Project Gutenberg plain-text files.
#[derive(Clone)]
pub struct GutenbergClient {
    http: Client,
    metadata_base: String,
    content_base: String,
    timeout: Duration,
}

impl GutenbergClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            metadata_base: config.metadata_base_url.trim_end_matches('/').to_string(),
            content_base: config.content_base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
        })
    }

    pub fn metadata_url(&self, book_id: BookId) -> String {
        format!("{}/books/{book_id}", self.metadata_base)
    }

    pub fn content_url(&self, book_id: BookId) -> String {
        format!("{}/cache/epub/{book_id}/pg{book_id}.txt", self.content_base)
    }

    /// Book metadata as returned by the provider. A 404, or a body carrying an `error` key,
    /// is reported as not found.
    pub async fn fetch_metadata(&self, book_id: BookId) -> std::result::Result<serde_json::Value, FetchError> {
        let body = self.get_text(book_id, &self.metadata_url(book_id)).await?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::Failed { book_id, reason: format!("invalid metadata json: {e}") })?;
        if value.get("error").is_some() {
            return Err(FetchError::NotFound(book_id));
        }
        Ok(value)
    }

    async fn get_text(&self, book_id: BookId, url: &str) -> std::result::Result<String, FetchError> {
        let resp = self.http.get(url).send().await.map_err(|e| self.transport_error(book_id, e))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(book_id));
        }
        if !status.is_success() {
            return Err(FetchError::Failed { book_id, reason: format!("{url} returned {status}") });
        }
        resp.text().await.map_err(|e| self.transport_error(book_id, e))
    }

    fn transport_error(&self, book_id: BookId, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout { book_id, timeout: self.timeout }
        } else {
            FetchError::Failed { book_id, reason: e.to_string() }
        }
    }
}

impl ContentProvider for GutenbergClient {
    async fn fetch_content(&self, book_id: BookId) -> std::result::Result<String, FetchError> {
        self.get_text(book_id, &self.content_url(book_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_the_provider_layout() {
        let config = ProviderConfig {
            metadata_base_url: "https://gutendex.com/".into(),
            content_base_url: "https://gutenberg.org".into(),
            ..ProviderConfig::default()
        };
        let client = GutenbergClient::new(&config).unwrap();
        assert_eq!(client.metadata_url(2701), "https://gutendex.com/books/2701");
        assert_eq!(client.content_url(2701), "https://gutenberg.org/cache/epub/2701/pg2701.txt");
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_fetch_failure() {
        let config = ProviderConfig {
            content_base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(2),
            ..ProviderConfig::default()
        };
        let client = GutenbergClient::new(&config).unwrap();
        let err = client.fetch_content(11).await.unwrap_err();
        assert_eq!(err.book_id(), 11);
        assert!(!err.is_not_found());
    }
}
