//! HTTP sender: one POST per attempt, outcome classified into `ExportError`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use std::time::Duration;

use super::{ExportError, ExportRequest, Transport};
use crate::config::Config;

/// Header carrying the configured API key
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header carrying the project id from the resource attributes
pub const PROJECT_ID_HEADER: &str = "x-project-id";

/// Longest response body kept in an error message
const MAX_ERROR_BODY: usize = 512;

/// Posts JSON batches to an OTLP/HTTP collector
pub struct HttpSender {
    http_client: Client,
    api_key: Option<String>,
    project_id: Option<String>,
}

impl HttpSender {
    /// Build a sender whose requests time out after `config.timeout()`
    pub fn new(config: &Config, project_id: Option<String>) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            project_id,
        })
    }
}

#[async_trait]
impl Transport for HttpSender {
    async fn send(&self, request: &ExportRequest) -> Result<(), ExportError> {
        let mut builder = self
            .http_client
            .post(&request.url)
            .header(CONTENT_TYPE, "application/json")
            .body(request.body.clone());

        if let Some(ref key) = self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        if let Some(ref project) = self.project_id {
            builder = builder.header(PROJECT_ID_HEADER, project);
        }

        let response = builder.send().await.map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let retry_after = parse_retry_after(response.headers());
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }

        match ExportError::from_status(status.as_u16(), retry_after, body) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn classify_transport_error(error: reqwest::Error) -> ExportError {
    if error.is_timeout() {
        ExportError::Timeout
    } else if error.is_builder() {
        ExportError::InvalidRequest(error.to_string())
    } else {
        ExportError::Connection(error.to_string())
    }
}

/// Parse a `Retry-After` header given either as seconds or as an HTTP date
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let wait = at.signed_duration_since(Utc::now()).num_seconds().max(0) as u64;
    Some(Duration::from_secs(wait))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let future = Utc::now() + chrono::Duration::seconds(120);
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, future.to_rfc2822().parse().unwrap());

        let wait = parse_retry_after(&headers).unwrap().as_secs();
        // Allow 2s tolerance for test execution
        assert!((118..=120).contains(&wait), "wait was {}", wait);
    }

    #[test]
    fn test_parse_retry_after_past_date_clamps_to_zero() {
        let past = Utc::now() - chrono::Duration::seconds(60);
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, past.to_rfc2822().parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_missing_or_garbage() {
        let headers = HeaderMap::new();
        assert!(parse_retry_after(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "soon".parse().unwrap());
        assert!(parse_retry_after(&headers).is_none());
    }

    #[test]
    fn test_sender_builds_from_config() {
        let config = Config {
            api_key: Some("key".to_string()),
            ..Config::new("http://localhost:4318")
        };
        let sender = HttpSender::new(&config, Some("proj-1".to_string())).unwrap();
        assert_eq!(sender.api_key.as_deref(), Some("key"));
        assert_eq!(sender.project_id.as_deref(), Some("proj-1"));
    }
}
