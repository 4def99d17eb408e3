//! Transport seam between the export worker and the network
//!
//! The worker only sees `Transport`; `HttpSender` is the production
//! implementation. Outcomes are classified here so retry policy never has to
//! inspect raw status codes.

pub mod http;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::model::SignalKind;
use crate::retry::Retryable;

pub use http::{parse_retry_after, HttpSender, API_KEY_HEADER, PROJECT_ID_HEADER};

/// One encoded batch ready to post
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub kind: SignalKind,
    pub url: String,
    pub body: Vec<u8>,
    pub item_count: usize,
}

/// Why a send did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Collector error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ExportError {
    /// Classify a non-2xx status. Returns `None` for success codes.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: String) -> Option<Self> {
        match status {
            200..=299 => None,
            429 => Some(ExportError::RateLimited { retry_after }),
            400..=499 => Some(ExportError::Rejected { status, body }),
            // 5xx and anything unexpected (1xx/3xx left after redirects)
            _ => Some(ExportError::Server { status, body }),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ExportError::Server { status, .. } | ExportError::Rejected { status, .. } => {
                Some(*status)
            }
            ExportError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl Retryable for ExportError {
    fn is_transient(&self) -> bool {
        match self {
            ExportError::Timeout
            | ExportError::Connection(_)
            | ExportError::Server { .. }
            | ExportError::RateLimited { .. } => true,
            ExportError::Rejected { .. } | ExportError::InvalidRequest(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ExportError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Something that can deliver an encoded batch
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform exactly one delivery attempt
    async fn send(&self, request: &ExportRequest) -> Result<(), ExportError>;
}
