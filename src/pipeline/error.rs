//! Pipeline error taxonomy

use std::sync::Arc;
use thiserror::Error;

use crate::config::ConfigError;
use crate::encoder::EncodingError;
use crate::transport::ExportError;

/// Failures surfaced through `flush()` and the error callback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Transient network error: {0}")]
    TransientNetwork(ExportError),

    #[error("Request rejected ({status}): {message}")]
    PermanentRequest { status: u16, message: String },

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Pipeline is disabled")]
    Disabled,

    #[error("Pipeline has shut down")]
    ShutDown,
}

impl PipelineError {
    /// Map a failed send onto the taxonomy
    pub fn from_export(error: ExportError) -> Self {
        match error {
            ExportError::Rejected { status, body } => PipelineError::PermanentRequest {
                status,
                message: body,
            },
            ExportError::InvalidRequest(message) => PipelineError::PermanentRequest {
                status: 0,
                message,
            },
            transient => PipelineError::TransientNetwork(transient),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::TransientNetwork(_))
    }
}

/// Callback invoked for dropped, exhausted or unencodable telemetry
pub type ErrorObserver = Arc<dyn Fn(&PipelineError) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_export_classification() {
        let rejected = PipelineError::from_export(ExportError::Rejected {
            status: 400,
            body: "bad payload".to_string(),
        });
        assert_eq!(
            rejected,
            PipelineError::PermanentRequest {
                status: 400,
                message: "bad payload".to_string()
            }
        );
        assert!(!rejected.is_transient());

        let throttled = PipelineError::from_export(ExportError::RateLimited { retry_after: None });
        assert!(throttled.is_transient());
        assert!(PipelineError::from_export(ExportError::Timeout).is_transient());
    }

    #[test]
    fn test_display() {
        let err = PipelineError::Configuration(ConfigError::MissingEndpoint);
        assert!(err.to_string().starts_with("Configuration error"));
        assert_eq!(PipelineError::ShutDown.to_string(), "Pipeline has shut down");
    }
}
