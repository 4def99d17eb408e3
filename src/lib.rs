//! telemetry-courier - client-side telemetry delivery
//!
//! Accepts log records, spans and metric points from instrumentation code,
//! batches them per signal kind, encodes them as OTLP/JSON and ships them over
//! HTTP. Producers never block: a background worker owns the bounded queues
//! and handles retries, backoff and priority delivery of errors.

pub mod cli;
pub mod config;
pub mod encoder;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod status;
pub mod transport;

pub use config::{Config, ConfigError, EndpointLayout};
pub use encoder::{ContextProvider, EncodingError, OtlpEncoder, ResourceAttributes};
pub use metrics::{ExportMetrics, MetricsSnapshot};
pub use model::{
    AttributeValue, Attributes, Lane, LogRecord, MetricPoint, MetricValue, Severity, SignalKind,
    Span, SpanId, TelemetryItem, TraceId,
};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError, PipelineHandle};
pub use status::SyncStatus;
pub use transport::{ExportError, ExportRequest, HttpSender, Transport};
