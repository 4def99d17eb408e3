//! Telemetry data model
//!
//! Items are built by instrumentation collaborators and pushed into the pipeline.
//! Optional fields are `Option` so the encoder omits them by construction.

pub mod attributes;
pub mod ids;
pub mod item;

pub use attributes::{parse_attribute, AttributeValue, Attributes};
pub use ids::{SpanId, TraceId};
pub use item::{
    HistogramValue, InstrumentKind, Lane, LogRecord, MetricPoint, MetricValue, Severity,
    SignalKind, Span, SpanEvent, SpanKind, SpanLink, SpanStatus, StatusCode, TelemetryItem,
};
