//! Telemetry item shapes: log records, spans and metric points

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::attributes::{AttributeValue, Attributes};
use super::ids::{SpanId, TraceId};

/// The three signal kinds; each has its own queue and wire envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Logs,
    Traces,
    Metrics,
}

impl SignalKind {
    pub const ALL: [SignalKind; 3] = [SignalKind::Logs, SignalKind::Traces, SignalKind::Metrics];

    /// Path appended to the endpoint when each kind has its own route
    pub fn path(&self) -> &'static str {
        match self {
            SignalKind::Logs => "/v1/logs",
            SignalKind::Traces => "/v1/traces",
            SignalKind::Metrics => "/v1/metrics",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Logs => write!(f, "logs"),
            SignalKind::Traces => write!(f, "traces"),
            SignalKind::Metrics => write!(f, "metrics"),
        }
    }
}

/// Queue partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    #[default]
    Normal,
    Priority,
}

/// Log severity, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    /// OTLP severity number (first value of each range)
    pub fn number(&self) -> u8 {
        match self {
            Severity::Trace => 1,
            Severity::Debug => 5,
            Severity::Info => 9,
            Severity::Warn => 13,
            Severity::Error => 17,
            Severity::Fatal => 21,
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text().to_lowercase())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            "fatal" | "critical" => Ok(Severity::Fatal),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// A structured log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub body: AttributeValue,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<SpanId>,
}

impl LogRecord {
    /// Create a log record stamped with the current time
    pub fn new(severity: Severity, body: impl Into<AttributeValue>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            body: body.into(),
            attributes: Attributes::new(),
            trace_id: None,
            span_id: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Correlate this record with a span
    pub fn with_trace(mut self, trace_id: TraceId, span_id: SpanId) -> Self {
        self.trace_id = Some(trace_id);
        self.span_id = Some(span_id);
        self
    }
}

/// Role of a span in a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Unspecified,
    #[default]
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    pub fn number(&self) -> u8 {
        match self {
            SpanKind::Unspecified => 0,
            SpanKind::Internal => 1,
            SpanKind::Server => 2,
            SpanKind::Client => 3,
            SpanKind::Producer => 4,
            SpanKind::Consumer => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

impl StatusCode {
    pub fn number(&self) -> u8 {
        match self {
            StatusCode::Unset => 0,
            StatusCode::Ok => 1,
            StatusCode::Error => 2,
        }
    }
}

/// Final status of a span
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpanStatus {
    pub code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SpanStatus {
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error,
            message: Some(message.into()),
        }
    }
}

/// A timestamped annotation on a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attributes: Attributes,
}

/// A reference from one span to another, possibly in a different trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanLink {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(default)]
    pub attributes: Attributes,
}

/// A timed unit of work in a distributed trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    #[serde(default)]
    pub kind: SpanKind,
    pub start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub events: Vec<SpanEvent>,
    #[serde(default)]
    pub links: Vec<SpanLink>,
    #[serde(default)]
    pub status: SpanStatus,
}

impl Span {
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        name: impl Into<String>,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id: None,
            name: name.into(),
            kind: SpanKind::default(),
            start,
            end: None,
            attributes: Attributes::new(),
            events: Vec::new(),
            links: Vec::new(),
            status: SpanStatus::default(),
        }
    }

    pub fn with_parent(mut self, parent: SpanId) -> Self {
        self.parent_span_id = Some(parent);
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn ended_at(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_event(mut self, event: SpanEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_link(mut self, link: SpanLink) -> Self {
        self.links.push(link);
        self
    }
}

/// Instrument that produced a metric point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    /// Monotonic sum
    Counter,
    /// Non-monotonic sum
    UpDownCounter,
    Gauge,
    Histogram,
}

/// Explicit-bucket histogram data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramValue {
    pub count: u64,
    pub sum: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Upper bounds of all buckets except the last (+inf)
    pub bounds: Vec<f64>,
    /// One more entry than `bounds`
    pub bucket_counts: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    Int(i64),
    Double(f64),
    Histogram(HistogramValue),
}

/// A single measurement from an instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub instrument_name: String,
    pub instrument_kind: InstrumentKind,
    pub value: MetricValue,
    #[serde(default)]
    pub attributes: Attributes,
    pub timestamp: DateTime<Utc>,
    /// Start of the aggregation window for sums and histograms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MetricPoint {
    pub fn new(name: impl Into<String>, kind: InstrumentKind, value: MetricValue) -> Self {
        Self {
            instrument_name: name.into(),
            instrument_kind: kind,
            value,
            attributes: Attributes::new(),
            timestamp: Utc::now(),
            start_timestamp: None,
            unit: None,
            description: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Anything the pipeline can ship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryItem {
    Log(LogRecord),
    Span(Span),
    Metric(MetricPoint),
}

impl TelemetryItem {
    pub fn kind(&self) -> SignalKind {
        match self {
            TelemetryItem::Log(_) => SignalKind::Logs,
            TelemetryItem::Span(_) => SignalKind::Traces,
            TelemetryItem::Metric(_) => SignalKind::Metrics,
        }
    }

    /// Whether this item reports an error and may use the priority lane
    pub fn is_error(&self) -> bool {
        match self {
            TelemetryItem::Log(log) => log.severity >= Severity::Error,
            TelemetryItem::Span(span) => span.status.code == StatusCode::Error,
            TelemetryItem::Metric(_) => false,
        }
    }
}

impl From<LogRecord> for TelemetryItem {
    fn from(log: LogRecord) -> Self {
        TelemetryItem::Log(log)
    }
}

impl From<Span> for TelemetryItem {
    fn from(span: Span) -> Self {
        TelemetryItem::Span(span)
    }
}

impl From<MetricPoint> for TelemetryItem {
    fn from(point: MetricPoint) -> Self {
        TelemetryItem::Metric(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_and_numbers() {
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Trace < Severity::Info);
        assert_eq!(Severity::Error.number(), 17);
        assert_eq!(Severity::Fatal.text(), "FATAL");
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("WARNING".parse::<Severity>(), Ok(Severity::Warn));
        assert_eq!("error".parse::<Severity>(), Ok(Severity::Error));
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_item_kind_and_error_flag() {
        let log: TelemetryItem = LogRecord::new(Severity::Error, "boom").into();
        assert_eq!(log.kind(), SignalKind::Logs);
        assert!(log.is_error());

        let info: TelemetryItem = LogRecord::new(Severity::Info, "fine").into();
        assert!(!info.is_error());

        let span: TelemetryItem = Span::new(
            TraceId::new("4bf92f3577b34da6a3ce929d0e0e4736"),
            SpanId::new("00f067aa0ba902b7"),
            "checkout",
            Utc::now(),
        )
        .with_status(SpanStatus::error("timeout"))
        .into();
        assert_eq!(span.kind(), SignalKind::Traces);
        assert!(span.is_error());

        let metric: TelemetryItem =
            MetricPoint::new("requests", InstrumentKind::Counter, MetricValue::Int(1)).into();
        assert_eq!(metric.kind(), SignalKind::Metrics);
        assert!(!metric.is_error());
    }

    #[test]
    fn test_signal_paths() {
        assert_eq!(SignalKind::Logs.path(), "/v1/logs");
        assert_eq!(SignalKind::Traces.path(), "/v1/traces");
        assert_eq!(SignalKind::Metrics.path(), "/v1/metrics");
    }
}
