//! OTLP/JSON encoding
//!
//! A batch becomes one resource block wrapping one scope block wrapping the
//! encoded items. Items that cannot be represented are skipped individually and
//! reported; the rest of the batch still ships.

pub mod resource;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::model::{
    AttributeValue, Attributes, HistogramValue, InstrumentKind, LogRecord, MetricPoint,
    MetricValue, SignalKind, Span, SpanId, TelemetryItem, TraceId,
};
use crate::queue::Batch;

pub use resource::{ContextProvider, ResourceAttributes};

/// OTLP aggregation temporality: cumulative
const CUMULATIVE: u8 = 2;

/// Why a single item could not be encoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Invalid trace id '{0}'")]
    InvalidTraceId(String),

    #[error("Invalid span id '{0}'")]
    InvalidSpanId(String),

    #[error("Timestamp out of range in {0}")]
    TimestampOutOfRange(&'static str),

    #[error("Non-finite number in {0}")]
    NonFiniteValue(&'static str),

    #[error("Span '{0}' ends before it starts")]
    SpanEndsBeforeStart(String),

    #[error("Empty {0} name")]
    EmptyName(&'static str),

    #[error("Histogram has {buckets} bucket counts for {bounds} bounds")]
    HistogramShape { bounds: usize, buckets: usize },

    #[error("Instrument '{0}' value does not match its kind")]
    ValueKindMismatch(String),

    #[error("Expected a {expected} item, found {found}")]
    KindMismatch {
        expected: SignalKind,
        found: SignalKind,
    },

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Result of encoding one batch
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub kind: SignalKind,
    /// JSON body; `None` when no item survived encoding
    pub body: Option<Vec<u8>>,
    pub encoded: usize,
    /// Position in the batch and reason for each skipped item
    pub skipped: Vec<(usize, EncodingError)>,
}

/// Builds OTLP/JSON request bodies
#[derive(Debug, Clone)]
pub struct OtlpEncoder {
    resource: Value,
    scope: Value,
}

impl OtlpEncoder {
    /// Resource attributes that cannot be encoded are dropped with a warning.
    pub fn new(resource: &ResourceAttributes, scope_name: &str, scope_version: &str) -> Self {
        let mut attributes = Attributes::new();
        for (key, value) in resource.to_attributes() {
            if value.has_non_finite() {
                tracing::warn!(key = %key, "Dropping non-finite resource attribute");
                continue;
            }
            attributes.insert(key, value);
        }

        let encoded = encode_attributes(&attributes, "resource").unwrap_or_default();

        Self {
            resource: json!({ "attributes": encoded }),
            scope: json!({ "name": scope_name, "version": scope_version }),
        }
    }

    /// Encode a batch into a request body
    pub fn encode(&self, batch: &Batch) -> EncodedBatch {
        let items: Vec<&TelemetryItem> = batch.items().collect();
        self.encode_items(batch.kind(), &items)
    }

    pub fn encode_items(&self, kind: SignalKind, items: &[&TelemetryItem]) -> EncodedBatch {
        let mut encoded_items = Vec::with_capacity(items.len());
        let mut skipped = Vec::new();

        for (index, item) in items.iter().enumerate() {
            match encode_item(kind, item) {
                Ok(value) => encoded_items.push(value),
                Err(error) => skipped.push((index, error)),
            }
        }

        let encoded = encoded_items.len();
        if encoded == 0 {
            return EncodedBatch {
                kind,
                body: None,
                encoded,
                skipped,
            };
        }

        let envelope = self.envelope(kind, encoded_items);
        match serde_json::to_vec(&envelope) {
            Ok(body) => EncodedBatch {
                kind,
                body: Some(body),
                encoded,
                skipped,
            },
            Err(e) => {
                // Nothing ships; report every item as skipped
                let error = EncodingError::Serialization(e.to_string());
                EncodedBatch {
                    kind,
                    body: None,
                    encoded: 0,
                    skipped: (0..items.len()).map(|i| (i, error.clone())).collect(),
                }
            }
        }
    }

    /// Wrap encoded items in resource and scope blocks
    pub fn envelope(&self, kind: SignalKind, items: Vec<Value>) -> Value {
        let (resource_key, scope_key, items_key) = match kind {
            SignalKind::Logs => ("resourceLogs", "scopeLogs", "logRecords"),
            SignalKind::Traces => ("resourceSpans", "scopeSpans", "spans"),
            SignalKind::Metrics => ("resourceMetrics", "scopeMetrics", "metrics"),
        };

        let mut scope_block = Map::new();
        scope_block.insert("scope".into(), self.scope.clone());
        scope_block.insert(items_key.into(), Value::Array(items));

        let mut resource_block = Map::new();
        resource_block.insert("resource".into(), self.resource.clone());
        resource_block.insert(
            scope_key.into(),
            Value::Array(vec![Value::Object(scope_block)]),
        );

        let mut root = Map::new();
        root.insert(
            resource_key.into(),
            Value::Array(vec![Value::Object(resource_block)]),
        );
        Value::Object(root)
    }
}

fn encode_item(expected: SignalKind, item: &TelemetryItem) -> Result<Value, EncodingError> {
    if item.kind() != expected {
        return Err(EncodingError::KindMismatch {
            expected,
            found: item.kind(),
        });
    }
    match item {
        TelemetryItem::Log(log) => encode_log(log),
        TelemetryItem::Span(span) => encode_span(span),
        TelemetryItem::Metric(point) => encode_metric(point),
    }
}

fn encode_log(log: &LogRecord) -> Result<Value, EncodingError> {
    let mut record = Map::new();
    record.insert(
        "timeUnixNano".into(),
        unix_nanos(&log.timestamp, "log timestamp")?.into(),
    );
    record.insert("severityNumber".into(), log.severity.number().into());
    record.insert("severityText".into(), log.severity.text().into());
    record.insert("body".into(), encode_any_value(&log.body, "log body")?);
    record.insert(
        "attributes".into(),
        encode_attributes(&log.attributes, "log attributes")?,
    );
    if let Some(ref trace_id) = log.trace_id {
        record.insert("traceId".into(), trace_hex(trace_id)?.into());
    }
    if let Some(ref span_id) = log.span_id {
        record.insert("spanId".into(), span_hex(span_id)?.into());
    }
    Ok(Value::Object(record))
}

fn encode_span(span: &Span) -> Result<Value, EncodingError> {
    if span.name.trim().is_empty() {
        return Err(EncodingError::EmptyName("span"));
    }
    if let Some(end) = span.end {
        if end < span.start {
            return Err(EncodingError::SpanEndsBeforeStart(span.name.clone()));
        }
    }

    let mut out = Map::new();
    out.insert("traceId".into(), trace_hex(&span.trace_id)?.into());
    out.insert("spanId".into(), span_hex(&span.span_id)?.into());
    if let Some(ref parent) = span.parent_span_id {
        out.insert("parentSpanId".into(), span_hex(parent)?.into());
    }
    out.insert("name".into(), span.name.clone().into());
    out.insert("kind".into(), span.kind.number().into());
    out.insert(
        "startTimeUnixNano".into(),
        unix_nanos(&span.start, "span start")?.into(),
    );
    if let Some(ref end) = span.end {
        out.insert("endTimeUnixNano".into(), unix_nanos(end, "span end")?.into());
    }
    out.insert(
        "attributes".into(),
        encode_attributes(&span.attributes, "span attributes")?,
    );

    let mut events = Vec::with_capacity(span.events.len());
    for event in &span.events {
        events.push(json!({
            "timeUnixNano": unix_nanos(&event.timestamp, "span event")?,
            "name": event.name,
            "attributes": encode_attributes(&event.attributes, "span event attributes")?,
        }));
    }
    out.insert("events".into(), Value::Array(events));

    let mut links = Vec::with_capacity(span.links.len());
    for link in &span.links {
        links.push(json!({
            "traceId": trace_hex(&link.trace_id)?,
            "spanId": span_hex(&link.span_id)?,
            "attributes": encode_attributes(&link.attributes, "span link attributes")?,
        }));
    }
    out.insert("links".into(), Value::Array(links));

    let mut status = Map::new();
    status.insert("code".into(), span.status.code.number().into());
    if let Some(ref message) = span.status.message {
        status.insert("message".into(), message.clone().into());
    }
    out.insert("status".into(), Value::Object(status));

    Ok(Value::Object(out))
}

fn encode_metric(point: &MetricPoint) -> Result<Value, EncodingError> {
    if point.instrument_name.trim().is_empty() {
        return Err(EncodingError::EmptyName("instrument"));
    }

    let mut data_point = Map::new();
    data_point.insert(
        "attributes".into(),
        encode_attributes(&point.attributes, "metric attributes")?,
    );
    if let Some(ref start) = point.start_timestamp {
        data_point.insert(
            "startTimeUnixNano".into(),
            unix_nanos(start, "metric start")?.into(),
        );
    }
    data_point.insert(
        "timeUnixNano".into(),
        unix_nanos(&point.timestamp, "metric timestamp")?.into(),
    );

    let mismatch = || EncodingError::ValueKindMismatch(point.instrument_name.clone());
    let data = match (point.instrument_kind, &point.value) {
        (InstrumentKind::Histogram, MetricValue::Histogram(histogram)) => {
            encode_histogram_point(histogram, &mut data_point)?;
            (
                "histogram",
                json!({
                    "dataPoints": [Value::Object(data_point)],
                    "aggregationTemporality": CUMULATIVE,
                }),
            )
        }
        (InstrumentKind::Histogram, _) | (_, MetricValue::Histogram(_)) => return Err(mismatch()),
        (InstrumentKind::Gauge, _) => {
            insert_number(point, &mut data_point)?;
            ("gauge", json!({ "dataPoints": [Value::Object(data_point)] }))
        }
        (kind @ (InstrumentKind::Counter | InstrumentKind::UpDownCounter), _) => {
            insert_number(point, &mut data_point)?;
            (
                "sum",
                json!({
                    "dataPoints": [Value::Object(data_point)],
                    "aggregationTemporality": CUMULATIVE,
                    "isMonotonic": kind == InstrumentKind::Counter,
                }),
            )
        }
    };

    let mut metric = Map::new();
    metric.insert("name".into(), point.instrument_name.clone().into());
    if let Some(ref unit) = point.unit {
        metric.insert("unit".into(), unit.clone().into());
    }
    if let Some(ref description) = point.description {
        metric.insert("description".into(), description.clone().into());
    }
    metric.insert(data.0.into(), data.1);
    Ok(Value::Object(metric))
}

/// `asInt` / `asDouble` for scalar points
fn insert_number(
    point: &MetricPoint,
    data_point: &mut Map<String, Value>,
) -> Result<(), EncodingError> {
    match &point.value {
        MetricValue::Int(i) => {
            data_point.insert("asInt".into(), i.to_string().into());
        }
        MetricValue::Double(d) => {
            data_point.insert("asDouble".into(), finite(*d, "metric value")?);
        }
        MetricValue::Histogram(_) => {
            return Err(EncodingError::ValueKindMismatch(
                point.instrument_name.clone(),
            ));
        }
    }
    Ok(())
}

fn encode_histogram_point(
    histogram: &HistogramValue,
    data_point: &mut Map<String, Value>,
) -> Result<(), EncodingError> {
    if histogram.bucket_counts.len() != histogram.bounds.len() + 1 {
        return Err(EncodingError::HistogramShape {
            bounds: histogram.bounds.len(),
            buckets: histogram.bucket_counts.len(),
        });
    }

    data_point.insert("count".into(), histogram.count.to_string().into());
    data_point.insert("sum".into(), finite(histogram.sum, "histogram sum")?);
    data_point.insert(
        "bucketCounts".into(),
        histogram
            .bucket_counts
            .iter()
            .map(|c| Value::String(c.to_string()))
            .collect(),
    );
    let mut bounds = Vec::with_capacity(histogram.bounds.len());
    for bound in &histogram.bounds {
        bounds.push(finite(*bound, "histogram bounds")?);
    }
    data_point.insert("explicitBounds".into(), Value::Array(bounds));
    if let Some(min) = histogram.min {
        data_point.insert("min".into(), finite(min, "histogram min")?);
    }
    if let Some(max) = histogram.max {
        data_point.insert("max".into(), finite(max, "histogram max")?);
    }
    Ok(())
}

/// `[{"key": .., "value": ..}]` in key order
fn encode_attributes(attributes: &Attributes, field: &'static str) -> Result<Value, EncodingError> {
    let mut out = Vec::with_capacity(attributes.len());
    for (key, value) in attributes {
        out.push(json!({ "key": key, "value": encode_any_value(value, field)? }));
    }
    Ok(Value::Array(out))
}

fn encode_any_value(value: &AttributeValue, field: &'static str) -> Result<Value, EncodingError> {
    Ok(match value {
        AttributeValue::String(s) => json!({ "stringValue": s }),
        AttributeValue::Bool(b) => json!({ "boolValue": b }),
        // 64-bit integers are strings in OTLP/JSON
        AttributeValue::Int(i) => json!({ "intValue": i.to_string() }),
        AttributeValue::Double(d) => json!({ "doubleValue": finite(*d, field)? }),
        AttributeValue::Array(values) => {
            let mut encoded = Vec::with_capacity(values.len());
            for v in values {
                encoded.push(encode_any_value(v, field)?);
            }
            json!({ "arrayValue": { "values": encoded } })
        }
        AttributeValue::Map(entries) => {
            json!({ "kvlistValue": { "values": encode_attributes(entries, field)? } })
        }
    })
}

fn finite(value: f64, field: &'static str) -> Result<Value, EncodingError> {
    if value.is_finite() {
        Ok(json!(value))
    } else {
        Err(EncodingError::NonFiniteValue(field))
    }
}

/// Nanoseconds since the Unix epoch as a decimal string
fn unix_nanos(ts: &DateTime<Utc>, field: &'static str) -> Result<String, EncodingError> {
    match ts.timestamp_nanos_opt() {
        Some(nanos) if nanos >= 0 => Ok(nanos.to_string()),
        _ => Err(EncodingError::TimestampOutOfRange(field)),
    }
}

fn trace_hex(id: &TraceId) -> Result<String, EncodingError> {
    id.canonical()
        .ok_or_else(|| EncodingError::InvalidTraceId(id.as_str().to_string()))
}

fn span_hex(id: &SpanId) -> Result<String, EncodingError> {
    id.canonical()
        .ok_or_else(|| EncodingError::InvalidSpanId(id.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Lane, Severity, SpanEvent, SpanKind, SpanLink, SpanStatus,
    };
    use crate::queue::QueuedItem;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    const TRACE: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
    const SPAN: &str = "00f067aa0ba902b7";

    fn encoder() -> OtlpEncoder {
        let resource = ResourceAttributes::new()
            .service("shop", "1.2.3")
            .project("p-1");
        OtlpEncoder::new(&resource, "telemetry-courier", "0.4.0")
    }

    fn batch(kind: SignalKind, items: Vec<TelemetryItem>) -> Batch {
        Batch::new(
            kind,
            items
                .into_iter()
                .map(|item| QueuedItem {
                    item,
                    lane: Lane::Normal,
                })
                .collect(),
        )
    }

    fn decode(encoded: &EncodedBatch) -> Value {
        serde_json::from_slice(encoded.body.as_ref().unwrap()).unwrap()
    }

    fn ts(secs: i64, nanos: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, nanos).unwrap()
    }

    #[test]
    fn test_log_envelope_shape() {
        let log = LogRecord::new(Severity::Error, "payment failed")
            .at(ts(1_700_000_000, 123_456_789))
            .with_attribute("order.id", 42)
            .with_trace(TraceId::new(TRACE.to_uppercase()), SpanId::new(SPAN));

        let encoded = encoder().encode(&batch(SignalKind::Logs, vec![log.into()]));
        assert_eq!(encoded.encoded, 1);
        assert!(encoded.skipped.is_empty());

        let body = decode(&encoded);
        let resource = &body["resourceLogs"][0]["resource"]["attributes"];
        assert_eq!(resource[0]["key"], "project.id");
        assert_eq!(resource[1]["key"], "service.name");
        assert_eq!(resource[1]["value"]["stringValue"], "shop");

        let scope = &body["resourceLogs"][0]["scopeLogs"][0];
        assert_eq!(scope["scope"]["name"], "telemetry-courier");

        let record = &scope["logRecords"][0];
        assert_eq!(record["timeUnixNano"], "1700000000123456789");
        assert_eq!(record["severityNumber"], 17);
        assert_eq!(record["severityText"], "ERROR");
        assert_eq!(record["body"]["stringValue"], "payment failed");
        assert_eq!(record["attributes"][0]["value"]["intValue"], "42");
        assert_eq!(record["traceId"], TRACE);
        assert_eq!(record["spanId"], SPAN);
    }

    #[test]
    fn test_log_without_trace_omits_ids() {
        let log = LogRecord::new(Severity::Info, "hello");
        let body = decode(&encoder().encode(&batch(SignalKind::Logs, vec![log.into()])));
        let record = &body["resourceLogs"][0]["scopeLogs"][0]["logRecords"][0];
        assert!(record.get("traceId").is_none());
        assert!(record.get("spanId").is_none());
    }

    #[test]
    fn test_attribute_variants() {
        let mut nested = BTreeMap::new();
        nested.insert("depth".to_string(), AttributeValue::Int(2));
        let log = LogRecord::new(Severity::Info, "attrs")
            .with_attribute("a_string", "x")
            .with_attribute("b_bool", true)
            .with_attribute("c_double", 0.25)
            .with_attribute("d_array", vec![1i64, 2])
            .with_attribute("e_map", AttributeValue::Map(nested));

        let body = decode(&encoder().encode(&batch(SignalKind::Logs, vec![log.into()])));
        let attrs = &body["resourceLogs"][0]["scopeLogs"][0]["logRecords"][0]["attributes"];
        assert_eq!(attrs[0]["value"]["stringValue"], "x");
        assert_eq!(attrs[1]["value"]["boolValue"], true);
        assert_eq!(attrs[2]["value"]["doubleValue"], 0.25);
        assert_eq!(
            attrs[3]["value"]["arrayValue"]["values"][1]["intValue"],
            "2"
        );
        assert_eq!(
            attrs[4]["value"]["kvlistValue"]["values"][0]["key"],
            "depth"
        );
    }

    #[test]
    fn test_span_encoding() {
        let span = Span::new(TraceId::new(TRACE), SpanId::new(SPAN), "GET /cart", ts(10, 0))
            .with_parent(SpanId::new("1111111111111111"))
            .with_kind(SpanKind::Client)
            .ended_at(ts(10, 500))
            .with_status(SpanStatus::error("timeout"))
            .with_event(SpanEvent {
                name: "retry".into(),
                timestamp: ts(10, 100),
                attributes: Attributes::new(),
            })
            .with_link(SpanLink {
                trace_id: TraceId::new(TRACE),
                span_id: SpanId::new("2222222222222222"),
                attributes: Attributes::new(),
            });

        let body = decode(&encoder().encode(&batch(SignalKind::Traces, vec![span.into()])));
        let out = &body["resourceSpans"][0]["scopeSpans"][0]["spans"][0];
        assert_eq!(out["parentSpanId"], "1111111111111111");
        assert_eq!(out["kind"], 3);
        assert_eq!(out["startTimeUnixNano"], "10000000000");
        assert_eq!(out["endTimeUnixNano"], "10000000500");
        assert_eq!(out["status"]["code"], 2);
        assert_eq!(out["status"]["message"], "timeout");
        assert_eq!(out["events"][0]["timeUnixNano"], "10000000100");
        assert_eq!(out["links"][0]["spanId"], "2222222222222222");
    }

    #[test]
    fn test_open_span_omits_end() {
        let span = Span::new(TraceId::new(TRACE), SpanId::new(SPAN), "work", ts(1, 0));
        let body = decode(&encoder().encode(&batch(SignalKind::Traces, vec![span.into()])));
        let out = &body["resourceSpans"][0]["scopeSpans"][0]["spans"][0];
        assert!(out.get("endTimeUnixNano").is_none());
        assert!(out.get("parentSpanId").is_none());
        assert!(out["status"].get("message").is_none());
    }

    #[test]
    fn test_metric_kinds() {
        let counter = MetricPoint::new("requests", InstrumentKind::Counter, MetricValue::Int(7))
            .at(ts(5, 0))
            .with_unit("1");
        let gauge = MetricPoint::new("battery", InstrumentKind::Gauge, MetricValue::Double(0.5));
        let updown =
            MetricPoint::new("inflight", InstrumentKind::UpDownCounter, MetricValue::Int(-2));
        let histogram = MetricPoint::new(
            "latency",
            InstrumentKind::Histogram,
            MetricValue::Histogram(HistogramValue {
                count: 3,
                sum: 12.5,
                min: Some(1.0),
                max: None,
                bounds: vec![5.0, 10.0],
                bucket_counts: vec![1, 1, 1],
            }),
        );

        let body = decode(&encoder().encode(&batch(
            SignalKind::Metrics,
            vec![counter.into(), gauge.into(), updown.into(), histogram.into()],
        )));
        let metrics = &body["resourceMetrics"][0]["scopeMetrics"][0]["metrics"];

        assert_eq!(metrics[0]["unit"], "1");
        assert_eq!(metrics[0]["sum"]["isMonotonic"], true);
        assert_eq!(metrics[0]["sum"]["dataPoints"][0]["asInt"], "7");
        assert_eq!(metrics[0]["sum"]["dataPoints"][0]["timeUnixNano"], "5000000000");
        assert_eq!(metrics[1]["gauge"]["dataPoints"][0]["asDouble"], 0.5);
        assert_eq!(metrics[2]["sum"]["isMonotonic"], false);
        let hist = &metrics[3]["histogram"]["dataPoints"][0];
        assert_eq!(hist["count"], "3");
        assert_eq!(hist["bucketCounts"][2], "1");
        assert_eq!(hist["explicitBounds"][1], 10.0);
        assert!(hist.get("max").is_none());
    }

    #[test]
    fn test_malformed_item_skipped_rest_ships() {
        let good = LogRecord::new(Severity::Info, "good");
        let bad = LogRecord::new(Severity::Info, "bad")
            .with_trace(TraceId::new("xyz"), SpanId::new(SPAN));
        let also_good = LogRecord::new(Severity::Warn, "also good");

        let encoded = encoder().encode(&batch(
            SignalKind::Logs,
            vec![good.into(), bad.into(), also_good.into()],
        ));
        assert_eq!(encoded.encoded, 2);
        assert_eq!(encoded.skipped.len(), 1);
        assert_eq!(encoded.skipped[0].0, 1);
        assert!(matches!(
            encoded.skipped[0].1,
            EncodingError::InvalidTraceId(_)
        ));

        let body = decode(&encoded);
        let records = body["resourceLogs"][0]["scopeLogs"][0]["logRecords"]
            .as_array()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["body"]["stringValue"], "also good");
    }

    #[test]
    fn test_all_items_malformed_yields_no_body() {
        let bad = MetricPoint::new("ratio", InstrumentKind::Gauge, MetricValue::Double(f64::NAN));
        let encoded = encoder().encode(&batch(SignalKind::Metrics, vec![bad.into()]));
        assert!(encoded.body.is_none());
        assert_eq!(
            encoded.skipped[0].1,
            EncodingError::NonFiniteValue("metric value")
        );
    }

    #[test]
    fn test_span_validation_errors() {
        let backwards = Span::new(TraceId::new(TRACE), SpanId::new(SPAN), "late", ts(10, 0))
            .ended_at(ts(9, 0));
        let unnamed = Span::new(TraceId::new(TRACE), SpanId::new(SPAN), " ", ts(10, 0));
        let zero_id = Span::new(TraceId::new("0".repeat(32)), SpanId::new(SPAN), "x", ts(10, 0));

        let encoded = encoder().encode(&batch(
            SignalKind::Traces,
            vec![backwards.into(), unnamed.into(), zero_id.into()],
        ));
        assert!(encoded.body.is_none());
        assert!(matches!(
            encoded.skipped[0].1,
            EncodingError::SpanEndsBeforeStart(_)
        ));
        assert_eq!(encoded.skipped[1].1, EncodingError::EmptyName("span"));
        assert!(matches!(
            encoded.skipped[2].1,
            EncodingError::InvalidTraceId(_)
        ));
    }

    #[test]
    fn test_histogram_shape_and_kind_mismatch() {
        let misshapen = MetricPoint::new(
            "latency",
            InstrumentKind::Histogram,
            MetricValue::Histogram(HistogramValue {
                count: 1,
                sum: 1.0,
                min: None,
                max: None,
                bounds: vec![1.0],
                bucket_counts: vec![1],
            }),
        );
        let mismatched =
            MetricPoint::new("latency", InstrumentKind::Histogram, MetricValue::Int(1));

        let encoded = encoder().encode(&batch(
            SignalKind::Metrics,
            vec![misshapen.into(), mismatched.into()],
        ));
        assert_eq!(
            encoded.skipped[0].1,
            EncodingError::HistogramShape {
                bounds: 1,
                buckets: 1
            }
        );
        assert!(matches!(
            encoded.skipped[1].1,
            EncodingError::ValueKindMismatch(_)
        ));
    }

    #[test]
    fn test_pre_epoch_timestamp_rejected() {
        let log = LogRecord::new(Severity::Info, "old").at(ts(-1, 0));
        let encoded = encoder().encode(&batch(SignalKind::Logs, vec![log.into()]));
        assert_eq!(
            encoded.skipped[0].1,
            EncodingError::TimestampOutOfRange("log timestamp")
        );
    }

    #[test]
    fn test_wrong_kind_in_batch() {
        let log = LogRecord::new(Severity::Info, "misfiled");
        let encoded = encoder().encode(&batch(SignalKind::Traces, vec![log.into()]));
        assert!(matches!(
            encoded.skipped[0].1,
            EncodingError::KindMismatch { .. }
        ));
    }

    #[test]
    fn test_absent_resource_fields_omitted() {
        let encoder = OtlpEncoder::new(&ResourceAttributes::new(), "scope", "1");
        let body = encoder.envelope(SignalKind::Metrics, vec![]);
        assert_eq!(
            body["resourceMetrics"][0]["resource"]["attributes"],
            json!([])
        );
    }
}
