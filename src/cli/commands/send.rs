//! Send command implementation
//!
//! Starts a pipeline, ships one log record, waits for delivery and prints a
//! short delivery report.

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::cli::output::{Align, Output, ReportTable};
use crate::config::Config;
use crate::encoder::ResourceAttributes;
use crate::metrics::MetricsSnapshot;
use crate::model::{parse_attribute, LogRecord, Severity};
use crate::pipeline::{Pipeline, PipelineError};

/// Options for the send command
pub struct SendOptions<'a> {
    pub config_path: &'a Path,
    /// Overrides `api_key` from the file
    pub api_key: Option<String>,
    pub message: &'a str,
    pub severity: Severity,
    /// Raw `key=value` pairs
    pub attributes: &'a [String],
    pub service: Option<&'a str>,
    /// Print every counter instead of the summary table
    pub detailed: bool,
}

/// Run the send command
pub async fn run_send(opts: SendOptions<'_>) -> anyhow::Result<()> {
    let mut config = Config::load(opts.config_path)?;
    if let Some(key) = opts.api_key {
        config.api_key = Some(key);
    }
    config.validate()?;

    let mut record = LogRecord::new(opts.severity, opts.message);
    for pair in opts.attributes {
        let (key, value) = parse_attribute(pair)
            .ok_or_else(|| anyhow::anyhow!("Invalid attribute '{}', expected key=value", pair))?;
        record.attributes.insert(key, value);
    }

    if record.severity < config.sync_minimum_severity {
        Output::warning(&format!(
            "Severity {} is below sync_minimum_severity ({}); nothing will be sent",
            record.severity, config.sync_minimum_severity
        ));
        return Ok(());
    }

    let url = config.endpoint_for(crate::model::SignalKind::Logs);
    let resource = ResourceAttributes::new().service(
        opts.service.unwrap_or(env!("CARGO_PKG_NAME")),
        env!("CARGO_PKG_VERSION"),
    );

    let errors: Arc<Mutex<Vec<PipelineError>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let pipeline = Pipeline::builder(config)
        .resource(resource)
        .on_error(move |e| sink.lock().expect("mutex poisoned").push(e.clone()))
        .start();

    let spinner = Output::spinner(&format!("Sending to {}...", url));
    pipeline.enqueue_log(record);
    let result = pipeline.flush().await;
    spinner.finish_and_clear();

    let status = pipeline.status();
    let snapshot = pipeline.metrics();
    pipeline.shutdown().await;

    if opts.detailed {
        println!();
        print!("{}", snapshot.format_report());
    } else {
        print_report(&snapshot);
    }
    Output::kv("status", &Output::status(status));

    for error in errors.lock().expect("mutex poisoned").iter() {
        Output::warning(&error.to_string());
    }

    match result {
        Ok(()) => {
            Output::success(&format!("Delivered 1 log record to {}", url));
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Delivery failed: {}", e));
            Err(e.into())
        }
    }
}

fn print_report(snapshot: &MetricsSnapshot) {
    Output::header("Delivery report");
    let mut table = ReportTable::new()
        .column("kind", Align::Left)
        .column("sent", Align::Right)
        .column("attempts", Align::Right)
        .column("retries", Align::Right)
        .column("dropped", Align::Right)
        .column("p50", Align::Right);
    for (kind, m) in &snapshot.signals {
        let dropped =
            m.items_dropped_overflow + m.items_dropped_permanent + m.items_skipped_encoding;
        let p50 = m
            .latency
            .p50()
            .map(|d| format!("{:.1}ms", d.as_secs_f64() * 1000.0))
            .unwrap_or_else(|| "-".to_string());
        table.row([
            kind.to_string(),
            m.items_sent.to_string(),
            m.send_attempts.to_string(),
            m.retries.to_string(),
            dropped.to_string(),
            p50,
        ]);
    }
    table.print();
}
