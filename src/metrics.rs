//! Delivery metrics
//!
//! Per-signal counters plus a send-latency histogram, owned by one pipeline.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::model::SignalKind;

/// Counters for one pipeline, shared by the handle and the worker
#[derive(Debug, Default)]
pub struct ExportMetrics {
    signals: Mutex<BTreeMap<SignalKind, SignalMetrics>>,
}

impl ExportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_signal(&self, kind: SignalKind, f: impl FnOnce(&mut SignalMetrics)) {
        let mut signals = self.signals.lock().expect("mutex poisoned");
        f(signals.entry(kind).or_default());
    }

    pub fn record_enqueued(&self, kind: SignalKind) {
        self.with_signal(kind, |m| m.items_enqueued += 1);
    }

    /// Items evicted to keep the queue bounded
    pub fn record_overflow(&self, kind: SignalKind, items: usize) {
        self.with_signal(kind, |m| m.items_dropped_overflow += items as u64);
    }

    /// One HTTP attempt and how long it took
    pub fn record_attempt(&self, kind: SignalKind, duration: Duration, success: bool) {
        self.with_signal(kind, |m| {
            m.send_attempts += 1;
            if !success {
                m.failed_attempts += 1;
            }
            m.latency.record(duration);
        });
    }

    pub fn record_retry(&self, kind: SignalKind) {
        self.with_signal(kind, |m| m.retries += 1);
    }

    pub fn record_sent(&self, kind: SignalKind, items: usize) {
        self.with_signal(kind, |m| {
            m.batches_sent += 1;
            m.items_sent += items as u64;
        });
    }

    /// A batch dropped for good (permanent rejection)
    pub fn record_dropped(&self, kind: SignalKind, items: usize) {
        self.with_signal(kind, |m| {
            m.failed_batches += 1;
            m.items_dropped_permanent += items as u64;
        });
    }

    /// A batch that ran out of retries and went back to the queue
    pub fn record_requeued(&self, kind: SignalKind, items: usize) {
        self.with_signal(kind, |m| {
            m.failed_batches += 1;
            m.items_requeued += items as u64;
        });
    }

    pub fn record_skipped(&self, kind: SignalKind, items: usize) {
        self.with_signal(kind, |m| m.items_skipped_encoding += items as u64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            signals: self.signals.lock().expect("mutex poisoned").clone(),
        }
    }

    pub fn reset(&self) {
        self.signals.lock().expect("mutex poisoned").clear();
    }
}

/// Counters for one signal kind
#[derive(Debug, Clone, Default)]
pub struct SignalMetrics {
    pub items_enqueued: u64,
    pub items_sent: u64,
    pub batches_sent: u64,
    pub send_attempts: u64,
    pub failed_attempts: u64,
    pub retries: u64,
    pub failed_batches: u64,
    pub items_requeued: u64,
    pub items_dropped_overflow: u64,
    pub items_dropped_permanent: u64,
    pub items_skipped_encoding: u64,
    pub latency: Histogram,
}

impl SignalMetrics {
    /// Share of attempts that succeeded, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.send_attempts == 0 {
            100.0
        } else {
            let ok = self.send_attempts - self.failed_attempts;
            (ok as f64 / self.send_attempts as f64) * 100.0
        }
    }
}

/// Samples kept per histogram for percentiles
pub const LATENCY_WINDOW: usize = 512;

/// Send latencies: running totals plus a sliding window of recent samples,
/// so memory stays flat in a long-lived pipeline.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    recent: VecDeque<Duration>,
    count: u64,
    total: Duration,
    max: Option<Duration>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, duration: Duration) {
        if self.recent.len() == LATENCY_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(duration);
        self.count += 1;
        self.total += duration;
        self.max = Some(self.max.map_or(duration, |max| max.max(duration)));
    }

    /// Samples recorded over the whole lifetime
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<Duration> {
        let count = u32::try_from(self.count).ok().filter(|c| *c > 0)?;
        Some(self.total / count)
    }

    pub fn max(&self) -> Option<Duration> {
        self.max
    }

    pub fn p50(&self) -> Option<Duration> {
        self.percentile(50)
    }

    pub fn p90(&self) -> Option<Duration> {
        self.percentile(90)
    }

    pub fn p99(&self) -> Option<Duration> {
        self.percentile(99)
    }

    /// Nearest-rank percentile over the recent window
    pub fn percentile(&self, p: u8) -> Option<Duration> {
        if self.recent.is_empty() {
            return None;
        }
        let mut window: Vec<Duration> = self.recent.iter().copied().collect();
        window.sort_unstable();
        let rank = (usize::from(p.min(100)) * window.len()).div_ceil(100);
        Some(window[rank.saturating_sub(1)])
    }
}

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub signals: BTreeMap<SignalKind, SignalMetrics>,
}

impl MetricsSnapshot {
    pub fn get(&self, kind: SignalKind) -> SignalMetrics {
        self.signals.get(&kind).cloned().unwrap_or_default()
    }

    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Delivery Report ===\n");

        for (kind, m) in &self.signals {
            report.push_str(&format!(
                "\n{}:\n  {} enqueued, {} sent in {} batches\n",
                kind, m.items_enqueued, m.items_sent, m.batches_sent
            ));
            report.push_str(&format!(
                "  {} attempts ({:.1}% ok), {} retries, {} failed batches\n",
                m.send_attempts,
                m.success_rate(),
                m.retries,
                m.failed_batches
            ));
            report.push_str(&format!(
                "  dropped: {} overflow, {} rejected, {} unencodable; {} requeued\n",
                m.items_dropped_overflow,
                m.items_dropped_permanent,
                m.items_skipped_encoding,
                m.items_requeued
            ));
            if let (Some(p50), Some(p99), Some(max)) =
                (m.latency.p50(), m.latency.p99(), m.latency.max())
            {
                report.push_str(&format!(
                    "  latency p50 {:.2}ms, p99 {:.2}ms, max {:.2}ms\n",
                    p50.as_secs_f64() * 1000.0,
                    p99.as_secs_f64() * 1000.0,
                    max.as_secs_f64() * 1000.0
                ));
            }
        }

        report
    }
}
