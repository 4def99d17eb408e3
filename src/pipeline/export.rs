//! Encode, send and retry one drained cycle

use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use super::error::{ErrorObserver, PipelineError};
use crate::config::Config;
use crate::encoder::OtlpEncoder;
use crate::metrics::ExportMetrics;
use crate::model::SignalKind;
use crate::queue::Batch;
use crate::retry::{retry_with_backoff, BackoffPolicy, RetryOutcome};
use crate::status::{SyncStatus, SyncStatusMachine};
use crate::transport::{ExportError, ExportRequest, Transport};

/// State visible to both the pipeline handle and the worker
pub(crate) struct Shared {
    pub status: SyncStatusMachine,
    pub metrics: ExportMetrics,
    error_observers: Mutex<Vec<ErrorObserver>>,
}

impl Shared {
    pub fn new(initial: SyncStatus) -> Self {
        Self {
            status: SyncStatusMachine::new(initial),
            metrics: ExportMetrics::new(),
            error_observers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe_errors(&self, observer: ErrorObserver) {
        self.error_observers
            .lock()
            .expect("mutex poisoned")
            .push(observer);
    }

    /// Hand an error to every observer, outside the lock
    pub fn report(&self, error: &PipelineError) {
        let observers = self.error_observers.lock().expect("mutex poisoned").clone();
        for observer in &observers {
            observer(error);
        }
    }
}

/// Outcome of one cycle, applied by the worker when it settles
#[derive(Debug, Default)]
pub(crate) struct CycleReport {
    /// Batches to put back at the front of their queues
    pub requeue: Vec<Batch>,
    pub failed: bool,
    pub first_error: Option<PipelineError>,
}

impl CycleReport {
    pub fn failure(error: PipelineError) -> Self {
        let mut report = Self::default();
        report.record_failure(Some(error));
        report
    }

    fn record_failure(&mut self, error: Option<PipelineError>) {
        self.failed = true;
        if self.first_error.is_none() {
            self.first_error = error;
        }
    }

    fn merge(&mut self, other: CycleReport) {
        self.requeue.extend(other.requeue);
        if other.failed {
            self.record_failure(other.first_error);
        }
    }

    pub fn result(&self) -> Result<(), PipelineError> {
        match &self.first_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

enum BatchResult {
    Delivered,
    /// Rejected for good; the items are gone
    Dropped(PipelineError),
    /// Give the batch back to the queue
    Requeue(PipelineError),
}

/// Everything a cycle needs, shared with the spawned cycle task
pub(crate) struct Exporter {
    config: Config,
    encoder: OtlpEncoder,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    cancel: watch::Receiver<bool>,
}

impl Exporter {
    pub fn new(
        config: Config,
        encoder: OtlpEncoder,
        transport: Arc<dyn Transport>,
        shared: Arc<Shared>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            encoder,
            transport,
            shared,
            cancel,
        }
    }

    /// Ship every drained kind concurrently. Batches of one kind go out in order.
    pub async fn run_cycle(
        &self,
        work: Vec<(SignalKind, Vec<Batch>)>,
        policy: &BackoffPolicy,
    ) -> CycleReport {
        let reports = join_all(
            work.into_iter()
                .map(|(kind, batches)| self.export_kind(kind, batches, policy)),
        )
        .await;

        let mut cycle = CycleReport::default();
        for report in reports {
            cycle.merge(report);
        }
        cycle
    }

    /// Once a batch has to go back, every later batch of the kind goes back
    /// with it so the queue keeps its order.
    #[instrument(skip_all, fields(kind = %kind, batches = batches.len()))]
    async fn export_kind(
        &self,
        kind: SignalKind,
        batches: Vec<Batch>,
        policy: &BackoffPolicy,
    ) -> CycleReport {
        let mut report = CycleReport::default();
        let mut remaining = batches.into_iter();

        while let Some(mut batch) = remaining.next() {
            match self.export_batch(&mut batch, policy).await {
                BatchResult::Delivered => {}
                BatchResult::Dropped(error) => report.record_failure(Some(error)),
                BatchResult::Requeue(error) => {
                    report.record_failure(Some(error));
                    let mut back = batch;
                    for rest in remaining.by_ref() {
                        back.extend(rest);
                    }
                    self.shared.metrics.record_requeued(kind, back.len());
                    report.requeue.push(back);
                }
            }
        }

        report
    }

    /// Unencodable items are removed from `batch` so a requeue does not carry them.
    async fn export_batch(&self, batch: &mut Batch, policy: &BackoffPolicy) -> BatchResult {
        let kind = batch.kind();
        let encoded = self.encoder.encode(batch);

        if !encoded.skipped.is_empty() {
            self.shared.metrics.record_skipped(kind, encoded.skipped.len());
            for (index, error) in &encoded.skipped {
                warn!(kind = %kind, index, error = %error, "Skipping item that cannot be encoded");
                self.shared.report(&PipelineError::Encoding(error.clone()));
            }
            batch.remove_positions(encoded.skipped.iter().map(|(index, _)| *index));
        }

        let Some(body) = encoded.body else {
            return BatchResult::Delivered;
        };

        let request = ExportRequest {
            kind,
            url: self.config.endpoint_for(kind),
            body,
            item_count: encoded.encoded,
        };

        let outcome = retry_with_backoff(
            policy,
            &self.cancel,
            |attempt| self.attempt(&request, attempt),
            |attempt, error: &ExportError, delay| {
                self.shared.metrics.record_retry(kind);
                warn!(
                    kind = %kind,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Send failed, retrying"
                );
            },
        )
        .await;

        match outcome {
            RetryOutcome::Succeeded { attempts, .. } => {
                self.shared.metrics.record_sent(kind, request.item_count);
                debug!(kind = %kind, items = request.item_count, attempts, "Batch delivered");
                BatchResult::Delivered
            }
            RetryOutcome::Permanent { error, attempts } => {
                self.shared.metrics.record_dropped(kind, batch.len());
                warn!(
                    kind = %kind,
                    items = batch.len(),
                    attempts,
                    error = %error,
                    "Batch rejected, dropping"
                );
                let error = PipelineError::from_export(error);
                self.shared.report(&error);
                BatchResult::Dropped(error)
            }
            RetryOutcome::Exhausted { error, attempts } => {
                warn!(
                    kind = %kind,
                    items = batch.len(),
                    attempts,
                    error = %error,
                    "Retries exhausted, requeueing"
                );
                let error = PipelineError::from_export(error);
                self.shared.report(&error);
                BatchResult::Requeue(error)
            }
            RetryOutcome::Cancelled { attempts, .. } => {
                debug!(kind = %kind, attempts, "Backoff cancelled by shutdown");
                BatchResult::Requeue(PipelineError::ShutDown)
            }
        }
    }

    async fn attempt(&self, request: &ExportRequest, attempt: u32) -> Result<(), ExportError> {
        let started = Instant::now();
        let result = self.transport.send(request).await;
        self.shared
            .metrics
            .record_attempt(request.kind, started.elapsed(), result.is_ok());
        debug!(
            kind = %request.kind,
            attempt,
            items = request.item_count,
            bytes = request.body.len(),
            ok = result.is_ok(),
            "Send attempt finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ResourceAttributes;
    use crate::model::{Lane, LogRecord, Severity, TelemetryItem};
    use crate::queue::QueuedItem;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` sends with the given error
    struct FlakyTransport {
        failures: u32,
        error: ExportError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, _request: &ExportRequest) -> Result<(), ExportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    fn batch(kind: SignalKind, bodies: &[&str]) -> Batch {
        let entries = bodies
            .iter()
            .map(|b| QueuedItem {
                item: TelemetryItem::from(LogRecord::new(Severity::Info, *b)),
                lane: Lane::Normal,
            })
            .collect();
        Batch::new(kind, entries)
    }

    fn exporter(transport: Arc<FlakyTransport>) -> (Exporter, Arc<Shared>, watch::Sender<bool>) {
        let config = Config::new("http://localhost:4318");
        let shared = Arc::new(Shared::new(SyncStatus::Idle));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let encoder = OtlpEncoder::new(&ResourceAttributes::new(), "test", "0.0.0");
        let exporter = Exporter::new(config, encoder, transport, shared.clone(), cancel_rx);
        (exporter, shared, cancel_tx)
    }

    fn policy(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let transport = Arc::new(FlakyTransport {
            failures: 1,
            error: ExportError::Timeout,
            calls: AtomicU32::new(0),
        });
        let (exporter, shared, _cancel) = exporter(transport.clone());

        let report = exporter
            .run_cycle(vec![(SignalKind::Logs, vec![batch(SignalKind::Logs, &["a"])])], &policy(2))
            .await;

        assert!(!report.failed);
        assert!(report.requeue.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        let logs = shared.metrics.snapshot().get(SignalKind::Logs);
        assert_eq!(logs.retries, 1);
        assert_eq!(logs.items_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_requeues_remaining_batches_in_order() {
        let transport = Arc::new(FlakyTransport {
            failures: u32::MAX,
            error: ExportError::Server {
                status: 503,
                body: String::new(),
            },
            calls: AtomicU32::new(0),
        });
        let (exporter, shared, _cancel) = exporter(transport.clone());
        let errors = Arc::new(AtomicU32::new(0));
        let counter = errors.clone();
        shared.subscribe_errors(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let batches = vec![batch(SignalKind::Logs, &["a", "b"]), batch(SignalKind::Logs, &["c"])];
        let report = exporter
            .run_cycle(vec![(SignalKind::Logs, batches)], &policy(1))
            .await;

        assert!(report.failed);
        assert!(matches!(
            report.result(),
            Err(PipelineError::TransientNetwork(_))
        ));
        // Only the first batch was attempted: 1 initial + 1 retry
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(report.requeue.len(), 1);
        assert_eq!(report.requeue[0].len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_drops_and_continues() {
        let transport = Arc::new(FlakyTransport {
            failures: 1,
            error: ExportError::Rejected {
                status: 400,
                body: "bad".to_string(),
            },
            calls: AtomicU32::new(0),
        });
        let (exporter, shared, _cancel) = exporter(transport.clone());

        let batches = vec![batch(SignalKind::Logs, &["a"]), batch(SignalKind::Logs, &["b"])];
        let report = exporter
            .run_cycle(vec![(SignalKind::Logs, batches)], &policy(3))
            .await;

        assert!(report.failed);
        assert!(report.requeue.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        let logs = shared.metrics.snapshot().get(SignalKind::Logs);
        assert_eq!(logs.items_dropped_permanent, 1);
        assert_eq!(logs.items_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_backoff_requeues_without_callback() {
        let transport = Arc::new(FlakyTransport {
            failures: u32::MAX,
            error: ExportError::Connection("refused".to_string()),
            calls: AtomicU32::new(0),
        });
        let (exporter, shared, cancel) = exporter(transport.clone());
        let errors = Arc::new(AtomicU32::new(0));
        let counter = errors.clone();
        shared.subscribe_errors(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        cancel.send(true).unwrap();

        let report = exporter
            .run_cycle(vec![(SignalKind::Logs, vec![batch(SignalKind::Logs, &["a"])])], &policy(5))
            .await;

        assert!(report.failed);
        assert_eq!(report.first_error, Some(PipelineError::ShutDown));
        assert_eq!(report.requeue.len(), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }
}
