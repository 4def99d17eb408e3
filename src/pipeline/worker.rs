//! Background export worker
//!
//! A single tokio task owns the queues and the scheduler. Producers only ever
//! send it `Command`s, so nothing on the producer side touches queue state or
//! waits on the network.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use super::error::PipelineError;
use super::export::{CycleReport, Exporter, Shared};
use crate::config::Config;
use crate::encoder::{OtlpEncoder, ResourceAttributes};
use crate::model::{Lane, SignalKind, TelemetryItem};
use crate::queue::{Batch, BoundedPriorityQueue};
use crate::retry::BackoffPolicy;
use crate::scheduler::{BatchScheduler, Decision, FlushReason};
use crate::status::StatusEvent;
use crate::transport::{ExportError, Transport};

/// Flush cycles started by this process
static CYCLE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_cycle_id() -> u64 {
    CYCLE_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

pub(crate) type FlushReply = oneshot::Sender<Result<(), PipelineError>>;

/// Messages from the producer side
pub(crate) enum Command {
    Enqueue { item: TelemetryItem, lane: Lane },
    Flush(FlushReply),
    PendingCount(oneshot::Sender<usize>),
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct ExportWorker {
    queues: BTreeMap<SignalKind, BoundedPriorityQueue>,
    scheduler: BatchScheduler,
    exporter: Arc<Exporter>,
    policy: BackoffPolicy,
    batch_size: usize,
    shutdown_timeout: Duration,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: watch::Sender<bool>,
    in_flight: Option<JoinHandle<CycleReport>>,
    waiters: Vec<FlushReply>,
    shared: Arc<Shared>,
}

impl ExportWorker {
    /// Start a worker task and return the channel that feeds it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        config: Config,
        resource: &ResourceAttributes,
        transport: Arc<dyn Transport>,
        shared: Arc<Shared>,
    ) -> mpsc::UnboundedSender<Command> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let encoder = OtlpEncoder::new(resource, &config.scope_name, env!("CARGO_PKG_VERSION"));
        let queues = SignalKind::ALL
            .iter()
            .map(|kind| (*kind, BoundedPriorityQueue::new(*kind, config.max_queue_size)))
            .collect();
        let scheduler = BatchScheduler::new(&config, Instant::now());
        let policy = BackoffPolicy::from_config(&config);
        let batch_size = config.batch_size.max(1);
        let shutdown_timeout = config.shutdown_timeout();
        let exporter = Exporter::new(config, encoder, transport, shared.clone(), cancel_rx);

        let worker = ExportWorker {
            queues,
            scheduler,
            policy,
            batch_size,
            shutdown_timeout,
            exporter: Arc::new(exporter),
            commands: rx,
            cancel: cancel_tx,
            in_flight: None,
            waiters: Vec::new(),
            shared,
        };

        tokio::spawn(worker.run());
        tx
    }

    async fn run(mut self) {
        debug!("Export worker started");
        loop {
            let deadline = self.scheduler.next_deadline();
            let wake_at = deadline.map(|(at, _)| at).unwrap_or_else(Instant::now);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        // Every handle is gone; deliver what we can
                        self.shutdown().await;
                        break;
                    }
                },
                report = wait_for_cycle(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.settle(report);
                }
                _ = sleep_until(wake_at), if deadline.is_some() => {
                    if let Some((_, reason)) = deadline {
                        self.request_flush(reason, None);
                    }
                }
            }
        }
        debug!("Export worker stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue { item, lane } => self.enqueue(item, lane),
            Command::Flush(reply) => self.request_flush(FlushReason::Explicit, Some(reply)),
            Command::PendingCount(reply) => {
                let _ = reply.send(self.pending_count());
            }
            Command::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    fn enqueue(&mut self, item: TelemetryItem, lane: Lane) {
        let kind = item.kind();
        let Some(queue) = self.queues.get_mut(&kind) else {
            return;
        };

        self.shared.metrics.record_enqueued(kind);
        let before = queue.lane_len(lane);
        if let Some(evicted) = queue.enqueue(item, lane) {
            self.shared.metrics.record_overflow(kind, 1);
            debug!(kind = %kind, lane = ?evicted.lane, "Queue full, evicted oldest item");
        }

        let lengths = (before, queue.lane_len(lane));
        if let Some(reason) = self.scheduler.on_enqueue(kind, lane, lengths, Instant::now()) {
            self.request_flush(reason, None);
        }
    }

    fn pending_count(&self) -> usize {
        self.queues.values().map(BoundedPriorityQueue::pending_count).sum()
    }

    fn request_flush(&mut self, reason: FlushReason, waiter: Option<FlushReply>) {
        match self.scheduler.request(reason) {
            Decision::StartNow => {
                self.waiters.extend(waiter);
                self.start_cycle(reason);
            }
            Decision::Coalesced => {
                debug!(reason = ?reason, "Joining in-flight cycle");
                self.waiters.extend(waiter);
            }
            Decision::Deferred => {
                debug!(reason = ?reason, "Cycle in flight, follow-up scheduled");
                self.waiters.extend(waiter);
            }
            Decision::Refused => {
                if let Some(waiter) = waiter {
                    let _ = waiter.send(Err(PipelineError::ShutDown));
                }
            }
        }
    }

    /// Take everything queued, in batches of at most `batch_size`
    fn drain(&mut self) -> Vec<(SignalKind, Vec<Batch>)> {
        let mut work = Vec::new();
        for (kind, queue) in self.queues.iter_mut() {
            let mut batches = Vec::new();
            while !queue.is_empty() {
                batches.push(queue.dequeue_batch(self.batch_size));
            }
            if !batches.is_empty() {
                work.push((*kind, batches));
            }
        }
        work
    }

    fn start_cycle(&mut self, reason: FlushReason) {
        self.scheduler.begin();
        let work = self.drain();

        if work.is_empty() {
            // Nothing to send: no request, no status change
            self.resolve_waiters(Ok(()));
            if let Some(next) = self.scheduler.settle(Instant::now(), false) {
                self.request_flush(next, None);
            }
            return;
        }

        self.shared.status.apply(StatusEvent::FlushStarted);

        let cycle = next_cycle_id();
        let items: usize = work
            .iter()
            .flat_map(|(_, batches)| batches.iter().map(Batch::len))
            .sum();
        let span = info_span!("flush_cycle", cycle, reason = ?reason);
        span.in_scope(|| debug!(items, kinds = work.len(), "Starting flush cycle"));

        let exporter = self.exporter.clone();
        let policy = self.policy.clone();
        self.in_flight = Some(tokio::spawn(
            async move { exporter.run_cycle(work, &policy).await }.instrument(span),
        ));
    }

    fn settle(&mut self, report: CycleReport) {
        self.in_flight = None;
        self.apply_report(&report);
        self.resolve_waiters(report.result());

        if report.failed {
            debug!("Cycle failed, holding size and priority triggers until the next tick");
        }
        if let Some(next) = self.scheduler.settle(Instant::now(), report.failed) {
            self.request_flush(next, None);
        }
    }

    /// Requeue failed batches and move the status machine
    fn apply_report(&mut self, report: &CycleReport) {
        for batch in &report.requeue {
            let kind = batch.kind();
            if let Some(queue) = self.queues.get_mut(&kind) {
                let evicted = queue.requeue_front(batch.clone());
                if !evicted.is_empty() {
                    self.shared.metrics.record_overflow(kind, evicted.len());
                    warn!(
                        kind = %kind,
                        evicted = evicted.len(),
                        "Queue overflowed while requeueing"
                    );
                }
            }
        }

        let event = if report.failed {
            StatusEvent::CycleFailed
        } else {
            StatusEvent::CycleSucceeded
        };
        self.shared.status.apply(event);
    }

    fn resolve_waiters(&mut self, result: Result<(), PipelineError>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    /// Cancel timers and backoff waits, let the in-flight cycle finish, then
    /// make one bounded single-attempt pass over whatever is left.
    async fn shutdown(&mut self) {
        if !self.scheduler.shutdown() {
            return;
        }
        let _ = self.cancel.send(true);

        if let Some(mut handle) = self.in_flight.take() {
            debug!("Waiting for in-flight cycle before shutdown");
            let report = join_cycle(&mut handle).await;
            self.apply_report(&report);
            self.resolve_waiters(report.result());
        }

        let work = self.drain();
        if !work.is_empty() {
            let items: usize = work
                .iter()
                .flat_map(|(_, batches)| batches.iter().map(Batch::len))
                .sum();
            info!(items, "Final flush before shutdown");

            let final_policy = BackoffPolicy {
                max_retries: 0,
                ..self.policy.clone()
            };
            self.shared.status.apply(StatusEvent::FlushStarted);
            let span = info_span!("final_flush", cycle = next_cycle_id());
            let cycle = self.exporter.run_cycle(work, &final_policy).instrument(span);

            match timeout(self.shutdown_timeout, cycle).await {
                Ok(report) => {
                    let undelivered: usize = report.requeue.iter().map(Batch::len).sum();
                    if undelivered > 0 {
                        warn!(items = undelivered, "Discarding undelivered items at shutdown");
                    }
                    let event = if report.failed {
                        StatusEvent::CycleFailed
                    } else {
                        StatusEvent::CycleSucceeded
                    };
                    self.shared.status.apply(event);
                }
                Err(_) => {
                    warn!(
                        timeout_ms = self.shutdown_timeout.as_millis() as u64,
                        "Final flush timed out"
                    );
                    self.shared.status.apply(StatusEvent::CycleFailed);
                }
            }
        }

        for queue in self.queues.values_mut() {
            while !queue.is_empty() {
                queue.dequeue_batch(usize::MAX);
            }
        }

        // Answer anything that raced with the shutdown request
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Flush(reply) => {
                    let _ = reply.send(Err(PipelineError::ShutDown));
                }
                Command::PendingCount(reply) => {
                    let _ = reply.send(0);
                }
                Command::Shutdown(reply) => {
                    let _ = reply.send(());
                }
                Command::Enqueue { .. } => {}
            }
        }
        info!("Export worker shut down");
    }
}

async fn wait_for_cycle(in_flight: &mut Option<JoinHandle<CycleReport>>) -> CycleReport {
    match in_flight {
        Some(handle) => join_cycle(handle).await,
        None => std::future::pending().await,
    }
}

async fn join_cycle(handle: &mut JoinHandle<CycleReport>) -> CycleReport {
    match handle.await {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "Flush cycle task failed");
            CycleReport::failure(PipelineError::TransientNetwork(ExportError::Connection(
                format!("flush cycle aborted: {e}"),
            )))
        }
    }
}
