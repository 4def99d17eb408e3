//! Pipeline lifecycle and producer API
//!
//! The host builds one [`Pipeline`] at startup and hands [`PipelineHandle`]
//! clones to instrumentation code. Handles never block and never fail: items
//! go straight onto the worker's channel.
//!
//! ```rust,ignore
//! let pipeline = Pipeline::builder(Config::load("courier.yaml")?)
//!     .resource(ResourceAttributes::new().service("checkout", "2.1.0"))
//!     .on_status(|status| println!("sync: {status}"))
//!     .start();
//!
//! pipeline.enqueue_log(LogRecord::new(Severity::Error, "payment failed"));
//! pipeline.flush().await?;
//! pipeline.shutdown().await;
//! ```

mod error;
mod export;
mod worker;

pub use error::{ErrorObserver, PipelineError};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::config::{Config, ConfigError};
use crate::encoder::{ContextProvider, ResourceAttributes};
use crate::metrics::MetricsSnapshot;
use crate::model::{Lane, LogRecord, MetricPoint, Severity, Span, TelemetryItem};
use crate::status::{StatusEvent, StatusObserver, SyncStatus};
use crate::transport::{HttpSender, Transport};
use export::Shared;
use worker::{Command, ExportWorker};

/// Where enqueued items go, swapped on reconfigure
struct Route {
    sender: Option<mpsc::UnboundedSender<Command>>,
    minimum_severity: Severity,
    prioritize_errors: bool,
}

impl Route {
    fn closed() -> Self {
        Self {
            sender: None,
            minimum_severity: Severity::Info,
            prioritize_errors: false,
        }
    }
}

/// Cheap, cloneable producer side of a pipeline
#[derive(Clone)]
pub struct PipelineHandle {
    route: Arc<RwLock<Route>>,
}

impl PipelineHandle {
    /// Queue a log record. Records below `sync_minimum_severity` are ignored;
    /// with `prioritize_errors`, error and fatal records use the priority lane.
    pub fn enqueue_log(&self, log: LogRecord) {
        self.enqueue_auto(log.into());
    }

    /// Queue a span; spans with an error status may use the priority lane
    pub fn enqueue_span(&self, span: Span) {
        self.enqueue_auto(span.into());
    }

    pub fn enqueue_metric(&self, metric: MetricPoint) {
        self.enqueue(metric.into(), Lane::Normal);
    }

    /// Queue any item on an explicit lane. Never blocks and never fails.
    pub fn enqueue(&self, item: TelemetryItem, lane: Lane) {
        let route = self.route.read().expect("lock poisoned");
        let Some(sender) = &route.sender else {
            trace!(kind = %item.kind(), "Pipeline inactive, dropping item");
            return;
        };

        if let TelemetryItem::Log(log) = &item {
            if log.severity < route.minimum_severity {
                trace!(severity = %log.severity, "Below minimum severity, dropping log");
                return;
            }
        }

        if sender.send(Command::Enqueue { item, lane }).is_err() {
            trace!("Worker gone, dropping item");
        }
    }

    fn enqueue_auto(&self, item: TelemetryItem) {
        let prioritize = self.route.read().expect("lock poisoned").prioritize_errors;
        let lane = if prioritize && item.is_error() {
            Lane::Priority
        } else {
            Lane::Normal
        };
        self.enqueue(item, lane);
    }

    /// Whether enqueued items currently reach a worker
    pub fn is_active(&self) -> bool {
        self.route.read().expect("lock poisoned").sender.is_some()
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Command>> {
        self.route.read().expect("lock poisoned").sender.clone()
    }

    fn replace(&self, route: Route) -> Option<mpsc::UnboundedSender<Command>> {
        let mut current = self.route.write().expect("lock poisoned");
        std::mem::replace(&mut *current, route).sender
    }
}

/// Configures and starts a [`Pipeline`]
pub struct PipelineBuilder {
    config: Config,
    provider: Option<Box<dyn ContextProvider>>,
    transport: Option<Arc<dyn Transport>>,
    status_observers: Vec<StatusObserver>,
    error_observers: Vec<ErrorObserver>,
}

impl PipelineBuilder {
    /// Source of resource attributes, read once at start
    pub fn resource(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    /// Replace the HTTP sender, e.g. with an in-memory transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn on_status(mut self, observer: impl Fn(SyncStatus) + Send + Sync + 'static) -> Self {
        self.status_observers.push(Arc::new(observer));
        self
    }

    pub fn on_error(mut self, observer: impl Fn(&PipelineError) + Send + Sync + 'static) -> Self {
        self.error_observers.push(Arc::new(observer));
        self
    }

    /// Validate the config and spawn the export worker.
    ///
    /// Must be called from within a Tokio runtime. An invalid config leaves
    /// the pipeline disabled; enqueued items are then dropped.
    pub fn start(self) -> Pipeline {
        let resource = self
            .provider
            .map(|p| p.resource_attributes())
            .unwrap_or_default();

        let initial = if self.config.enabled {
            SyncStatus::Idle
        } else {
            SyncStatus::Disabled
        };
        let shared = Arc::new(Shared::new(initial));
        for observer in self.status_observers {
            shared.status.subscribe(observer);
        }
        for observer in self.error_observers {
            shared.subscribe_errors(observer);
        }

        let pipeline = Pipeline {
            handle: PipelineHandle {
                route: Arc::new(RwLock::new(Route::closed())),
            },
            shared,
            resource,
            transport: self.transport,
            shut_down: AtomicBool::new(false),
        };

        if !self.config.enabled {
            info!("Telemetry delivery disabled by configuration");
            return pipeline;
        }

        if let Err(error) = pipeline.activate(self.config) {
            pipeline.disable(error);
        }
        pipeline
    }
}

/// A running telemetry pipeline
pub struct Pipeline {
    handle: PipelineHandle,
    shared: Arc<Shared>,
    resource: ResourceAttributes,
    transport: Option<Arc<dyn Transport>>,
    shut_down: AtomicBool,
}

impl Pipeline {
    pub fn builder(config: Config) -> PipelineBuilder {
        PipelineBuilder {
            config,
            provider: None,
            transport: None,
            status_observers: Vec::new(),
            error_observers: Vec::new(),
        }
    }

    /// Producer handle to pass to instrumentation code
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn enqueue_log(&self, log: LogRecord) {
        self.handle.enqueue_log(log);
    }

    pub fn enqueue_span(&self, span: Span) {
        self.handle.enqueue_span(span);
    }

    pub fn enqueue_metric(&self, metric: MetricPoint) {
        self.handle.enqueue_metric(metric);
    }

    pub fn enqueue(&self, item: TelemetryItem, lane: Lane) {
        self.handle.enqueue(item, lane);
    }

    /// Drain every queue and wait for the resulting sends.
    ///
    /// Joins a cycle that is already in flight instead of starting another.
    /// Succeeds immediately when nothing is queued.
    pub async fn flush(&self) -> Result<(), PipelineError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(PipelineError::ShutDown);
        }
        let Some(sender) = self.handle.sender() else {
            return Err(PipelineError::Disabled);
        };

        let (tx, rx) = oneshot::channel();
        sender
            .send(Command::Flush(tx))
            .map_err(|_| PipelineError::ShutDown)?;
        rx.await.map_err(|_| PipelineError::ShutDown)?
    }

    /// Items waiting in all queues
    pub async fn pending_count(&self) -> usize {
        let Some(sender) = self.handle.sender() else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if sender.send(Command::PendingCount(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Stop the worker after one bounded final flush. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(sender) = self.handle.replace(Route::closed()) {
            stop_worker(sender).await;
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Swap in a new config.
    ///
    /// The current worker delivers what it holds under the old settings, then
    /// a new one starts. An invalid config disables the pipeline until a valid
    /// one arrives.
    pub async fn reconfigure(&mut self, config: Config) -> Result<(), PipelineError> {
        if self.is_shut_down() {
            return Err(PipelineError::ShutDown);
        }

        if let Some(sender) = self.handle.replace(Route::closed()) {
            debug!("Stopping worker for reconfiguration");
            stop_worker(sender).await;
        }

        if !config.enabled {
            info!("Telemetry delivery disabled by reconfiguration");
            self.shared.status.apply(StatusEvent::DeliveryDisabled);
            return Ok(());
        }

        match self.activate(config) {
            Ok(()) => {
                self.shared.status.apply(StatusEvent::Reconfigured);
                info!("Pipeline reconfigured");
                Ok(())
            }
            Err(error) => {
                self.disable(error.clone());
                Err(PipelineError::Configuration(error))
            }
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.shared.status.current()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.shared.status.consecutive_failures()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn on_status(&self, observer: impl Fn(SyncStatus) + Send + Sync + 'static) {
        self.shared.status.subscribe(Arc::new(observer));
    }

    pub fn on_error(&self, observer: impl Fn(&PipelineError) + Send + Sync + 'static) {
        self.shared.subscribe_errors(Arc::new(observer));
    }

    /// Validate `config` and route the handle to a fresh worker
    fn activate(&self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;

        let transport: Arc<dyn Transport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => {
                let sender = HttpSender::new(&config, self.resource.project_id.clone())
                    .map_err(|e| ConfigError::ValidationError(format!("HTTP client: {e}")))?;
                Arc::new(sender)
            }
        };

        let minimum_severity = config.sync_minimum_severity;
        let prioritize_errors = config.prioritize_errors;
        info!(
            endpoint = %config.endpoint,
            batch_size = config.batch_size,
            max_queue_size = config.max_queue_size,
            "Starting telemetry pipeline"
        );
        let sender = ExportWorker::spawn(config, &self.resource, transport, self.shared.clone());
        self.handle.replace(Route {
            sender: Some(sender),
            minimum_severity,
            prioritize_errors,
        });
        Ok(())
    }

    fn disable(&self, error: ConfigError) {
        warn!(error = %error, "Invalid telemetry configuration, delivery disabled");
        self.shared.status.apply(StatusEvent::ConfigInvalid);
        self.shared.report(&PipelineError::Configuration(error));
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("status", &self.status())
            .field("active", &self.handle.is_active())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

async fn stop_worker(sender: mpsc::UnboundedSender<Command>) {
    let (tx, rx) = oneshot::channel();
    if sender.send(Command::Shutdown(tx)).is_ok() {
        let _ = rx.await;
    }
}
