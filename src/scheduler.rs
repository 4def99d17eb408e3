//! Flush scheduling
//!
//! Pure decision logic; the export worker feeds it events and sleeps until
//! `next_deadline`. The periodic timer is only re-armed when a flush settles,
//! so the timer alone can never overlap two flushes. After a cycle fails, size
//! and priority triggers are held until the periodic tick retries the backlog.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::Config;
use crate::model::{Lane, SignalKind};

/// What asked for a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// A lane of this kind reached `batch_size`
    BatchFull(SignalKind),
    Timer,
    Explicit,
    /// A priority item was enqueued with `prioritize_errors` on
    Priority,
}

/// How the worker should act on a flush request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    StartNow,
    /// A cycle is running; the caller waits for it instead
    Coalesced,
    /// A cycle is running; another one follows when it settles
    Deferred,
    /// Shut down
    Refused,
}

#[derive(Debug)]
pub struct BatchScheduler {
    batch_size: usize,
    interval: Duration,
    prioritize_errors: bool,
    priority_delay: Duration,
    next_tick: Option<Instant>,
    priority_deadline: Option<Instant>,
    in_flight: bool,
    follow_up: Option<FlushReason>,
    /// Last cycle failed; only the timer or an explicit flush starts the next
    backing_off: bool,
    shut_down: bool,
}

impl BatchScheduler {
    pub fn new(config: &Config, now: Instant) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            interval: config.batch_interval(),
            prioritize_errors: config.prioritize_errors,
            priority_delay: config.priority_flush_delay(),
            next_tick: Some(now + config.batch_interval()),
            priority_deadline: None,
            in_flight: false,
            follow_up: None,
            backing_off: false,
            shut_down: false,
        }
    }

    /// Called after each enqueue with the lane length before and after it.
    ///
    /// The size trigger fires when the lane crosses `batch_size`, not on every
    /// enqueue above it.
    pub fn on_enqueue(
        &mut self,
        kind: SignalKind,
        lane: Lane,
        (before, after): (usize, usize),
        now: Instant,
    ) -> Option<FlushReason> {
        if self.shut_down || self.backing_off {
            return None;
        }
        if before < self.batch_size && after >= self.batch_size {
            return Some(FlushReason::BatchFull(kind));
        }
        if lane == Lane::Priority && self.prioritize_errors {
            let deadline = now + self.priority_delay;
            self.priority_deadline = Some(match self.priority_deadline {
                Some(existing) => existing.min(deadline),
                None => deadline,
            });
        }
        None
    }

    pub fn request(&mut self, reason: FlushReason) -> Decision {
        if self.shut_down {
            return Decision::Refused;
        }
        if !self.in_flight {
            return Decision::StartNow;
        }
        match reason {
            FlushReason::Explicit => Decision::Coalesced,
            other => {
                self.follow_up.get_or_insert(other);
                Decision::Deferred
            }
        }
    }

    /// Earliest timer-driven flush, if one is armed and nothing is in flight
    pub fn next_deadline(&self) -> Option<(Instant, FlushReason)> {
        if self.shut_down || self.in_flight {
            return None;
        }
        let tick = self.next_tick.map(|t| (t, FlushReason::Timer));
        let priority = self.priority_deadline.map(|t| (t, FlushReason::Priority));
        match (tick, priority) {
            (Some(t), Some(p)) => Some(if p.0 <= t.0 { p } else { t }),
            (t, p) => t.or(p),
        }
    }

    /// A cycle is starting: disarm timers until it settles
    pub fn begin(&mut self) {
        self.in_flight = true;
        self.next_tick = None;
        self.priority_deadline = None;
    }

    /// The cycle finished. Re-arms the periodic timer and returns a deferred
    /// request that should start right away. A failed cycle drops the deferred
    /// request; the backlog waits for the next tick.
    pub fn settle(&mut self, now: Instant, failed: bool) -> Option<FlushReason> {
        self.in_flight = false;
        self.backing_off = failed;
        if self.shut_down {
            return None;
        }
        self.next_tick = Some(now + self.interval);
        self.follow_up.take().filter(|_| !failed)
    }

    /// Stop scheduling. Returns false if already shut down.
    pub fn shutdown(&mut self) -> bool {
        if self.shut_down {
            return false;
        }
        self.shut_down = true;
        self.next_tick = None;
        self.priority_deadline = None;
        self.follow_up = None;
        true
    }
}
