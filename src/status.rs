//! Sync status state machine
//!
//! ```text
//! idle     --flush start-->        syncing
//! syncing  --all sends ok-->       success --auto--> idle
//! syncing  --batch failed-->       error   --auto--> idle
//! any      --config invalid-->     disabled
//! any      --delivery disabled-->  disabled
//! disabled --valid reconfigure-->  idle
//! ```
//!
//! Observers are called with each new status, outside the internal lock.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Delivery status reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Disabled,
    Idle,
    Syncing,
    Success,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Disabled => write!(f, "disabled"),
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

/// Inputs that move the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    FlushStarted,
    CycleSucceeded,
    CycleFailed,
    ConfigInvalid,
    /// Delivery switched off through `enabled: false`
    DeliveryDisabled,
    Reconfigured,
}

/// Callback invoked on every transition
pub type StatusObserver = Arc<dyn Fn(SyncStatus) + Send + Sync>;

/// Shared between the pipeline handle and the export worker
pub struct SyncStatusMachine {
    state: Mutex<SyncStatus>,
    observers: Mutex<Vec<StatusObserver>>,
    consecutive_failures: AtomicU32,
}

impl SyncStatusMachine {
    pub fn new(initial: SyncStatus) -> Self {
        Self {
            state: Mutex::new(initial),
            observers: Mutex::new(Vec::new()),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn current(&self) -> SyncStatus {
        *self.state.lock().expect("mutex poisoned")
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self, observer: StatusObserver) {
        self.observers.lock().expect("mutex poisoned").push(observer);
    }

    /// Apply an event. Returns the statuses passed through, in order; an event
    /// that is not valid in the current state changes nothing.
    pub fn apply(&self, event: StatusEvent) -> Vec<SyncStatus> {
        let transitions = {
            let mut state = self.state.lock().expect("mutex poisoned");
            let path = next_states(*state, event);
            if let Some(last) = path.last() {
                *state = *last;
            }
            path
        };

        match event {
            StatusEvent::CycleSucceeded if !transitions.is_empty() => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            StatusEvent::CycleFailed if !transitions.is_empty() => {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        if !transitions.is_empty() {
            let observers = self.observers.lock().expect("mutex poisoned").clone();
            for status in &transitions {
                tracing::debug!(status = %status, "Sync status changed");
                for observer in &observers {
                    observer(*status);
                }
            }
        }

        transitions
    }
}

impl fmt::Debug for SyncStatusMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncStatusMachine")
            .field("state", &self.current())
            .field("consecutive_failures", &self.consecutive_failures())
            .finish()
    }
}

fn next_states(current: SyncStatus, event: StatusEvent) -> Vec<SyncStatus> {
    use StatusEvent::*;
    use SyncStatus::*;

    match (current, event) {
        (Disabled, ConfigInvalid | DeliveryDisabled) => vec![],
        (_, ConfigInvalid | DeliveryDisabled) => vec![Disabled],
        (Disabled, Reconfigured) => vec![Idle],
        (Disabled, _) => vec![],
        (Idle, FlushStarted) => vec![Syncing],
        (Syncing, CycleSucceeded) => vec![Success, Idle],
        (Syncing, CycleFailed) => vec![Error, Idle],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_machine(initial: SyncStatus) -> (SyncStatusMachine, Arc<Mutex<Vec<SyncStatus>>>) {
        let machine = SyncStatusMachine::new(initial);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        machine.subscribe(Arc::new(move |s| sink.lock().unwrap().push(s)));
        (machine, seen)
    }

    #[test]
    fn test_successful_cycle() {
        let (machine, seen) = recording_machine(SyncStatus::Idle);
        machine.apply(StatusEvent::FlushStarted);
        machine.apply(StatusEvent::CycleSucceeded);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![SyncStatus::Syncing, SyncStatus::Success, SyncStatus::Idle]
        );
        assert_eq!(machine.current(), SyncStatus::Idle);
        assert_eq!(machine.consecutive_failures(), 0);
    }

    #[test]
    fn test_failed_cycles_count_and_reset() {
        let (machine, seen) = recording_machine(SyncStatus::Idle);
        for _ in 0..2 {
            machine.apply(StatusEvent::FlushStarted);
            machine.apply(StatusEvent::CycleFailed);
        }
        assert_eq!(machine.consecutive_failures(), 2);
        assert!(seen.lock().unwrap().contains(&SyncStatus::Error));

        machine.apply(StatusEvent::FlushStarted);
        machine.apply(StatusEvent::CycleSucceeded);
        assert_eq!(machine.consecutive_failures(), 0);
    }

    #[test]
    fn test_disabled_is_terminal_until_reconfigured() {
        let (machine, seen) = recording_machine(SyncStatus::Idle);
        machine.apply(StatusEvent::ConfigInvalid);
        assert_eq!(machine.current(), SyncStatus::Disabled);

        assert!(machine.apply(StatusEvent::FlushStarted).is_empty());
        assert!(machine.apply(StatusEvent::CycleSucceeded).is_empty());
        assert_eq!(machine.current(), SyncStatus::Disabled);

        machine.apply(StatusEvent::Reconfigured);
        assert_eq!(machine.current(), SyncStatus::Idle);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![SyncStatus::Disabled, SyncStatus::Idle]
        );
    }

    #[test]
    fn test_out_of_order_events_ignored() {
        let (machine, seen) = recording_machine(SyncStatus::Idle);
        assert!(machine.apply(StatusEvent::CycleSucceeded).is_empty());
        assert!(machine.apply(StatusEvent::Reconfigured).is_empty());
        machine.apply(StatusEvent::FlushStarted);
        assert!(machine.apply(StatusEvent::FlushStarted).is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![SyncStatus::Syncing]);
    }

    #[test]
    fn test_display() {
        assert_eq!(SyncStatus::Syncing.to_string(), "syncing");
        assert_eq!(SyncStatus::Disabled.to_string(), "disabled");
    }
}
