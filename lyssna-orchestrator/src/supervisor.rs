//! ## lyssna-orchestrator::supervisor
//! **Per-endpoint supervisory loop**
//!
//! ```text
//! Disconnected -> Connecting -> Connected <-> Degraded
//!                     ^   |         |            |
//!                     |   +-------> Error <------+
//!                     +-- backoff --+
//! ```
//!
//! Every probe is bounded by the probe timeout and every wait observes the
//! endpoint's shutdown signal, so a stopped loop exits within one poll.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use lyssna_config::BackoffConfig;
use lyssna_core::Observer;

use crate::backoff::Backoff;
use crate::endpoint::EndpointDescriptor;
use crate::probe::{EndpointProbe, ProbeError};
use crate::state::{EndpointState, EndpointStatus, StatusChange};

/// Timing shared by every loop of one orchestrator.
#[derive(Debug, Clone)]
pub(crate) struct Schedule {
    pub health_interval: Duration,
    pub probe_timeout: Duration,
    pub failure_threshold: u32,
    pub backoff: BackoffConfig,
}

/// State cell for one endpoint plus the channel its changes are published on.
#[derive(Debug)]
pub(crate) struct StateCell {
    name: String,
    state: Mutex<EndpointState>,
    events: Observer<StatusChange>,
}

impl StateCell {
    pub fn new(name: String, events: Observer<StatusChange>) -> Self {
        Self {
            name,
            state: Mutex::new(EndpointState::new()),
            events,
        }
    }

    pub fn snapshot(&self) -> EndpointState {
        self.state.lock().clone()
    }

    pub fn status(&self) -> EndpointStatus {
        self.state.lock().status
    }

    /// Applies `update` and publishes the result if the status changed.
    fn update(&self, status: EndpointStatus, update: impl FnOnce(&mut EndpointState)) {
        let change = {
            let mut state = self.state.lock();
            let previous = state.status;
            update(&mut state);
            state.status = status;
            if previous == status {
                None
            } else {
                state.since = Instant::now();
                Some(StatusChange {
                    endpoint: self.name.clone(),
                    previous,
                    state: state.clone(),
                })
            }
        };

        if let Some(change) = change {
            info!(
                endpoint = %self.name,
                from = change.previous.as_str(),
                to = status.as_str(),
                failures = change.state.consecutive_failures,
                "Endpoint status changed"
            );
            self.events.emit(change);
        }
    }

    fn succeeded(&self) {
        self.update(EndpointStatus::Connected, |state| {
            state.consecutive_failures = 0;
            state.last_error = None;
            state.last_healthy = Some(Utc::now());
        });
    }

    fn failed(&self, status: EndpointStatus, error: &ProbeError) {
        self.update(status, |state| {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.last_error = Some(error.to_string());
        });
    }

    fn failure_count(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    pub fn connecting(&self) {
        self.update(EndpointStatus::Connecting, |_| {});
    }

    pub fn disconnected(&self) {
        self.update(EndpointStatus::Disconnected, |state| {
            state.consecutive_failures = 0;
        });
    }
}

/// Runs `future` unless shutdown is signalled first.
async fn cancellable<F: Future>(shutdown: &mut watch::Receiver<bool>, future: F) -> Option<F::Output> {
    if *shutdown.borrow() {
        return None;
    }
    tokio::select! {
        biased;
        _ = shutdown.changed() => None,
        output = future => Some(output),
    }
}

pub(crate) async fn bounded<F>(limit: Duration, probe: F) -> Result<(), ProbeError>
where
    F: Future<Output = Result<(), ProbeError>>,
{
    match time::timeout(limit, probe).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(limit)),
    }
}

enum Phase {
    Connect,
    Monitor,
    Backoff,
}

pub(crate) async fn supervise(
    descriptor: EndpointDescriptor,
    cell: Arc<StateCell>,
    probe: Arc<dyn EndpointProbe>,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(&schedule.backoff);
    let mut phase = Phase::Connect;
    let threshold = schedule.failure_threshold.max(1);
    debug!(endpoint = %descriptor.name, address = %descriptor.address, "Supervisor started");

    loop {
        phase = match phase {
            Phase::Connect => {
                cell.connecting();
                let attempt = bounded(schedule.probe_timeout, probe.connect(&descriptor));
                let Some(result) = cancellable(&mut shutdown, attempt).await else {
                    break;
                };
                match result {
                    Ok(()) => {
                        backoff.reset();
                        cell.succeeded();
                        Phase::Monitor
                    }
                    Err(error) => {
                        debug!(endpoint = %descriptor.name, %error, "Connect attempt failed");
                        if cell.failure_count() + 1 >= threshold {
                            cell.failed(EndpointStatus::Error, &error);
                            Phase::Backoff
                        } else {
                            cell.failed(EndpointStatus::Connecting, &error);
                            Phase::Connect
                        }
                    }
                }
            }
            Phase::Monitor => {
                if cancellable(&mut shutdown, time::sleep(schedule.health_interval))
                    .await
                    .is_none()
                {
                    break;
                }
                let check = bounded(schedule.probe_timeout, probe.health_check(&descriptor));
                let Some(result) = cancellable(&mut shutdown, check).await else {
                    break;
                };
                match result {
                    Ok(()) => {
                        cell.succeeded();
                        Phase::Monitor
                    }
                    Err(error) => {
                        // A connected endpoint always passes through Degraded,
                        // even with a threshold of one.
                        let degraded = cell.status() == EndpointStatus::Degraded;
                        if degraded && cell.failure_count() + 1 >= threshold {
                            warn!(endpoint = %descriptor.name, %error, "Health check failure threshold reached");
                            cell.failed(EndpointStatus::Error, &error);
                            Phase::Backoff
                        } else {
                            cell.failed(EndpointStatus::Degraded, &error);
                            Phase::Monitor
                        }
                    }
                }
            }
            Phase::Backoff => {
                let delay = backoff.next_delay();
                debug!(endpoint = %descriptor.name, ?delay, attempt = backoff.attempt(), "Backing off");
                if cancellable(&mut shutdown, time::sleep(delay)).await.is_none() {
                    break;
                }
                Phase::Connect
            }
        };
    }

    debug!(endpoint = %descriptor.name, "Supervisor stopped");
}
