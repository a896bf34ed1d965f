//! ## lyssna-orchestrator::orchestrator
//! **Supervises a set of auxiliary endpoints**
//!
//! One tokio task per enabled endpoint. Each endpoint owns its state lock and
//! shutdown signal; the map lock only guards membership.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

use lyssna_config::{EndpointConfig, OrchestratorConfig};
use lyssna_core::{Observer, Subscription};

use crate::endpoint::EndpointDescriptor;
use crate::error::OrchestratorError;
use crate::probe::{EndpointProbe, ProbeError};
use crate::state::{EndpointState, StatusChange};
use crate::supervisor::{bounded, supervise, Schedule, StateCell};

struct Supervisor {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct EndpointSlot {
    descriptor: Mutex<EndpointDescriptor>,
    cell: Arc<StateCell>,
    task: Mutex<Option<Supervisor>>,
}

impl EndpointSlot {
    fn descriptor(&self) -> EndpointDescriptor {
        self.descriptor.lock().clone()
    }

    fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|supervisor| !supervisor.handle.is_finished())
    }

    fn signal_stop(&self) -> Option<Supervisor> {
        let supervisor = self.task.lock().take()?;
        // Receiver may already be gone if the loop exited on its own.
        let _ = supervisor.shutdown.send(true);
        Some(supervisor)
    }

    async fn stop(&self) {
        if let Some(supervisor) = self.signal_stop() {
            if let Err(error) = supervisor.handle.await {
                if error.is_panic() {
                    warn!(%error, "Endpoint supervisor panicked");
                }
            }
        }
        self.cell.disconnected();
    }
}

pub struct Orchestrator {
    schedule: Schedule,
    probe: Arc<dyn EndpointProbe>,
    endpoints: RwLock<BTreeMap<String, Arc<EndpointSlot>>>,
    events: Observer<StatusChange>,
    active: AtomicBool,
}

impl Orchestrator {
    pub fn new(config: &OrchestratorConfig, probe: Arc<dyn EndpointProbe>) -> Result<Self, OrchestratorError> {
        let orchestrator = Self {
            schedule: Schedule {
                health_interval: config.health_interval(),
                probe_timeout: config.probe_timeout(),
                failure_threshold: config.failure_threshold,
                backoff: config.backoff.clone(),
            },
            probe,
            endpoints: RwLock::new(BTreeMap::new()),
            events: Observer::new("endpoint_status", config.status_capacity),
            active: AtomicBool::new(false),
        };
        for endpoint in &config.endpoints {
            orchestrator.register(endpoint)?;
        }
        Ok(orchestrator)
    }

    fn register(&self, config: &EndpointConfig) -> Result<Arc<EndpointSlot>, OrchestratorError> {
        let descriptor =
            EndpointDescriptor::try_from(config).map_err(|source| OrchestratorError::InvalidAddress {
                name: config.name.clone(),
                source,
            })?;

        let mut endpoints = self.endpoints.write();
        if endpoints.contains_key(&descriptor.name) {
            return Err(OrchestratorError::DuplicateEndpoint(descriptor.name));
        }
        let name = descriptor.name.clone();
        let slot = Arc::new(EndpointSlot {
            cell: Arc::new(StateCell::new(name.clone(), self.events.clone())),
            descriptor: Mutex::new(descriptor),
            task: Mutex::new(None),
        });
        endpoints.insert(name, Arc::clone(&slot));
        Ok(slot)
    }

    fn slot(&self, name: &str) -> Result<Arc<EndpointSlot>, OrchestratorError> {
        self.endpoints
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownEndpoint(name.to_owned()))
    }

    fn slots(&self) -> Vec<Arc<EndpointSlot>> {
        self.endpoints.read().values().cloned().collect()
    }

    fn spawn(&self, slot: &EndpointSlot) {
        let descriptor = slot.descriptor();
        if !descriptor.enabled {
            return;
        }
        let mut task = slot.task.lock();
        if task.as_ref().is_some_and(|supervisor| !supervisor.handle.is_finished()) {
            return;
        }
        info!(endpoint = %descriptor.name, address = %descriptor.address, "Supervising endpoint");
        let (shutdown, receiver) = watch::channel(false);
        let handle = tokio::spawn(supervise(
            descriptor,
            Arc::clone(&slot.cell),
            Arc::clone(&self.probe),
            self.schedule.clone(),
            receiver,
        ));
        *task = Some(Supervisor { shutdown, handle });
    }

    /// Starts supervising every enabled endpoint. Endpoints already under
    /// supervision are left alone.
    pub fn connect_all(&self) {
        self.active.store(true, Ordering::SeqCst);
        let slots = self.slots();
        info!(endpoints = slots.len(), "Connecting auxiliary endpoints");
        for slot in slots {
            self.spawn(&slot);
        }
    }

    /// Stops every supervisory loop and waits for them to exit. All
    /// endpoints end up `Disconnected`.
    pub async fn disconnect_all(&self) {
        self.active.store(false, Ordering::SeqCst);
        for slot in self.slots() {
            slot.stop().await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn status(&self, name: &str) -> Option<EndpointState> {
        self.endpoints.read().get(name).map(|slot| slot.cell.snapshot())
    }

    pub fn all_statuses(&self) -> BTreeMap<String, EndpointState> {
        self.endpoints
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.cell.snapshot()))
            .collect()
    }

    pub fn on_status_changed(&self) -> Subscription<StatusChange> {
        self.events.subscribe()
    }

    /// Names of endpoints currently `Connected`.
    pub fn healthy_endpoints(&self) -> Vec<String> {
        self.endpoints
            .read()
            .iter()
            .filter(|(_, slot)| slot.cell.status().is_healthy())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_healthy(&self, name: &str) -> bool {
        self.status(name).is_some_and(|state| state.status.is_healthy())
    }

    pub fn descriptors(&self) -> Vec<EndpointDescriptor> {
        self.slots().iter().map(|slot| slot.descriptor()).collect()
    }

    /// Registers a new endpoint, supervising it right away if the
    /// orchestrator is connected.
    pub fn add_endpoint(&self, config: &EndpointConfig) -> Result<(), OrchestratorError> {
        let slot = self.register(config)?;
        info!(endpoint = %config.name, address = %config.address, "Endpoint added");
        if self.is_active() {
            self.spawn(&slot);
        }
        Ok(())
    }

    pub async fn remove_endpoint(&self, name: &str) -> Result<(), OrchestratorError> {
        let slot = self
            .endpoints
            .write()
            .remove(name)
            .ok_or_else(|| OrchestratorError::UnknownEndpoint(name.to_owned()))?;
        slot.stop().await;
        info!(endpoint = %name, "Endpoint removed");
        Ok(())
    }

    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), OrchestratorError> {
        let slot = self.slot(name)?;
        slot.descriptor.lock().enabled = enabled;
        if enabled {
            if self.is_active() && !slot.is_running() {
                self.spawn(&slot);
            }
        } else {
            slot.stop().await;
        }
        Ok(())
    }

    /// One bounded health check of every enabled endpoint, outside of the
    /// supervisory loops. Results are sorted by endpoint name.
    pub async fn check_all(&self) -> Vec<(String, Result<(), ProbeError>)> {
        let limit = self.schedule.probe_timeout;
        let mut checks = JoinSet::new();
        for descriptor in self.descriptors().into_iter().filter(|descriptor| descriptor.enabled) {
            let probe = Arc::clone(&self.probe);
            checks.spawn(async move {
                let result = bounded(limit, probe.health_check(&descriptor)).await;
                (descriptor.name, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(error) => warn!(%error, "Health check task failed"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        for slot in self.endpoints.get_mut().values() {
            slot.signal_stop();
        }
    }
}
