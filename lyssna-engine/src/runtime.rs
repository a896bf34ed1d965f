/*!
# Runtime

Owns every long-lived component and the tasks that connect them:

- endpoint supervision through the [`Orchestrator`],
- capture supervision, restarting the [`CaptureClient`] with backoff after
  the proxy link drops,
- the packet pipeline, forwarding packets to the analysis endpoint,
- a monitor turning status changes and capture failures into metrics and
  structured events.

Components are built once in [`Runtime::with_components`] and shared by `Arc`.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opentelemetry::KeyValue;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use lyssna_capture::{CaptureClient, CaptureError, CaptureFailure, Connector, LocalSocketConnector, PacketFilter};
use lyssna_config::{BackoffConfig, LyssnaConfig};
use lyssna_core::{Packet, Subscription};
use lyssna_orchestrator::{Backoff, EndpointProbe, Orchestrator, SocketProbe, StatusChange};
use lyssna_protocols::{Direction, Value};
use lyssna_registry::ActionRegistry;
use lyssna_telemetry::{EventLogger, MetricsRecorder};

use crate::error::EngineError;
use crate::request::build_request;
use crate::router::{PacketSink, Router, StreamSink};

pub struct Runtime {
    config: LyssnaConfig,
    registry: Arc<ActionRegistry>,
    capture: Arc<CaptureClient>,
    orchestrator: Arc<Orchestrator>,
    router: Arc<Router>,
    metrics: MetricsRecorder,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
}

impl Runtime {
    /// Builds the production component set: registry from the configured
    /// path, local socket capture link, socket probes and stream routing.
    pub fn new(config: LyssnaConfig) -> Result<Self, EngineError> {
        let registry = Arc::new(ActionRegistry::load(&config.registry.path));
        let connector = Arc::new(LocalSocketConnector::for_channel(&config.capture.channel));
        Self::with_components(
            config,
            registry,
            connector,
            Arc::new(SocketProbe),
            Arc::new(StreamSink),
        )
    }

    pub fn with_components(
        config: LyssnaConfig,
        registry: Arc<ActionRegistry>,
        connector: Arc<dyn Connector>,
        probe: Arc<dyn EndpointProbe>,
        sink: Arc<dyn PacketSink>,
    ) -> Result<Self, EngineError> {
        let metrics = MetricsRecorder::new()?;
        let capture = Arc::new(
            CaptureClient::new(config.capture.clone(), Arc::clone(&registry), connector)
                .with_metrics(metrics.clone()),
        );
        let orchestrator = Arc::new(Orchestrator::new(&config.orchestrator, probe)?);
        let router = Arc::new(Router::new(
            Arc::clone(&orchestrator),
            sink,
            config.orchestrator.probe_timeout(),
        ));
        let (shutdown, _) = watch::channel(false);

        info!(
            actions = registry.len(),
            endpoints = config.orchestrator.endpoints.len(),
            target = %capture.target(),
            "Runtime assembled"
        );
        Ok(Self {
            config,
            registry,
            capture,
            orchestrator,
            router,
            metrics,
            shutdown,
            running: AtomicBool::new(false),
        })
    }

    /// Runs until [`Runtime::shutdown`], then stops capture and disconnects
    /// every endpoint. `filter` overrides the configured capture filter.
    #[instrument(level = "info", name = "runtime", skip(self))]
    pub async fn run(&self, filter: Option<&str>) -> Result<(), EngineError> {
        let filter = filter.or(self.config.capture.filter.as_deref());
        if let Some(expression) = filter {
            PacketFilter::parse(expression).map_err(CaptureError::from)?;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        self.shutdown.send_replace(false);
        let mut stop = self.shutdown.subscribe();

        self.orchestrator.connect_all();

        let mut tasks = JoinSet::new();
        tasks.spawn(
            pump_packets(
                self.capture.on_packet(),
                Arc::clone(&self.router),
                self.shutdown.subscribe(),
            )
            .instrument(info_span!("packet_pipeline")),
        );
        tasks.spawn(
            monitor(
                self.orchestrator.on_status_changed(),
                self.capture.on_error(),
                self.metrics.clone(),
                self.shutdown.subscribe(),
            )
            .instrument(info_span!("monitor")),
        );
        if self.config.capture.auto_start {
            tasks.spawn(
                supervise_capture(
                    Arc::clone(&self.capture),
                    filter.map(str::to_owned),
                    self.config.capture.reconnect.clone(),
                    self.metrics.clone(),
                    self.shutdown.subscribe(),
                )
                .instrument(info_span!("capture_supervisor")),
            );
        } else {
            info!("Capture auto start disabled");
        }

        // The sender lives in `self`, so this only returns on shutdown.
        let _ = stop.wait_for(|stopped| *stopped).await;
        info!("Runtime shutting down");

        while let Some(joined) = tasks.join_next().await {
            if let Err(error) = joined {
                warn!(%error, "Runtime task failed");
            }
        }
        self.capture.stop().await;
        self.orchestrator.disconnect_all().await;
        self.running.store(false, Ordering::SeqCst);
        info!(
            routed = self.router.routed(),
            dropped = self.router.dropped(),
            "Runtime stopped"
        );
        Ok(())
    }

    /// Signals [`Runtime::run`] to return. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn build_request(&self, action: &str, data: Value) -> Result<Value, EngineError> {
        Ok(build_request(&self.registry, action, data)?)
    }

    /// Builds a request and injects it into the capture stream. Returns the
    /// request as sent.
    #[instrument(level = "debug", skip(self, data))]
    pub async fn send_request(&self, action: &str, data: Value) -> Result<Value, EngineError> {
        let request = self.build_request(action, data)?;
        self.capture.inject(Direction::Request, &request).await?;
        EventLogger::log_event("request_sent", vec![KeyValue::new("action", action.to_owned())]).await;
        Ok(request)
    }

    pub fn config(&self) -> &LyssnaConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn capture(&self) -> &Arc<CaptureClient> {
        &self.capture
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }
}

/// Keeps the capture client streaming. The client never reconnects itself,
/// so every end of stream is followed by a backoff and a fresh start.
async fn supervise_capture(
    capture: Arc<CaptureClient>,
    filter: Option<String>,
    reconnect: BackoffConfig,
    metrics: MetricsRecorder,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(&reconnect);
    let mut restarting = false;

    loop {
        if *shutdown.borrow() {
            return;
        }
        // Fresh subscription per attempt so a stale `false` cannot end the
        // next session early.
        let mut status = capture.on_connection_status();
        if restarting {
            metrics.record_capture_restart();
        }
        restarting = true;

        let start = capture.start(filter.as_deref());
        tokio::pin!(start);
        let started = tokio::select! {
            biased;
            result = &mut start => result,
            _ = shutdown.changed() => {
                capture.cancel_connect();
                let _ = start.await;
                return;
            }
        };

        match started {
            Ok(()) => {
                backoff.reset();
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => return,
                        event = status.recv() => match event {
                            Some(true) => continue,
                            Some(false) => break,
                            None => return,
                        },
                    }
                }
                warn!("Capture stream ended");
            }
            Err(error) => warn!(%error, "Capture start failed"),
        }

        let delay = backoff.next_delay();
        debug!(?delay, "Capture restart scheduled");
        tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn pump_packets(
    mut packets: Subscription<Packet>,
    router: Arc<Router>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let packet = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            packet = packets.recv() => packet,
        };
        let Some(packet) = packet else {
            break;
        };
        debug!(
            sequence = packet.sequence,
            direction = packet.direction.as_str(),
            action = %packet.label(),
            len = packet.len(),
            "Packet captured"
        );
        router.dispatch(&packet).await;
    }
}

async fn monitor(
    mut statuses: Subscription<StatusChange>,
    mut failures: Subscription<CaptureFailure>,
    metrics: MetricsRecorder,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            Some(change) = statuses.recv() => {
                let status = change.state.status.as_str();
                metrics.record_endpoint_transition(&change.endpoint, status);
                let mut metadata = vec![
                    KeyValue::new("endpoint", change.endpoint.clone()),
                    KeyValue::new("from", change.previous.as_str()),
                    KeyValue::new("to", status),
                    KeyValue::new("failures", i64::from(change.state.consecutive_failures)),
                ];
                if let Some(error) = change.state.last_error {
                    metadata.push(KeyValue::new("error", error));
                }
                EventLogger::log_event("endpoint_status", metadata).await;
            }
            Some(failure) = failures.recv() => {
                let mut metadata = vec![KeyValue::new("message", failure.message.clone())];
                if let Some(sequence) = failure.sequence {
                    metadata.push(KeyValue::new("sequence", sequence.to_string()));
                }
                EventLogger::log_event("capture_error", metadata).await;
            }
            else => break,
        }
    }
}
