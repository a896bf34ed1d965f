//! ## lyssna-capture::client
//! **Capture client state machine and receive loop**
//!
//! ```text
//! Idle -> Connecting -> Streaming -> Stopping -> Idle
//!            |              |
//!            +--> Error <---+--> (observers notified) -> Idle
//! ```
//!
//! One receive loop per client. The loop owns the read half of the channel;
//! the write half is shared with [`CaptureClient::inject`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use lyssna_config::CaptureConfig;
use lyssna_core::{Observer, Packet, PacketQueue, Subscription};
use lyssna_protocols::{ContentType, Direction, Encoder, Frame, FrameHeader, Value};
use lyssna_registry::ActionRegistry;
use lyssna_telemetry::MetricsRecorder;

use crate::connector::{BoxedStream, Connector};
use crate::error::{CaptureError, CaptureFailure};
use crate::filter::PacketFilter;
use crate::pipeline::FramePipeline;
use crate::reader::{read_frame, write_frame};
use crate::session::{Session, SessionStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Connecting,
    Streaming,
    Stopping,
    Error,
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// State shared between the client handle and its receive loop.
struct Shared {
    config: CaptureConfig,
    pipeline: FramePipeline,
    encoder: Encoder,
    state: Mutex<CaptureState>,
    session: Session,
    backlog: PacketQueue,
    sequence: AtomicU64,
    packets: Observer<Packet>,
    status: Observer<bool>,
    errors: Observer<CaptureFailure>,
    writer: AsyncMutex<Option<WriteHalf<BoxedStream>>>,
    metrics: OnceLock<MetricsRecorder>,
    /// Wakes a `start` that is still waiting on the connector.
    connect_cancel: Notify,
}

impl Shared {
    fn set_state(&self, next: CaptureState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = ?*state, to = ?next, "Capture state change");
            *state = next;
        }
    }

    fn report(&self, failure: CaptureFailure) {
        self.errors.emit(failure);
    }

    /// Connect failure: `Error`, notify, back to `Idle`.
    fn fail_connect(&self, err: CaptureError) -> CaptureError {
        self.set_state(CaptureState::Error);
        warn!(error = %err, "Capture connect failed");
        self.report(CaptureFailure::new(err.to_string(), None));
        self.set_state(CaptureState::Idle);
        err
    }

    fn handle_frame(&self, header: &FrameHeader, body: Bytes, filter: &PacketFilter) {
        let frame = match Frame::from_parts(header, body) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "Skipping frame with unknown tag");
                self.report(CaptureFailure::new(err.to_string(), None));
                return;
            }
        };

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let metrics = self.metrics.get();
        self.session.record_total();
        if let Some(metrics) = metrics {
            metrics.record_frame(frame.direction.as_str());
        }

        let started = Instant::now();
        let (packet, decode_error) = self.pipeline.process(sequence, frame);
        if let Some(metrics) = metrics {
            if packet.content_type == ContentType::Amf3 {
                metrics.observe_decode_latency(started.elapsed());
            }
        }

        match decode_error {
            Some(err) => {
                self.session.record_failure();
                if let Some(metrics) = metrics {
                    metrics.record_decode_failure();
                }
                warn!(sequence, error = %err, "Failed to decode packet");
                self.report(CaptureFailure::new(
                    format!("Failed to decode packet {sequence}: {err}"),
                    Some(sequence),
                ));
            }
            None if packet.decoded.is_some() => self.session.record_decoded(),
            None => {}
        }

        if !filter.matches(&packet) {
            self.session.record_filtered();
            if let Some(metrics) = metrics {
                metrics.record_filtered();
            }
            return;
        }

        if let Some(evicted) = self.backlog.packet_enqueue(packet.clone()) {
            trace!(sequence = evicted.sequence, "Backlog full, evicted oldest packet");
        }
        trace!(sequence, action = %packet.label(), len = packet.len(), "Emitting packet");
        self.packets.emit(packet);
        if let Some(metrics) = metrics {
            metrics.record_emitted();
        }
    }

    async fn finish(&self) {
        self.writer.lock().await.take();
        self.session.end();
        self.set_state(CaptureState::Idle);
        self.status.emit(false);
        info!("Capture stopped");
    }
}

async fn receive_loop(
    shared: Arc<Shared>,
    mut reader: ReadHalf<BoxedStream>,
    filter: PacketFilter,
    mut shutdown: watch::Receiver<bool>,
) {
    let max_len = shared.config.max_frame_len;
    let read_timeout = shared.config.read_timeout();

    let outcome = loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break Ok(()),
            frame = read_frame(&mut reader, max_len, read_timeout) => match frame {
                Ok(Some((header, body))) => shared.handle_frame(&header, body, &filter),
                Ok(None) => break Err(CaptureError::Disconnected),
                Err(err) => break Err(err),
            },
        }
    };

    if let Err(err) = outcome {
        shared.set_state(CaptureState::Error);
        warn!(error = %err, "Capture stream failed");
        shared.report(CaptureFailure::new(err.to_string(), None));
    }
    shared.finish().await;
}

/// Client side of the capture proxy link.
///
/// Never reconnects on its own; callers restart it after an IPC failure.
pub struct CaptureClient {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    running: AsyncMutex<Option<Running>>,
}

impl CaptureClient {
    pub fn new(
        config: CaptureConfig,
        registry: Arc<ActionRegistry>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let capacity = config.observer_capacity;
        let shared = Shared {
            pipeline: FramePipeline::new(registry, config.max_depth),
            encoder: Encoder::with_max_depth(config.max_depth),
            state: Mutex::new(CaptureState::Idle),
            session: Session::default(),
            backlog: PacketQueue::with_capacity(config.backlog_capacity),
            sequence: AtomicU64::new(0),
            packets: Observer::new("packets", capacity),
            status: Observer::new("capture_status", capacity),
            errors: Observer::new("capture_errors", capacity),
            writer: AsyncMutex::new(None),
            metrics: OnceLock::new(),
            connect_cancel: Notify::new(),
            config,
        };
        Self {
            shared: Arc::new(shared),
            connector,
            running: AsyncMutex::new(None),
        }
    }

    /// Records frame, decode and emission metrics into `metrics`. Only the
    /// first recorder is kept.
    pub fn with_metrics(self, metrics: MetricsRecorder) -> Self {
        if self.shared.metrics.set(metrics).is_err() {
            debug!("Metrics recorder already attached, ignoring replacement");
        }
        self
    }

    /// Connects to the proxy and starts the receive loop.
    #[instrument(skip(self), fields(target = %self.connector.target()))]
    pub async fn start(&self, filter: Option<&str>) -> Result<(), CaptureError> {
        let filter = match filter {
            Some(expression) => PacketFilter::parse(expression)?,
            None => PacketFilter::all(),
        };

        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            if !previous.handle.is_finished() {
                *running = Some(previous);
                return Err(CaptureError::AlreadyActive);
            }
            let _ = previous.handle.await;
        }

        // Registered before entering `Connecting` so a concurrent `stop`
        // that observes that state always reaches this waiter.
        let cancelled = self.shared.connect_cancel.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        self.shared.set_state(CaptureState::Connecting);
        let target = self.connector.target();
        let timeout = self.shared.config.connect_timeout();
        let stream = tokio::select! {
            biased;
            _ = &mut cancelled => {
                self.shared.set_state(CaptureState::Idle);
                info!("Capture connect cancelled");
                return Err(CaptureError::ConnectCancelled);
            }
            outcome = tokio::time::timeout(timeout, self.connector.connect()) => match outcome {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => {
                    return Err(self.shared.fail_connect(CaptureError::Connect { target, source }))
                }
                Err(_) => {
                    return Err(self
                        .shared
                        .fail_connect(CaptureError::ConnectTimeout { target, timeout }))
                }
            },
        };

        let (reader, writer) = tokio::io::split(stream);
        *self.shared.writer.lock().await = Some(writer);
        self.shared
            .session
            .begin((!filter.is_empty()).then(|| filter.expression().to_owned()));
        self.shared.set_state(CaptureState::Streaming);
        self.shared.status.emit(true);
        info!(filter = %filter, "Capture streaming");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(receive_loop(
            Arc::clone(&self.shared),
            reader,
            filter,
            shutdown_rx,
        ));
        *running = Some(Running { shutdown, handle });
        Ok(())
    }

    /// Abandons a connect still in progress; `start` then returns
    /// [`CaptureError::ConnectCancelled`]. No effect in any other state.
    pub fn cancel_connect(&self) {
        if self.state() == CaptureState::Connecting {
            self.shared.connect_cancel.notify_waiters();
        }
    }

    /// Stops the receive loop and waits for it. Safe to call in any state,
    /// including while `start` is still connecting.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.cancel_connect();
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        if !running.handle.is_finished() {
            self.shared.set_state(CaptureState::Stopping);
        }
        let _ = running.shutdown.send(true);
        if let Err(err) = running.handle.await {
            warn!(error = %err, "Capture receive loop aborted");
        }
        self.shared.set_state(CaptureState::Idle);
    }

    /// Encodes `payload` and writes it to the proxy as an AMF3 frame.
    #[instrument(skip(self, payload))]
    pub async fn inject(&self, direction: Direction, payload: &Value) -> Result<(), CaptureError> {
        if self.state() != CaptureState::Streaming {
            return Err(CaptureError::NotStreaming);
        }
        let body = self.shared.encoder.encode(payload)?;
        let frame = Frame::new(direction, ContentType::Amf3, body);

        let mut writer = self.shared.writer.lock().await;
        let writer = writer.as_mut().ok_or(CaptureError::NotStreaming)?;
        write_frame(writer, &frame).await?;
        debug!(len = frame.body.len(), "Injected frame");
        Ok(())
    }

    pub fn on_packet(&self) -> Subscription<Packet> {
        self.shared.packets.subscribe()
    }

    /// `true` when streaming starts, `false` when it ends for any reason.
    pub fn on_connection_status(&self) -> Subscription<bool> {
        self.shared.status.subscribe()
    }

    pub fn on_error(&self) -> Subscription<CaptureFailure> {
        self.shared.errors.subscribe()
    }

    pub fn state(&self) -> CaptureState {
        *self.shared.state.lock()
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == CaptureState::Streaming
    }

    pub fn session(&self) -> SessionStats {
        self.shared.session.snapshot()
    }

    /// Zeroes the session counters and empties the backlog.
    pub fn clear_session(&self) {
        self.shared.session.clear();
        self.shared.backlog.drain();
    }

    /// Takes every packet queued since the last drain.
    pub fn drain_backlog(&self) -> Vec<Packet> {
        self.shared.backlog.drain()
    }

    pub fn target(&self) -> String {
        self.connector.target()
    }
}
