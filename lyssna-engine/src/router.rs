//! ## lyssna-engine::router
//! **Forwards captured packets to the traffic analysis endpoint**
//!
//! Each packet becomes one JSON line sent to the first healthy endpoint whose
//! name starts with [`ANALYSIS_ENDPOINT`]. Packets are dropped, not queued,
//! while no such endpoint is healthy.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use lyssna_core::Packet;
use lyssna_orchestrator::{EndpointAddress, EndpointDescriptor, Orchestrator};
use lyssna_protocols::Value;

pub const ANALYSIS_ENDPOINT: &str = "traffic-analysis";

/// Wire form of a forwarded packet.
#[derive(Debug, Serialize)]
pub struct PacketRecord<'a> {
    pub sequence: u64,
    pub direction: &'static str,
    pub captured_at: &'a DateTime<Utc>,
    pub content_type: &'static str,
    pub len: usize,
    pub action: Option<&'a str>,
    pub command_id: Option<u32>,
    pub category: Option<&'a str>,
    /// Decoded payload, or `None` with `raw` set when undecodable.
    pub payload: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl<'a> PacketRecord<'a> {
    pub fn from_packet(packet: &'a Packet) -> Self {
        Self {
            sequence: packet.sequence,
            direction: packet.direction.as_str(),
            captured_at: &packet.captured_at,
            content_type: packet.content_type.as_str(),
            len: packet.len(),
            action: packet.action.as_deref(),
            command_id: packet.command_id,
            category: packet.category.as_deref(),
            payload: packet.decoded.as_ref(),
            raw: packet.decoded.is_none().then(|| packet.hex()),
        }
    }
}

/// Delivery of serialized records to an endpoint.
#[async_trait]
pub trait PacketSink: Send + Sync {
    async fn forward(&self, endpoint: &EndpointDescriptor, line: &[u8]) -> io::Result<()>;
}

/// Opens a stream to the endpoint per record and writes one line.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamSink;

#[async_trait]
impl PacketSink for StreamSink {
    async fn forward(&self, endpoint: &EndpointDescriptor, line: &[u8]) -> io::Result<()> {
        match &endpoint.address {
            EndpointAddress::Tcp { host, port } => {
                let mut stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.write_all(line).await?;
                stream.shutdown().await
            }
            #[cfg(unix)]
            EndpointAddress::Unix(path) => {
                let mut stream = tokio::net::UnixStream::connect(path).await?;
                stream.write_all(line).await?;
                stream.shutdown().await
            }
            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot stream records to {other}"),
            )),
        }
    }
}

pub struct Router {
    orchestrator: Arc<Orchestrator>,
    sink: Arc<dyn PacketSink>,
    timeout: Duration,
    routed: AtomicU64,
    dropped: AtomicU64,
}

impl Router {
    pub fn new(orchestrator: Arc<Orchestrator>, sink: Arc<dyn PacketSink>, timeout: Duration) -> Self {
        Self {
            orchestrator,
            sink,
            timeout,
            routed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// First healthy analysis endpoint in name order.
    pub fn select(&self) -> Option<EndpointDescriptor> {
        self.orchestrator
            .descriptors()
            .into_iter()
            .filter(|descriptor| descriptor.name.starts_with(ANALYSIS_ENDPOINT))
            .find(|descriptor| self.orchestrator.is_healthy(&descriptor.name))
    }

    /// Returns the endpoint the packet was delivered to.
    pub async fn dispatch(&self, packet: &Packet) -> Option<String> {
        let Some(target) = self.select() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(sequence = packet.sequence, "No healthy analysis endpoint");
            return None;
        };

        let mut line = match serde_json::to_vec(&PacketRecord::from_packet(packet)) {
            Ok(line) => line,
            Err(error) => {
                warn!(sequence = packet.sequence, %error, "Packet not serializable");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        line.push(b'\n');

        let outcome = tokio::time::timeout(self.timeout, self.sink.forward(&target, &line)).await;
        match outcome {
            Ok(Ok(())) => {
                self.routed.fetch_add(1, Ordering::Relaxed);
                debug!(sequence = packet.sequence, endpoint = %target.name, "Packet routed");
                Some(target.name)
            }
            Ok(Err(error)) => {
                warn!(sequence = packet.sequence, endpoint = %target.name, %error, "Packet routing failed");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(_) => {
                warn!(sequence = packet.sequence, endpoint = %target.name, "Packet routing timed out");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn routed(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use bytes::Bytes;
    use parking_lot::Mutex;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use lyssna_config::{EndpointConfig, OrchestratorConfig};
    use lyssna_orchestrator::{EndpointProbe, EndpointStatus, ProbeError};
    use lyssna_protocols::{ContentType, Direction};

    use super::*;

    struct NamedProbe(&'static [&'static str]);

    #[async_trait]
    impl EndpointProbe for NamedProbe {
        async fn connect(&self, endpoint: &EndpointDescriptor) -> Result<(), ProbeError> {
            self.health_check(endpoint).await
        }

        async fn health_check(&self, endpoint: &EndpointDescriptor) -> Result<(), ProbeError> {
            if self.0.contains(&endpoint.name.as_str()) {
                Ok(())
            } else {
                Err(io::Error::from(io::ErrorKind::ConnectionRefused).into())
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<(String, Vec<u8>)>>);

    #[async_trait]
    impl PacketSink for RecordingSink {
        async fn forward(&self, endpoint: &EndpointDescriptor, line: &[u8]) -> io::Result<()> {
            self.0.lock().push((endpoint.name.clone(), line.to_vec()));
            Ok(())
        }
    }

    fn packet() -> Packet {
        let mut packet = Packet::new(
            3,
            Direction::Response,
            ContentType::Amf3,
            Bytes::from_static(&[0x0a, 0x0b, 0x01, 0x01]),
        )
        .with_decoded(Value::object([("cmd", Value::Integer(1003))]));
        packet.action = Some("hero.getHerosListFromTavern".into());
        packet.command_id = Some(1003);
        packet.category = Some("hero".into());
        packet
    }

    async fn orchestrator(reachable: &'static [&'static str]) -> Arc<Orchestrator> {
        let config = OrchestratorConfig {
            endpoints: vec![
                EndpointConfig::new("knowledge-query", "tcp://127.0.0.1:1"),
                EndpointConfig::new("traffic-analysis", "tcp://127.0.0.1:2"),
                EndpointConfig::new("traffic-analysis-b", "tcp://127.0.0.1:3"),
            ],
            ..OrchestratorConfig::default()
        };
        let orchestrator = Arc::new(Orchestrator::new(&config, Arc::new(NamedProbe(reachable))).unwrap());
        let mut events = orchestrator.on_status_changed();
        orchestrator.connect_all();
        let mut pending: HashSet<&str> = reachable.iter().copied().collect();
        while !pending.is_empty() {
            let change = events.recv().await.unwrap();
            if change.state.status == EndpointStatus::Connected {
                pending.remove(change.endpoint.as_str());
            }
        }
        orchestrator
    }

    #[tokio::test(start_paused = true)]
    async fn routes_to_first_healthy_analysis_endpoint() {
        let orchestrator = orchestrator(&["knowledge-query", "traffic-analysis-b"]).await;
        let sink = Arc::new(RecordingSink::default());
        let router = Router::new(Arc::clone(&orchestrator), sink.clone(), Duration::from_secs(1));

        let routed = router.dispatch(&packet()).await;
        assert_eq!(routed.as_deref(), Some("traffic-analysis-b"));
        assert_eq!(router.routed(), 1);

        let sent = sink.0.lock().clone();
        assert_eq!(sent.len(), 1);
        let record: serde_json::Value = serde_json::from_slice(&sent[0].1).unwrap();
        assert_eq!(record["sequence"], 3);
        assert_eq!(record["direction"], "response");
        assert_eq!(record["action"], "hero.getHerosListFromTavern");
        assert_eq!(record["category"], "hero");
        assert_eq!(record["payload"]["cmd"], 1003);
        assert!(record.get("raw").is_none());
        assert_eq!(sent[0].1.last(), Some(&b'\n'));

        orchestrator.disconnect_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn drops_packets_without_healthy_endpoint() {
        let orchestrator = orchestrator(&["knowledge-query"]).await;
        let router = Router::new(
            Arc::clone(&orchestrator),
            Arc::new(RecordingSink::default()),
            Duration::from_secs(1),
        );

        assert_eq!(router.dispatch(&packet()).await, None);
        assert_eq!(router.dropped(), 1);
        orchestrator.disconnect_all().await;
    }

    #[test]
    fn undecoded_packets_carry_hex() {
        let packet = Packet::new(
            9,
            Direction::Request,
            ContentType::Raw,
            Bytes::from_static(&[0x06, 0x09, 0x41]),
        );
        let record = serde_json::to_value(PacketRecord::from_packet(&packet)).unwrap();
        assert_eq!(record["raw"], "060941");
        assert!(record["payload"].is_null());
        assert_eq!(record["content_type"], "raw");
    }

    #[tokio::test]
    async fn stream_sink_writes_one_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let endpoint = EndpointDescriptor::new(
            ANALYSIS_ENDPOINT,
            EndpointAddress::Tcp {
                host: "127.0.0.1".into(),
                port,
            },
        );

        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).await.unwrap();
            received
        });
        StreamSink.forward(&endpoint, b"{\"sequence\":1}\n").await.unwrap();
        assert_eq!(accept.await.unwrap(), b"{\"sequence\":1}\n");
    }
}
