//! ## lyssna-telemetry::metrics
//! **Prometheus registry for the capture pipeline and endpoint supervision**

use std::time::Duration;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub frames: IntCounterVec,
    pub decode_failures: IntCounter,
    pub packets_emitted: IntCounter,
    pub packets_filtered: IntCounter,
    pub capture_restarts: IntCounter,
    pub endpoint_transitions: IntCounterVec,
    pub decode_latency: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let frames = IntCounterVec::new(
            Opts::new("lyssna_frames_total", "Frames read from the capture proxy"),
            &["direction"],
        )?;
        let decode_failures = IntCounter::new(
            "lyssna_decode_failures_total",
            "AMF3 bodies that failed to decode",
        )?;
        let packets_emitted = IntCounter::new(
            "lyssna_packets_emitted_total",
            "Packets delivered to observers",
        )?;
        let packets_filtered = IntCounter::new(
            "lyssna_packets_filtered_total",
            "Packets dropped by the capture filter",
        )?;
        let capture_restarts = IntCounter::new(
            "lyssna_capture_restarts_total",
            "Capture client restarts after IPC failures",
        )?;
        let endpoint_transitions = IntCounterVec::new(
            Opts::new(
                "lyssna_endpoint_transitions_total",
                "Endpoint status transitions",
            ),
            &["endpoint", "status"],
        )?;
        let decode_latency = Histogram::with_opts(
            HistogramOpts::new("lyssna_decode_latency_us", "AMF3 decode time per frame")
                .buckets(vec![10.0, 100.0, 1_000.0, 10_000.0, 100_000.0]),
        )?;

        registry.register(Box::new(frames.clone()))?;
        registry.register(Box::new(decode_failures.clone()))?;
        registry.register(Box::new(packets_emitted.clone()))?;
        registry.register(Box::new(packets_filtered.clone()))?;
        registry.register(Box::new(capture_restarts.clone()))?;
        registry.register(Box::new(endpoint_transitions.clone()))?;
        registry.register(Box::new(decode_latency.clone()))?;

        Ok(Self {
            registry,
            frames,
            decode_failures,
            packets_emitted,
            packets_filtered,
            capture_restarts,
            endpoint_transitions,
            decode_latency,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn record_frame(&self, direction: &str) {
        self.frames.with_label_values(&[direction]).inc();
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.inc();
    }

    pub fn record_emitted(&self) {
        self.packets_emitted.inc();
    }

    pub fn record_filtered(&self) {
        self.packets_filtered.inc();
    }

    pub fn record_capture_restart(&self) {
        self.capture_restarts.inc();
    }

    pub fn record_endpoint_transition(&self, endpoint: &str, status: &str) {
        self.endpoint_transitions
            .with_label_values(&[endpoint, status])
            .inc();
    }

    pub fn observe_decode_latency(&self, elapsed: Duration) {
        self.decode_latency.observe(elapsed.as_secs_f64() * 1_000_000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposition_contains_recorded_series() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.record_frame("request");
        metrics.record_frame("request");
        metrics.record_decode_failure();
        metrics.record_endpoint_transition("traffic-analysis", "connected");
        metrics.observe_decode_latency(Duration::from_micros(42));

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("lyssna_frames_total{direction=\"request\"} 2"));
        assert!(text.contains("lyssna_decode_failures_total 1"));
        assert!(text.contains(
            "lyssna_endpoint_transitions_total{endpoint=\"traffic-analysis\",status=\"connected\"} 1"
        ));
        assert!(text.contains("lyssna_decode_latency_us_count 1"));
    }
}
