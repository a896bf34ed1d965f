//! Capture session counters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

/// Snapshot of the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub active: bool,
    pub filter: Option<String>,
    /// Frames received, whether or not they passed the filter.
    pub total_packets: u64,
    pub decoded_packets: u64,
    pub decode_failures: u64,
    /// Packets dropped by the filter.
    pub filtered_packets: u64,
}

/// Live counters, written by the receive loop and read from anywhere.
#[derive(Debug, Default)]
pub(crate) struct Session {
    active: AtomicBool,
    filter: Mutex<Option<String>>,
    total: AtomicU64,
    decoded: AtomicU64,
    failures: AtomicU64,
    filtered: AtomicU64,
}

impl Session {
    pub(crate) fn begin(&self, filter: Option<String>) {
        *self.filter.lock() = filter;
        self.active.store(true, Ordering::Release);
    }

    pub(crate) fn end(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn record_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decoded(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Zeroes the counters. The filter is kept while capture is active.
    pub(crate) fn clear(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.decoded.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.filtered.store(0, Ordering::Relaxed);
        if !self.active.load(Ordering::Acquire) {
            *self.filter.lock() = None;
        }
    }

    pub(crate) fn snapshot(&self) -> SessionStats {
        SessionStats {
            active: self.active.load(Ordering::Acquire),
            filter: self.filter.lock().clone(),
            total_packets: self.total.load(Ordering::Relaxed),
            decoded_packets: self.decoded.load(Ordering::Relaxed),
            decode_failures: self.failures.load(Ordering::Relaxed),
            filtered_packets: self.filtered.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resets_counters() {
        let session = Session::default();
        session.begin(Some("hero.*".into()));
        session.record_total();
        session.record_failure();
        session.clear();
        let stats = session.snapshot();
        assert_eq!(stats.total_packets, 0);
        assert_eq!(stats.decode_failures, 0);
        assert_eq!(stats.filter.as_deref(), Some("hero.*"));

        session.end();
        session.clear();
        assert_eq!(session.snapshot(), SessionStats::default());
    }
}
