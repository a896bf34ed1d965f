//! ## lyssna-core::queue
//! **Bounded packet backlog on crossbeam's segmented queue**
//!
//! The capture receive loop is the only producer. When the backlog is full
//! the oldest packet is evicted so a stalled consumer never stalls capture.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::SegQueue;

use crate::packet::Packet;

pub struct PacketQueue {
    queue: SegQueue<Packet>,
    capacity: usize,
    evicted: AtomicU64,
}

impl PacketQueue {
    /// Create new backlog with fixed capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: SegQueue::new(),
            capacity: capacity.max(1),
            evicted: AtomicU64::new(0),
        }
    }

    /// Enqueue a packet, returning the evicted packet if the backlog was full
    pub fn packet_enqueue(&self, packet: Packet) -> Option<Packet> {
        let mut evicted = None;
        while self.queue.len() >= self.capacity {
            evicted = self.queue.pop();
            if evicted.is_some() {
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.queue.push(packet);
        evicted
    }

    pub fn packet_dequeue(&self) -> Option<Packet> {
        self.queue.pop()
    }

    /// Removes and returns every queued packet in capture order
    pub fn drain(&self) -> Vec<Packet> {
        let mut packets = Vec::with_capacity(self.queue.len());
        while let Some(packet) = self.queue.pop() {
            packets.push(packet);
        }
        packets
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Packets dropped to make room since creation
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use lyssna_protocols::{ContentType, Direction};

    use super::*;

    fn packet(sequence: u64) -> Packet {
        Packet::new(
            sequence,
            Direction::Response,
            ContentType::Raw,
            Bytes::from(vec![sequence as u8]),
        )
    }

    #[test]
    fn enqueue_dequeue_roundtrip() {
        let queue = PacketQueue::with_capacity(1000);
        for i in 0..1000 {
            assert!(queue.packet_enqueue(packet(i)).is_none());
        }
        for i in 0..1000 {
            let packet = queue.packet_dequeue().unwrap();
            assert_eq!(packet.sequence, i);
            assert_eq!(packet.raw[0], i as u8);
        }
    }

    #[test]
    fn full_backlog_evicts_oldest() {
        let queue = PacketQueue::with_capacity(2);
        queue.packet_enqueue(packet(1));
        queue.packet_enqueue(packet(2));
        let evicted = queue.packet_enqueue(packet(3)).unwrap();
        assert_eq!(evicted.sequence, 1);
        assert_eq!(queue.evicted(), 1);
        let sequences: Vec<_> = queue.drain().into_iter().map(|p| p.sequence).collect();
        assert_eq!(sequences, [2, 3]);
        assert!(queue.is_empty());
    }
}
