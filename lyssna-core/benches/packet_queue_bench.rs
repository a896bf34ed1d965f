#[macro_use]
extern crate criterion;

use bytes::Bytes;
use criterion::Criterion;

use lyssna_core::{Packet, PacketQueue};
use lyssna_protocols::{ContentType, Direction};

fn bench_packet_queue_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_queue_throughput");

    for capacity in [128, 1024, 16384] {
        group.throughput(criterion::Throughput::Elements(1));
        group.bench_function(format!("capacity_{}", capacity), |b| {
            let queue = PacketQueue::with_capacity(capacity);
            let packet = Packet::new(
                1,
                Direction::Response,
                ContentType::Amf3,
                Bytes::from_static(b"test_payload"),
            );
            b.iter(|| {
                queue.packet_enqueue(packet.clone());
                queue.packet_dequeue().unwrap();
            });
        });
    }

    group.bench_function("evicting_full_backlog", |b| {
        let queue = PacketQueue::with_capacity(128);
        let packet = Packet::new(
            1,
            Direction::Request,
            ContentType::Raw,
            Bytes::from_static(b"test_payload"),
        );
        for _ in 0..128 {
            queue.packet_enqueue(packet.clone());
        }
        b.iter(|| queue.packet_enqueue(packet.clone()));
    });
    group.finish();
}

criterion_group!(benches, bench_packet_queue_push_pop);
criterion_main!(benches);
