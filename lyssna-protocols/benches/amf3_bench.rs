#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};

use lyssna_protocols::{amf3, Value};

fn sample_packet() -> Value {
    Value::object([
        ("cmd", Value::Integer(1001)),
        ("action", Value::from("hero.hireHero")),
        ("seq", Value::Integer(7)),
        (
            "data",
            Value::object([
                ("castleId", Value::Integer(5)),
                ("heroName", Value::from("Aurelia")),
            ]),
        ),
    ])
}

fn sample_roster(len: usize) -> Value {
    Value::array(
        (0..len)
            .map(|i| {
                Value::object([
                    ("heroId", Value::Integer(i as i32)),
                    ("heroName", Value::from(format!("Hero {}", i % 16))),
                    ("status", Value::from("idle")),
                ])
            })
            .collect(),
    )
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("amf3_decode");
    let packet = amf3::encode(&sample_packet()).unwrap();
    group.throughput(criterion::Throughput::Bytes(packet.len() as u64));
    group.bench_function("hire_hero", |b| {
        b.iter(|| amf3::decode(black_box(&packet)).unwrap())
    });

    let roster = amf3::encode(&sample_roster(256)).unwrap();
    group.throughput(criterion::Throughput::Bytes(roster.len() as u64));
    group.bench_function("roster_256", |b| {
        b.iter(|| amf3::decode(black_box(&roster)).unwrap())
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("amf3_encode");
    let packet = sample_packet();
    group.bench_function("hire_hero", |b| {
        b.iter(|| amf3::encode(black_box(&packet)).unwrap())
    });
    let roster = sample_roster(256);
    group.bench_function("roster_256", |b| {
        b.iter(|| amf3::encode(black_box(&roster)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
