//! Framing and simulator throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rohcheck_core::core::protocol::{
    build_read_holding_registers, build_write_multiple_registers, crc16_modbus, parse_registers,
    parse_rtu_frame,
};
use rohcheck_core::core::simulator::VirtualHand;

fn crc_benchmark(c: &mut Criterion) {
    let data: Vec<u8> = (0..256).map(|i| (i % 256) as u8).collect();

    let mut group = c.benchmark_group("crc");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("crc16_modbus", |b| {
        b.iter(|| black_box(crc16_modbus(black_box(&data))))
    });

    group.finish();
}

fn frame_benchmark(c: &mut Criterion) {
    let values = [600u16; 6];
    let mut hand = VirtualHand::default();
    let request = build_read_holding_registers(2, 1095, 6).unwrap();
    let response = hand.process(&request).unwrap();

    let mut group = c.benchmark_group("frame");

    group.bench_function("build_write_multiple", |b| {
        b.iter(|| black_box(build_write_multiple_registers(2, black_box(1095), &values).unwrap()))
    });

    group.bench_function("parse_read_response", |b| {
        b.iter(|| {
            let frame = parse_rtu_frame(black_box(&response)).unwrap();
            black_box(frame)
        })
    });

    group.bench_function("parse_registers", |b| {
        let data = &response[3..response.len() - 2];
        b.iter(|| black_box(parse_registers(black_box(data))))
    });

    group.bench_function("simulator_round_trip", |b| {
        b.iter(|| black_box(hand.process(black_box(&request))))
    });

    group.finish();
}

criterion_group!(benches, crc_benchmark, frame_benchmark);
criterion_main!(benches);
