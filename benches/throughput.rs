//! Throughput Benchmark for the FlashKV client codec
//!
//! Measures command encoding and reply decoding, the two CPU-bound halves
//! of every round trip.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flashkv_client::protocol::{decode, encode_command, encode_command_into, RespParser};
use flashkv_client::{Pipeline, RespValue};

/// Benchmark command encoding
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_small", |b| {
        b.iter(|| black_box(encode_command(&["GET", "user:1000"]).unwrap()));
    });

    group.bench_function("set_medium", |b| {
        let value = "x".repeat(1024); // 1KB value
        b.iter(|| black_box(encode_command(&["SET", "key", value.as_str()]).unwrap()));
    });

    group.bench_function("set_large_reused_buffer", |b| {
        let value = vec![b'x'; 64 * 1024]; // 64KB value
        let mut buf = Vec::with_capacity(70 * 1024);
        b.iter(|| {
            buf.clear();
            let args: [&[u8]; 3] = [b"SET", b"key", &value];
            encode_command_into(&args, &mut buf).unwrap();
            black_box(buf.len());
        });
    });

    group.finish();
}

/// Benchmark reply decoding
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    let status = b"+OK\r\n".to_vec();
    group.bench_function("status", |b| {
        b.iter(|| black_box(decode(&status).unwrap()));
    });

    let bulk = RespValue::bulk_string(Bytes::from("x".repeat(1024))).serialize();
    group.bench_function("bulk_1kb", |b| {
        b.iter(|| black_box(decode(&bulk).unwrap()));
    });

    // Reply to an LRANGE of 100 elements
    let array = RespValue::array(
        (0..100)
            .map(|i| RespValue::bulk_string(format!("item:{}", i)))
            .collect(),
    )
    .serialize();
    group.bench_function("array_100", |b| {
        b.iter(|| black_box(decode(&array).unwrap()));
    });

    group.finish();
}

/// Benchmark draining a buffer of pipelined replies
fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(100));

    group.bench_function("build_100", |b| {
        b.iter(|| {
            let mut pipe = Pipeline::with_capacity(100);
            for i in 0..100 {
                let key = format!("key:{}", i);
                pipe.cmd(&["INCR", key.as_str()]).unwrap();
            }
            black_box(pipe.as_bytes().len());
        });
    });

    let mut replies = Vec::new();
    for i in 0..100 {
        RespValue::integer(i).serialize_into(&mut replies);
    }
    group.bench_function("parse_100_replies", |b| {
        let mut parser = RespParser::new();
        b.iter(|| {
            let mut offset = 0;
            while let Some((value, consumed)) = parser.parse(&replies[offset..]).unwrap() {
                black_box(value);
                offset += consumed;
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_pipeline);

criterion_main!(benches);
