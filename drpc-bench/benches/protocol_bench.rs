//! Protocol encoding/decoding benchmarks.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use drpc_protocol::frame::{Frame, Opcode};
use drpc_protocol::message::{Message, Request};
use drpc_protocol::{Activity, ActivityAssets, ActivityButton, ActivityTimestamps, Decoder, Encoder};

fn create_test_request(payload_size: usize) -> Request {
    Request::new("SET_ACTIVITY", "4f1c8d2e-9a7b-4c3d-8e6f-0a1b2c3d4e5f").with_args(
        serde_json::json!({
            "pid": 4242,
            "activity": {
                "name": "Snek",
                "details": "x".repeat(payload_size),
            }
        }),
    )
}

fn create_test_response(payload_size: usize) -> Message {
    Message::response(
        "GET_GUILDS",
        "4f1c8d2e-9a7b-4c3d-8e6f-0a1b2c3d4e5f",
        serde_json::json!({
            "guilds": [{ "id": "1", "name": "x".repeat(payload_size) }],
        }),
    )
}

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [100, 1000, 10000] {
        let frame = Frame::new(Opcode::Frame, serde_json::json!({ "data": "x".repeat(size) }));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(frame.encode().unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for size in [100, 1000, 10000] {
        let frame = Frame::new(Opcode::Frame, serde_json::json!({ "data": "x".repeat(size) }));
        let encoded = frame.encode().unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = encoded.clone();
                black_box(Frame::decode(&mut buf).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_request_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_encode");

    for size in [100, 1000, 10000] {
        let request = create_test_request(size);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &request, |b, request| {
            b.iter(|| black_box(Encoder::encode_request(request).unwrap()));
        });
    }

    group.finish();
}

fn bench_response_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_decode");

    for size in [100, 1000, 10000] {
        let response = create_test_response(size);
        let encoded = Encoder::encode_json(Opcode::Frame, &response).unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                decoder.extend(encoded);
                let frame = decoder.decode_frame().unwrap().unwrap();
                black_box(Message::from_value(frame.payload).unwrap())
            });
        });
    }

    group.finish();
}

/// Decoding a burst of frames delivered in small reads.
fn bench_chunked_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunked_decode");

    let mut stream = BytesMut::new();
    for i in 0..100 {
        let dispatch = Message::dispatch("MESSAGE_CREATE", serde_json::json!({ "id": i }));
        stream.extend_from_slice(&Encoder::encode_json(Opcode::Frame, &dispatch).unwrap());
    }

    for chunk in [16, 256, 4096] {
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                let mut frames = 0;
                for piece in stream.chunks(chunk) {
                    decoder.extend(piece);
                    while let Some(frame) = decoder.decode_frame().unwrap() {
                        black_box(frame);
                        frames += 1;
                    }
                }
                assert_eq!(frames, 100);
            });
        });
    }

    group.finish();
}

fn bench_activity_validate(c: &mut Criterion) {
    let activity = Activity::new("Snek")
        .with_details("Level 3")
        .with_state("In a group")
        .with_party(Some("party-1".to_string()), 2, 4)
        .with_timestamps(ActivityTimestamps::now())
        .with_assets(ActivityAssets {
            large_image: Some("snek_large".to_string()),
            large_text: Some("Snek".to_string()),
            ..ActivityAssets::default()
        })
        .with_button(ActivityButton::new("Site", "https://example.com"));

    c.bench_function("activity_validate", |b| {
        b.iter(|| black_box(activity.validate().unwrap()));
    });
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_request_encode,
    bench_response_decode,
    bench_chunked_decode,
    bench_activity_validate,
);

criterion_main!(benches);
