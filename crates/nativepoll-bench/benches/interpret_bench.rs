//! Classification hot-path benchmarks.
//!
//! Measures the per-call cost of turning a raw result into an outcome, both
//! through the bare interpreter and through a wrapped platform call.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nativepoll_core::errno::{EAGAIN, EBADF, ECONNRESET, EPIPE};
use nativepoll_core::mock::MockSyscalls;
use nativepoll_core::{Config, Endpoint, Op, Platform, normalize};

fn platform() -> Platform<MockSyscalls> {
    Platform::init(MockSyscalls::new().without_recording(), &Config::default())
        .expect("mock platform bootstraps")
}

fn bench_interpreter(c: &mut Criterion) {
    let p = platform();
    let interp = p.interpreter();
    let mut group = c.benchmark_group("interpret_io");
    let cases: [(&str, isize); 5] = [
        ("done", 4096),
        ("would_block", -(EAGAIN as isize)),
        ("reset", -(EPIPE as isize)),
        ("closed", -(EBADF as isize)),
        ("generic", -(ECONNRESET as isize)),
    ];
    for (label, raw) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(label), &raw, |b, &raw| {
            b.iter(|| black_box(interp.io(Op::Write, black_box(raw))));
        });
    }
    group.finish();
}

fn bench_wrapped_write(c: &mut Criterion) {
    let p = platform();
    let buf = [0u8; 64];
    c.bench_function("platform_write_done", |b| {
        b.iter(|| black_box(p.write(black_box(3), &buf)));
    });
}

fn bench_normalize(c: &mut Criterion) {
    let v4 = "192.0.2.1:443".parse().unwrap();
    let v6 = "[2001:db8::1]:443".parse().unwrap();
    let mut group = c.benchmark_group("normalize");
    group.bench_function("ipv4", |b| b.iter(|| black_box(normalize(black_box(&v4)))));
    group.bench_function("ipv6", |b| b.iter(|| black_box(normalize(black_box(&v6)))));
    group.bench_function("demap", |b| {
        let ep = Endpoint::from(v4);
        b.iter(|| black_box(black_box(ep).to_socket_addr()));
    });
    group.finish();
}

criterion_group!(benches, bench_interpreter, bench_wrapped_write, bench_normalize);
criterion_main!(benches);
