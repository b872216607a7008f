//! # Wrist Inverse Kinematics Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use teleop_lib::wrist_ctrl::{OrientationCmd, WristIk};

fn wrist_ik_benchmark(c: &mut Criterion) {
    // A single solve away from the singular home orientation
    let mut ik = WristIk::new();
    let cmd = OrientationCmd::new(10.0, 120.0, 30.0);

    c.bench_function("WristIk::solve", |b| b.iter(|| ik.solve(black_box(&cmd))));

    // A yaw sweep, which exercises the wrap suppression of the third servo
    let sweep: Vec<OrientationCmd> = (-180..=180)
        .step_by(5)
        .map(|y| OrientationCmd::new(-45.0, 100.0, y as f64))
        .collect();

    c.bench_function("WristIk::solve::yaw_sweep", |b| {
        b.iter(|| {
            let mut ik = WristIk::new();
            for cmd in sweep.iter() {
                black_box(ik.solve(cmd));
            }
        })
    });
}

criterion_group!(benches, wrist_ik_benchmark);
criterion_main!(benches);
