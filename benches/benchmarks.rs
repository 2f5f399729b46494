use criterion::{criterion_group, criterion_main, Criterion};
use rastercube::{
    ApplyPixelCube, Cube, CubeView, DummyCube, ReduceTimeCube, ReducerKind, STReference,
    TimeDuration, TimeUnit,
};

const SIZE: (usize, usize) = (512, 512);
const STEPS: usize = 8;

fn view() -> CubeView {
    CubeView::new(STReference {
        srs: String::from("EPSG:32633"),
        left: 300000.0,
        right: 300000.0 + SIZE.1 as f64 * 10.0,
        bottom: 5000000.0,
        top: 5000000.0 + SIZE.0 as f64 * 10.0,
        nx: SIZE.1,
        ny: SIZE.0,
        t0: "2020-01-01".parse().unwrap(),
        t1: format!("2020-01-{:02}", STEPS).parse().unwrap(),
        dt: TimeDuration::new(1, TimeUnit::Day),
    })
}

fn bench_reduce_time(c: &mut Criterion) {
    let cube = DummyCube::create(view(), 2, 1.0, [STEPS, SIZE.0, SIZE.1]).unwrap();
    let reduced = ReduceTimeCube::create(
        cube,
        vec![
            (ReducerKind::Mean, String::from("band1")),
            (ReducerKind::Var, String::from("band2")),
        ],
    )
    .unwrap();
    c.bench_function("reduce_time_mean_var", |b| {
        b.iter(|| reduced.read_chunk(0).unwrap())
    });
}

fn bench_apply_pixel(c: &mut Criterion) {
    let cube = DummyCube::create(view(), 2, 0.2, [1, SIZE.0, SIZE.1]).unwrap();
    let applied = ApplyPixelCube::create(
        cube,
        vec![String::from("(band2 - band1) / (band2 + band1)")],
        None,
    )
    .unwrap();
    c.bench_function("apply_pixel_normalized_difference", |b| {
        b.iter(|| applied.read_chunk(0).unwrap())
    });
}

criterion_group!(benches, bench_reduce_time, bench_apply_pixel);
criterion_main!(benches);
