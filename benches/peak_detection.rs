use criterion::Criterion;

use mzchrom::test_data::noisy_gaussian_series;
use mzchrom::{PeakDetector, SamplePool, SampleSeries};

fn chromatogram() -> SampleSeries {
    noisy_gaussian_series(
        5000,
        &[
            (500.0, 8.0, 5000.0),
            (1500.0, 12.0, 2500.0),
            (2600.0, 6.0, 900.0),
            (4100.0, 20.0, 12000.0),
        ],
        100.0,
        10.0,
        42,
    )
}

fn detection(c: &mut Criterion) {
    let series = chromatogram();
    let detector = PeakDetector::default();
    c.bench_function("detect", |b| b.iter(|| detector.detect(&series)));

    let pool = SamplePool::new();
    c.bench_function("detect_with_pool", |b| {
        b.iter(|| detector.detect_with_pool(&series, &pool))
    });

    c.bench_function("detect_in_range", |b| {
        b.iter(|| detector.detect_in_range(&series, 1000, 2000))
    });
}

fn batch_detection(c: &mut Criterion) {
    let batch: Vec<SampleSeries> = (0..32)
        .map(|seed| {
            noisy_gaussian_series(2000, &[(400.0, 8.0, 3000.0), (1300.0, 10.0, 1500.0)], 50.0, 10.0, seed)
        })
        .collect();
    let detector = PeakDetector::default();
    c.bench_function("detect_many", |b| b.iter(|| detector.detect_many(&batch)));
}

criterion::criterion_group!(benches, detection, batch_detection);
criterion::criterion_main!(benches);
