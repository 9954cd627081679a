//! Criterion benchmarks for GARCH estimation and forecasting.

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use volcast_core::data::absolute_returns;
use volcast_core::data::synthetic::{garch_price_series, SyntheticParams};
use volcast_core::model::{FittedGarch, GarchOrder};

fn returns(n: usize) -> Vec<f64> {
    let prices = garch_price_series(
        "BENCH",
        n + 1,
        NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
        SyntheticParams::default(),
    );
    absolute_returns(&prices, n as i64).values
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("garch_fit");
    group.sample_size(10);

    for n in [250, 500, 1000] {
        let data = returns(n);
        group.bench_with_input(BenchmarkId::new("garch_1_1", n), &data, |b, data| {
            b.iter(|| FittedGarch::fit(black_box(data), GarchOrder { p: 1, q: 1 }))
        });
    }

    let data = returns(1000);
    group.bench_function("garch_2_2_1000", |b| {
        b.iter(|| FittedGarch::fit(black_box(&data), GarchOrder { p: 2, q: 2 }))
    });

    group.finish();
}

fn bench_forecast(c: &mut Criterion) {
    let Ok(model) = FittedGarch::fit(&returns(1000), GarchOrder { p: 1, q: 1 }) else {
        return;
    };

    let mut group = c.benchmark_group("garch_forecast");
    for h in [5, 30, 365] {
        group.bench_with_input(BenchmarkId::from_parameter(h), &h, |b, &h| {
            b.iter(|| model.forecast_variance(black_box(h)).ok())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fit, bench_forecast);
criterion_main!(benches);
