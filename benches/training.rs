use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use diamond_price::data::{generate_diamonds, split_features_target};
use diamond_price::preprocessing::{DiamondFeatures, FeatureSchema};
use diamond_price::training::build_model;

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10);

    for n_rows in [1000, 5000, 20000].iter() {
        let (features, target) = split_features_target(&generate_diamonds(*n_rows, 42).unwrap()).unwrap();

        group.bench_with_input(BenchmarkId::new("fit_depth_5", n_rows), &features, |b, features| {
            b.iter(|| {
                let mut model = build_model(&FeatureSchema::diamonds(), features, Some(5)).unwrap();
                model.fit(black_box(features), &target).unwrap();
                model
            })
        });
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("prediction");

    let (features, target) = split_features_target(&generate_diamonds(5000, 42).unwrap()).unwrap();
    let mut model = build_model(&FeatureSchema::diamonds(), &features, Some(8)).unwrap();
    model.fit(&features, &target).unwrap();

    let single = DiamondFeatures::default().to_frame().unwrap();
    group.bench_function("single_row", |b| b.iter(|| model.predict(black_box(&single)).unwrap()));

    for n_rows in [100, 1000].iter() {
        let batch = features.head(Some(*n_rows));
        group.bench_with_input(BenchmarkId::new("batch", n_rows), &batch, |b, batch| {
            b.iter(|| model.predict(black_box(batch)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_training, bench_prediction);
criterion_main!(benches);
