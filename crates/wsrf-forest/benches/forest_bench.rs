//! Criterion benchmarks for wsrf-forest: forest training, prediction and split search.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use wsrf_forest::{
    Column, Dataset, ForestConfig, Labels, PredictionKind, SplitEvaluator, Variable, VariableIndex,
};

fn make_classification(
    n_samples: usize,
    n_features: usize,
    n_classes: usize,
    seed: u64,
) -> (Dataset, Labels) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(n_samples); n_features];
    let mut codes = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let class = i % n_classes;
        codes.push(class as u32 + 1);
        for (f, column) in columns.iter_mut().enumerate() {
            let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
            column.push(base + rng.r#gen::<f64>() * 0.5);
        }
    }
    let variables = (0..n_features)
        .map(|f| Variable::continuous(format!("f{f}")))
        .collect();
    let dataset = Dataset::new(variables, columns.into_iter().map(Column::Real).collect()).unwrap();
    let names = (0..n_classes).map(|c| format!("c{c}")).collect();
    (dataset, Labels::new(codes, names).unwrap())
}

fn bench_forest_train(c: &mut Criterion) {
    let (ds, labels) = make_classification(500, 20, 5, 42);
    let cfg = ForestConfig::new(50).unwrap().with_seed(42);

    c.bench_function("forest_train_500x20_5class_50trees", |b| {
        b.iter(|| cfg.fit(&ds, &labels).unwrap());
    });
}

fn bench_forest_predict(c: &mut Criterion) {
    let (ds, labels) = make_classification(500, 20, 5, 42);
    let forest = ForestConfig::new(50).unwrap().with_seed(42).fit(&ds, &labels).unwrap();

    c.bench_function("forest_predict_class_500x20_50trees", |b| {
        b.iter(|| forest.predict(&ds, PredictionKind::Class).unwrap());
    });
    c.bench_function("forest_predict_waprob_500x20_50trees", |b| {
        b.iter(|| forest.predict(&ds, PredictionKind::Waprob).unwrap());
    });
}

fn bench_single_tree(c: &mut Criterion) {
    let (ds, labels) = make_classification(500, 20, 5, 42);
    let cfg = ForestConfig::new(1).unwrap().with_seed(42);

    c.bench_function("forest_single_tree_500x20_5class", |b| {
        b.iter(|| cfg.fit(&ds, &labels).unwrap());
    });
}

fn bench_numeric_split(c: &mut Criterion) {
    let (ds, labels) = make_classification(2000, 1, 5, 42);
    let evaluator = SplitEvaluator::new(&ds, &labels, 2);
    let obs: Vec<usize> = (0..ds.n_observations()).collect();

    c.bench_function("split_numeric_2000obs", |b| {
        b.iter(|| evaluator.evaluate(VariableIndex::new(0), &obs));
    });
}

criterion_group!(
    benches,
    bench_forest_train,
    bench_forest_predict,
    bench_single_tree,
    bench_numeric_split
);
criterion_main!(benches);
