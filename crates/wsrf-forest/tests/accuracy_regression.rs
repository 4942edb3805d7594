//! Accuracy regression tests for wsrf-forest.
//!
//! These tests guard against algorithmic changes that degrade out-of-bag
//! accuracy or distort the forest statistics on a deterministic synthetic
//! dataset.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use wsrf_forest::{Column, Dataset, ForestConfig, Labels, PredictionKind, Variable};

// ---------------------------------------------------------------------------
// Helper: deterministic synthetic classification dataset
// ---------------------------------------------------------------------------

/// Generate a 300-observation, 3-class dataset with 10 variables.
///
/// Variables 0-2 are informative numerics (class * 3.0 + noise in [0, 0.5]).
/// Variables 3-7 are numeric noise in [0, 0.5].
/// Variable 8 is a categorical copy of the class with 20% noise.
/// Variable 9 is a categorical noise variable with 4 levels.
fn make_classification() -> (Dataset, Labels) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let n = 300;

    let mut numeric: Vec<Vec<f64>> = vec![Vec::with_capacity(n); 8];
    let mut informative_cat = Vec::with_capacity(n);
    let mut noise_cat = Vec::with_capacity(n);
    let mut codes = Vec::with_capacity(n);

    for i in 0..n {
        let class = (i % 3) as u32;
        codes.push(class + 1);
        for (f, column) in numeric.iter_mut().enumerate() {
            let base = if f < 3 { f64::from(class) * 3.0 } else { 0.0 };
            column.push(base + rng.r#gen::<f64>() * 0.5);
        }
        informative_cat.push(if rng.gen_bool(0.8) {
            class + 1
        } else {
            rng.gen_range(1..=3)
        });
        noise_cat.push(rng.gen_range(1..=4));
    }

    let mut variables: Vec<Variable> = (0..8).map(|f| Variable::continuous(format!("f{f}"))).collect();
    variables.push(Variable::discrete(
        "group",
        vec!["g1".into(), "g2".into(), "g3".into()],
    ));
    variables.push(Variable::discrete(
        "site",
        vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()],
    ));

    let mut columns: Vec<Column> = numeric.into_iter().map(Column::Real).collect();
    columns.push(Column::Discrete(informative_cat));
    columns.push(Column::Discrete(noise_cat));

    let dataset = Dataset::new(variables, columns).unwrap();
    let labels = Labels::new(codes, vec!["a".into(), "b".into(), "c".into()]).unwrap();
    (dataset, labels)
}

// ---------------------------------------------------------------------------
// a) oob_accuracy_above_threshold
// ---------------------------------------------------------------------------

/// OOB accuracy with 100 weighted trees must exceed 0.90.
///
/// Reference: informative variables separate the classes with a margin of 2.5.
#[test]
fn oob_accuracy_above_threshold() {
    let (ds, labels) = make_classification();
    let forest = ForestConfig::new(100)
        .unwrap()
        .with_seed(42)
        .fit(&ds, &labels)
        .unwrap();

    let accuracy = forest.oob().confusion().accuracy();
    assert!(accuracy > 0.90, "oob accuracy {accuracy} <= 0.90");
}

// ---------------------------------------------------------------------------
// b) uniform_subspace_accuracy_above_threshold
// ---------------------------------------------------------------------------

/// Uniform subspace selection must also learn the dataset.
#[test]
fn uniform_subspace_accuracy_above_threshold() {
    let (ds, labels) = make_classification();
    let forest = ForestConfig::new(100)
        .unwrap()
        .with_seed(42)
        .with_weighting(false)
        .fit(&ds, &labels)
        .unwrap();

    let error = forest.oob().error_rate().unwrap();
    assert!(error < 0.10, "oob error {error} >= 0.10");
}

// ---------------------------------------------------------------------------
// c) training_accuracy_above_threshold
// ---------------------------------------------------------------------------

/// Resubstitution accuracy must exceed 0.95.
#[test]
fn training_accuracy_above_threshold() {
    let (ds, labels) = make_classification();
    let forest = ForestConfig::new(50)
        .unwrap()
        .with_seed(42)
        .fit(&ds, &labels)
        .unwrap();

    let preds = forest.predict(&ds, PredictionKind::Class).unwrap();
    let correct = preds
        .classes()
        .unwrap()
        .iter()
        .enumerate()
        .filter(|&(obs, &c)| c == labels.class_of(obs))
        .count();
    let accuracy = correct as f64 / ds.n_observations() as f64;
    assert!(accuracy > 0.95, "training accuracy {accuracy} <= 0.95");
}

// ---------------------------------------------------------------------------
// d) informative_variables_rank_highest
// ---------------------------------------------------------------------------

/// The top-ranked variable under both measures must be informative.
#[test]
fn informative_variables_rank_highest() {
    let (ds, labels) = make_classification();
    let forest = ForestConfig::new(100)
        .unwrap()
        .with_seed(42)
        .with_importance(true)
        .fit(&ds, &labels)
        .unwrap();

    let igr = forest.importance().ranked_igr();
    let top = &igr[0].name;
    assert!(
        ["f0", "f1", "f2", "group"].contains(&top.as_str()),
        "top IGR variable is {top}"
    );

    let perm = forest.importance().ranked_permutation().unwrap();
    let top = &perm[0].name;
    assert!(
        ["f0", "f1", "f2", "group"].contains(&top.as_str()),
        "top permutation variable is {top}"
    );
}

// ---------------------------------------------------------------------------
// e) breiman_statistics_in_range
// ---------------------------------------------------------------------------

/// Strength lies in [-1, 1] and is positive for a learnable dataset.
#[test]
fn breiman_statistics_in_range() {
    let (ds, labels) = make_classification();
    let forest = ForestConfig::new(60)
        .unwrap()
        .with_seed(7)
        .fit(&ds, &labels)
        .unwrap();

    let oob = forest.oob();
    let strength = oob.strength().unwrap();
    assert!(strength > 0.0 && strength <= 1.0, "strength {strength}");

    if let Some(c_s2) = oob.c_s2() {
        assert!(c_s2.is_finite());
    }
}
