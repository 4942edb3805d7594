//! Per-tree permutation importance on the out-of-bag set.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::dataset::{Dataset, Labels};
use crate::tree::{ColumnOverride, DecisionTree};

/// Error counts of one tree over its OOB set, overall and per class.
struct OobErrors {
    total: usize,
    per_label: Vec<usize>,
}

fn count_errors(
    tree: &DecisionTree,
    dataset: &Dataset,
    labels: &Labels,
    column_override: Option<&ColumnOverride>,
) -> OobErrors {
    let mut errors = OobErrors {
        total: 0,
        per_label: vec![0; labels.n_labels()],
    };
    for &obs in &tree.oob {
        let actual = labels.class_of(obs);
        if tree.classify(dataset, obs, column_override) != actual {
            errors.total += 1;
            errors.per_label[actual] += 1;
        }
    }
    errors
}

/// Compute the `(L+1) × M` importance matrix of one built tree.
///
/// For every variable used by an internal node, its values are shuffled
/// among the OOB observations (Fisher–Yates, RNG seeded from the tree seed)
/// and the OOB set is reclassified. Row `l < L` holds the increase in the
/// error rate of class `l`; row `L` the increase in the overall error rate.
/// Unused variables, classes absent from the OOB set, and trees with an
/// empty OOB set all score 0.
pub(crate) fn assess_permutation_importance(
    tree: &DecisionTree,
    dataset: &Dataset,
    labels: &Labels,
) -> Vec<Vec<f64>> {
    let n_labels = labels.n_labels();
    let n_variables = dataset.n_variables();
    let mut matrix = vec![vec![0.0; n_variables]; n_labels + 1];

    let n_oob = tree.oob.len();
    let Some(base_rate) = tree.oob_error_rate else {
        return matrix;
    };

    let mut label_counts = vec![0usize; n_labels];
    for &obs in &tree.oob {
        label_counts[labels.class_of(obs)] += 1;
    }

    for variable in tree.used_variables() {
        let mut values: Vec<f64> = (0..dataset.n_observations())
            .map(|obs| dataset.value(variable, obs))
            .collect();
        let mut shuffled: Vec<f64> = tree.oob.iter().map(|&obs| values[obs]).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(tree.seed);
        shuffled.shuffle(&mut rng);
        for (&obs, &v) in tree.oob.iter().zip(&shuffled) {
            values[obs] = v;
        }

        let column_override = ColumnOverride { variable, values };
        let errors = count_errors(tree, dataset, labels, Some(&column_override));

        let col = variable.index();
        matrix[n_labels][col] = errors.total as f64 / n_oob as f64 - base_rate;
        for label in 0..n_labels {
            if let Some(label_rate) = tree.label_oob_error_rates[label] {
                matrix[label][col] =
                    errors.per_label[label] as f64 / label_counts[label] as f64 - label_rate;
            }
        }
    }

    matrix
}
