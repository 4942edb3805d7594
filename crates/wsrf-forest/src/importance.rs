//! Variable importance aggregation across trees.

use crate::dataset::Variable;
use crate::tree::DecisionTree;

/// A ranked variable with name, importance score, and rank.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RankedVariable {
    /// Variable name.
    pub name: String,
    /// Importance score.
    pub importance: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Forest-level importance measures.
///
/// The IGR measure is the mean over trees of each tree's summed split gain
/// ratios. The permutation measure, present when trees were built with
/// importance on, is the mean over trees of each tree's `(L+1) × M` matrix:
/// rows `0..L` per class, row `L` the overall mean decrease in accuracy.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariableImportance {
    variable_names: Vec<String>,
    label_names: Vec<String>,
    igr: Vec<f64>,
    permutation: Option<Vec<Vec<f64>>>,
    permutation_sd: Option<Vec<Vec<f64>>>,
}

impl VariableImportance {
    pub(crate) fn aggregate(
        trees: &[DecisionTree],
        variables: &[Variable],
        label_names: &[String],
    ) -> Self {
        let n_variables = variables.len();
        let n_trees = trees.len().max(1) as f64;

        let mut igr = vec![0.0; n_variables];
        for tree in trees {
            for (total, &v) in igr.iter_mut().zip(tree.igr_importance()) {
                *total += v;
            }
        }
        igr.iter_mut().for_each(|v| *v /= n_trees);

        let per_tree: Option<Vec<&[Vec<f64>]>> =
            trees.iter().map(DecisionTree::permutation_importance).collect();
        let (permutation, permutation_sd) = match per_tree {
            Some(matrices) if !matrices.is_empty() => {
                let (mean, sd) = mean_and_spread(&matrices, label_names.len() + 1, n_variables);
                (Some(mean), Some(sd))
            }
            _ => (None, None),
        };

        Self {
            variable_names: variables.iter().map(|v| v.name().to_string()).collect(),
            label_names: label_names.to_vec(),
            igr,
            permutation,
            permutation_sd,
        }
    }

    /// Return the variable names, in column order.
    #[must_use]
    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    /// Return the class names labelling permutation rows `0..L`.
    #[must_use]
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Return the mean decrease in information gain ratio per variable.
    #[must_use]
    pub fn igr(&self) -> &[f64] {
        &self.igr
    }

    /// Return the mean `(L+1) × M` permutation matrix, if assessed.
    #[must_use]
    pub fn permutation(&self) -> Option<&[Vec<f64>]> {
        self.permutation.as_deref()
    }

    /// Return the spread of the permutation matrix across trees, if assessed.
    ///
    /// Each entry is `sqrt(Σ (x_t - mean)^2) / n_trees`.
    #[must_use]
    pub fn permutation_sd(&self) -> Option<&[Vec<f64>]> {
        self.permutation_sd.as_deref()
    }

    /// Return the overall mean decrease in accuracy per variable (the last permutation row).
    #[must_use]
    pub fn mean_decrease_accuracy(&self) -> Option<&[f64]> {
        self.permutation
            .as_ref()
            .and_then(|rows| rows.last())
            .map(Vec::as_slice)
    }

    /// Variables ranked by IGR importance, most important first.
    #[must_use]
    pub fn ranked_igr(&self) -> Vec<RankedVariable> {
        rank(&self.variable_names, &self.igr)
    }

    /// Variables ranked by mean decrease in accuracy, if assessed.
    #[must_use]
    pub fn ranked_permutation(&self) -> Option<Vec<RankedVariable>> {
        self.mean_decrease_accuracy()
            .map(|scores| rank(&self.variable_names, scores))
    }
}

/// Elementwise mean over trees and `sqrt(Σ d^2) / n` spread.
fn mean_and_spread(
    matrices: &[&[Vec<f64>]],
    n_rows: usize,
    n_cols: usize,
) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let n = matrices.len() as f64;
    let mut mean = vec![vec![0.0; n_cols]; n_rows];
    for m in matrices {
        for (acc_row, row) in mean.iter_mut().zip(m.iter()) {
            for (acc, &v) in acc_row.iter_mut().zip(row) {
                *acc += v;
            }
        }
    }
    mean.iter_mut().flatten().for_each(|v| *v /= n);

    let mut spread = vec![vec![0.0; n_cols]; n_rows];
    for m in matrices {
        for ((acc_row, row), mean_row) in spread.iter_mut().zip(m.iter()).zip(&mean) {
            for ((acc, &v), &mu) in acc_row.iter_mut().zip(row).zip(mean_row) {
                *acc += (v - mu) * (v - mu);
            }
        }
    }
    spread.iter_mut().flatten().for_each(|v| *v = v.sqrt() / n);

    (mean, spread)
}

/// Sort descending by score (stable, so ties keep column order) and assign 1-based ranks.
fn rank(names: &[String], scores: &[f64]) -> Vec<RankedVariable> {
    let mut ranked: Vec<RankedVariable> = names
        .iter()
        .zip(scores)
        .map(|(name, &importance)| RankedVariable {
            name: name.clone(),
            importance,
            rank: 0,
        })
        .collect();

    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    for (i, var) in ranked.iter_mut().enumerate() {
        var.rank = i + 1;
    }
    ranked
}
