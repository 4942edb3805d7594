//! Out-of-bag aggregation: votes, confusion, error rate, strength and correlation.

use crate::confusion::ConfusionMatrix;
use crate::dataset::Labels;
use crate::node::majority;
use crate::tree::DecisionTree;

/// Forest-level out-of-bag statistics.
///
/// Every rate is `None` when no observation was ever out of bag.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OobSummary {
    votes: Vec<Vec<usize>>,
    oob_counts: Vec<usize>,
    predictions: Vec<Option<usize>>,
    confusion: ConfusionMatrix,
    error_rate: Option<f64>,
    strength: Option<f64>,
    correlation: Option<f64>,
    c_s2: Option<f64>,
}

impl OobSummary {
    /// Aggregate the per-tree OOB predictions of `trees`.
    ///
    /// The margin of an observation is `(votes[actual] - votes[best other]) / oob_count`.
    /// Strength is the mean margin. Correlation is the margin variance over
    /// the squared mean per-tree standard deviation estimate
    /// `sqrt(p1 + p2 + (p1 - p2)^2)`, where `p1` is the tree's OOB accuracy
    /// and `p2` the fraction of its OOB predictions equal to the best other
    /// class. Trees with an empty OOB set are skipped in that mean.
    pub(crate) fn compute(trees: &[DecisionTree], labels: &Labels) -> Self {
        let n = labels.len();
        let n_labels = labels.n_labels();
        let mut votes = vec![vec![0usize; n_labels]; n];
        let mut oob_counts = vec![0usize; n];

        for tree in trees {
            for (&obs, &predicted) in tree.oob().iter().zip(tree.oob_predictions()) {
                votes[obs][predicted] += 1;
                oob_counts[obs] += 1;
            }
        }

        let mut confusion = ConfusionMatrix::new(labels.names().to_vec());
        let mut predictions = vec![None; n];
        let mut runner_up: Vec<Option<usize>> = vec![None; n];
        let mut n_oob = 0usize;
        let mut n_errors = 0usize;
        let mut sum_margin = 0.0;
        let mut sum_margin2 = 0.0;

        for obs in 0..n {
            if oob_counts[obs] == 0 {
                continue;
            }
            n_oob += 1;
            let row = &votes[obs];
            let predicted = majority(row);
            let actual = labels.class_of(obs);
            predictions[obs] = Some(predicted);
            confusion.record(actual, predicted);
            if predicted != actual {
                n_errors += 1;
            }

            let best_other = best_other_class(row, actual);
            runner_up[obs] = best_other;
            let other_votes = best_other.map_or(0, |j| row[j]);
            let margin = (row[actual] as f64 - other_votes as f64) / oob_counts[obs] as f64;
            sum_margin += margin;
            sum_margin2 += margin * margin;
        }

        if n_oob == 0 {
            return Self {
                votes,
                oob_counts,
                predictions,
                confusion,
                error_rate: None,
                strength: None,
                correlation: None,
                c_s2: None,
            };
        }

        let strength = sum_margin / n_oob as f64;
        let emr2 = sum_margin2 / n_oob as f64;

        let mut sum_sd = 0.0;
        let mut n_trees_with_oob = 0usize;
        for tree in trees {
            let Some(tree_error) = tree.oob_error_rate() else {
                continue;
            };
            let hits = tree
                .oob()
                .iter()
                .zip(tree.oob_predictions())
                .filter(|&(&obs, &predicted)| runner_up[obs] == Some(predicted))
                .count();
            let p1 = 1.0 - tree_error;
            let p2 = hits as f64 / tree.oob().len() as f64;
            sum_sd += (p1 + p2 + (p1 - p2) * (p1 - p2)).sqrt();
            n_trees_with_oob += 1;
        }

        let esd = sum_sd / n_trees_with_oob as f64;
        let correlation = (esd > 0.0).then(|| (emr2 - strength * strength) / (esd * esd));
        let c_s2 = correlation
            .filter(|_| strength != 0.0)
            .map(|c| c / (strength * strength));

        Self {
            votes,
            oob_counts,
            predictions,
            confusion,
            error_rate: Some(n_errors as f64 / n_oob as f64),
            strength: Some(strength),
            correlation,
            c_s2,
        }
    }

    /// Return the `N × L` matrix of OOB votes per observation.
    #[must_use]
    pub fn votes(&self) -> &[Vec<usize>] {
        &self.votes
    }

    /// Return how many trees had each observation out of bag.
    #[must_use]
    pub fn oob_counts(&self) -> &[usize] {
        &self.oob_counts
    }

    /// Return the majority OOB vote per observation, `None` when never out of bag.
    #[must_use]
    pub fn predictions(&self) -> &[Option<usize>] {
        &self.predictions
    }

    /// Return the OOB confusion matrix.
    #[must_use]
    pub fn confusion(&self) -> &ConfusionMatrix {
        &self.confusion
    }

    /// Return the fraction of OOB-voted observations whose majority vote is wrong.
    #[must_use]
    pub fn error_rate(&self) -> Option<f64> {
        self.error_rate
    }

    /// Return the mean margin.
    #[must_use]
    pub fn strength(&self) -> Option<f64> {
        self.strength
    }

    /// Return the mean correlation between trees.
    #[must_use]
    pub fn correlation(&self) -> Option<f64> {
        self.correlation
    }

    /// Return `correlation / strength^2`.
    #[must_use]
    pub fn c_s2(&self) -> Option<f64> {
        self.c_s2
    }
}

/// The class other than `actual` with the most votes, lowest index on ties.
fn best_other_class(votes: &[usize], actual: usize) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (label, &v) in votes.iter().enumerate() {
        if label != actual && best.is_none_or(|b| v > votes[b]) {
            best = Some(label);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn labels() -> Labels {
        Labels::new(vec![1, 1, 2, 2], vec!["a".into(), "b".into()]).unwrap()
    }

    /// A hand-assembled tree with fixed OOB predictions.
    fn tree(oob: Vec<usize>, predictions: Vec<usize>, error: Option<f64>) -> DecisionTree {
        DecisionTree {
            nodes: vec![Node::Leaf {
                label: 0,
                counts: vec![1, 1],
                n_obs: 2,
            }],
            seed: 0,
            bag: Vec::new(),
            oob,
            oob_predictions: predictions,
            oob_error_rate: error,
            label_oob_error_rates: vec![None, None],
            igr_importance: vec![0.0],
            permutation_importance: None,
        }
    }

    #[test]
    fn best_other_skips_actual() {
        assert_eq!(best_other_class(&[5, 3, 3], 0), Some(1));
        assert_eq!(best_other_class(&[1, 9, 2], 1), Some(2));
        assert_eq!(best_other_class(&[4], 0), None);
    }

    #[test]
    fn votes_and_error_rate() {
        let trees = vec![
            tree(vec![0, 2], vec![0, 1], Some(0.0)),
            tree(vec![0, 3], vec![1, 1], Some(0.5)),
            tree(vec![0], vec![0], Some(0.0)),
        ];
        let summary = OobSummary::compute(&trees, &labels());

        assert_eq!(summary.votes()[0], vec![2, 1]);
        assert_eq!(summary.oob_counts(), &[3, 0, 1, 1]);
        assert_eq!(summary.predictions(), &[Some(0), None, Some(1), Some(1)]);
        assert_eq!(summary.error_rate(), Some(0.0));
        assert_eq!(summary.confusion().total(), 3);
    }

    #[test]
    fn strength_is_mean_margin() {
        let trees = vec![
            tree(vec![0, 2], vec![0, 1], Some(0.0)),
            tree(vec![0, 3], vec![1, 1], Some(0.5)),
            tree(vec![0], vec![0], Some(0.0)),
        ];
        let summary = OobSummary::compute(&trees, &labels());
        // margins: obs0 (2-1)/3, obs2 1, obs3 1
        let expected = (1.0 / 3.0 + 1.0 + 1.0) / 3.0;
        let strength = summary.strength().unwrap();
        assert!((strength - expected).abs() / expected < 1e-12);
        assert!(summary.correlation().is_some());
    }

    #[test]
    fn correlation_matches_formula() {
        let trees = vec![
            tree(vec![0, 2], vec![0, 1], Some(0.0)),
            tree(vec![0, 3], vec![1, 1], Some(0.5)),
        ];
        let summary = OobSummary::compute(&trees, &labels());
        // margins: obs0 (1-1)/2 = 0, obs2 1, obs3 1
        let s = 2.0 / 3.0;
        let emr2 = 2.0 / 3.0;
        // tree 1: p1 = 1, p2 = 0; tree 2: p1 = 0.5, p2 = 1/2
        let sd1 = (1.0f64 + 0.0 + 1.0).sqrt();
        let sd2 = (0.5f64 + 0.5 + 0.0).sqrt();
        let esd = (sd1 + sd2) / 2.0;
        let expected = (emr2 - s * s) / (esd * esd);
        let corr = summary.correlation().unwrap();
        assert!((corr - expected).abs() / expected.abs() < 1e-12);
        let c_s2 = summary.c_s2().unwrap();
        assert!((c_s2 - expected / (s * s)).abs() / c_s2.abs() < 1e-12);
    }

    #[test]
    fn trees_without_oob_are_skipped() {
        let trees = vec![
            tree(vec![0, 2], vec![0, 1], Some(0.0)),
            tree(Vec::new(), Vec::new(), None),
        ];
        let summary = OobSummary::compute(&trees, &labels());
        assert!(summary.correlation().is_some_and(f64::is_finite));
    }

    #[test]
    fn never_oob_gives_none() {
        let trees = vec![tree(Vec::new(), Vec::new(), None)];
        let summary = OobSummary::compute(&trees, &labels());
        assert_eq!(summary.error_rate(), None);
        assert_eq!(summary.strength(), None);
        assert_eq!(summary.correlation(), None);
        assert_eq!(summary.c_s2(), None);
        assert!(summary.predictions().iter().all(Option::is_none));
    }
}
