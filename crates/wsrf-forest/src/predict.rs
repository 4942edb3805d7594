//! Prediction methods for the fitted forest.

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::dataset::Dataset;
use crate::error::ForestError;
use crate::forest::Forest;
use crate::node::{Node, majority};

/// What [`Forest::predict`] returns per observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionKind {
    /// Majority-vote class (lowest class on ties).
    Class,
    /// Number of trees voting for each class.
    Vote,
    /// Vote counts divided by the number of trees.
    Prob,
    /// Unweighted mean of the leaf class distributions.
    Aprob,
    /// Mean of the leaf class distributions weighted by tree OOB accuracy.
    Waprob,
}

/// Per-observation predictions of one [`PredictionKind`].
///
/// Classes are zero-based indices into [`Forest::label_names`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predictions {
    /// One class per observation.
    Class(Vec<usize>),
    /// One vote vector of length L per observation.
    Vote(Vec<Vec<usize>>),
    /// One probability vector per observation.
    Prob(Vec<Vec<f64>>),
    /// One probability vector per observation.
    Aprob(Vec<Vec<f64>>),
    /// One probability vector per observation.
    Waprob(Vec<Vec<f64>>),
}

impl Predictions {
    /// Return the number of observations predicted.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Class(v) => v.len(),
            Self::Vote(v) => v.len(),
            Self::Prob(v) | Self::Aprob(v) | Self::Waprob(v) => v.len(),
        }
    }

    /// Return `true` when no observation was predicted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the class predictions, if this is [`Predictions::Class`].
    #[must_use]
    pub fn classes(&self) -> Option<&[usize]> {
        match self {
            Self::Class(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Return the probability rows, for the three probability kinds.
    #[must_use]
    pub fn probabilities(&self) -> Option<&[Vec<f64>]> {
        match self {
            Self::Prob(v) | Self::Aprob(v) | Self::Waprob(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl Forest {
    /// Predict every observation of `dataset`.
    ///
    /// `dataset` is matched to the training schema by variable name first;
    /// categorical levels are matched by name and remapped onto the training
    /// encoding.
    ///
    /// # Errors
    ///
    /// | Variant                              | When                                          |
    /// |--------------------------------------|-----------------------------------------------|
    /// | [`ForestError::MissingVariable`]     | a training variable is absent                 |
    /// | [`ForestError::VariableKindMismatch`]| a variable changed between discrete/numeric   |
    /// | [`ForestError::CategoryMismatch`]    | unseen levels, or duplicated level names     |
    #[instrument(skip_all, fields(kind = ?kind, n_observations = dataset.n_observations()))]
    pub fn predict(&self, dataset: &Dataset, kind: PredictionKind) -> Result<Predictions, ForestError> {
        let data = dataset.conform_to(&self.schema)?;
        let n = data.n_observations();

        let predictions = match kind {
            PredictionKind::Class => Predictions::Class(
                (0..n)
                    .into_par_iter()
                    .map(|obs| majority(&self.votes(&data, obs)))
                    .collect(),
            ),
            PredictionKind::Vote => {
                Predictions::Vote((0..n).into_par_iter().map(|obs| self.votes(&data, obs)).collect())
            }
            PredictionKind::Prob => {
                let n_trees = self.trees.len() as f64;
                Predictions::Prob(
                    (0..n)
                        .into_par_iter()
                        .map(|obs| {
                            self.votes(&data, obs)
                                .into_iter()
                                .map(|v| v as f64 / n_trees)
                                .collect()
                        })
                        .collect(),
                )
            }
            PredictionKind::Aprob => Predictions::Aprob(
                (0..n)
                    .into_par_iter()
                    .map(|obs| self.weighted_distribution(&data, obs, false))
                    .collect(),
            ),
            PredictionKind::Waprob => Predictions::Waprob(
                (0..n)
                    .into_par_iter()
                    .map(|obs| self.weighted_distribution(&data, obs, true))
                    .collect(),
            ),
        };

        debug!(n_predicted = predictions.len(), "prediction complete");
        Ok(predictions)
    }

    fn votes(&self, data: &Dataset, obs: usize) -> Vec<usize> {
        let mut votes = vec![0usize; self.schema.n_labels()];
        for tree in &self.trees {
            votes[tree.classify(data, obs, None)] += 1;
        }
        votes
    }

    /// Leaf distributions averaged over trees.
    ///
    /// With `by_accuracy`, tree `t` weighs `1 - oob_error_t` (0 when it had no
    /// OOB set); if every weight is 0 the unweighted mean is used.
    fn weighted_distribution(&self, data: &Dataset, obs: usize, by_accuracy: bool) -> Vec<f64> {
        let n_labels = self.schema.n_labels();
        let mut plain = vec![0.0; n_labels];
        let mut weighted = vec![0.0; n_labels];
        let mut total_weight = 0.0;

        for tree in &self.trees {
            let Node::Leaf { counts, .. } = tree.leaf(data, obs, None) else {
                continue;
            };
            let sum: usize = counts.iter().sum();
            if sum == 0 {
                continue;
            }
            let weight = tree.oob_error_rate().map_or(0.0, |e| 1.0 - e);
            total_weight += weight;
            for ((p, w), &c) in plain.iter_mut().zip(weighted.iter_mut()).zip(counts) {
                let share = c as f64 / sum as f64;
                *p += share;
                *w += share * weight;
            }
        }

        if by_accuracy && total_weight > 0.0 {
            weighted.iter_mut().for_each(|v| *v /= total_weight);
            return weighted;
        }
        let n_trees = self.trees.len() as f64;
        plain.iter_mut().for_each(|v| *v /= n_trees);
        plain
    }
}
