//! C4.5 split search over discrete and continuous variables, and subspace selection.

use std::collections::BTreeMap;

use crate::cancel::Interrupt;
use crate::dataset::{Dataset, Labels};
use crate::error::ForestError;
use crate::node::VariableIndex;
use crate::sampling::{WeightTransform, WeightedSampler, random_sample};

/// Slack subtracted from the mean information gain so that a set of
/// identical gains all pass the above-average filter.
const MEAN_GAIN_EPSILON: f64 = 1e-6;

/// Bounds on the minimum number of observations each side of a numeric cut must keep.
const MIN_CUT_FLOOR: usize = 2;
const MIN_CUT_CEILING: usize = 25;

/// The best split of one variable over one observation set.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResult {
    /// Variable the split is on.
    pub variable: VariableIndex,
    /// Cut point for numeric variables: values `<=` go to child 0.
    pub split_value: Option<f64>,
    /// Parent entropy minus the weighted entropy of the children.
    pub info_gain: f64,
    /// Entropy of the partition sizes.
    pub split_info: f64,
    /// `info_gain / split_info`, `None` when `split_info` is zero.
    pub gain_ratio: Option<f64>,
    /// Child observation sets. One per level for discrete variables
    /// (child `i` holds level code `i + 1`, possibly empty), `[left, right]`
    /// for numeric variables.
    pub children: Vec<Vec<usize>>,
}

impl SplitResult {
    fn new(
        variable: VariableIndex,
        split_value: Option<f64>,
        info_gain: f64,
        split_info: f64,
        children: Vec<Vec<usize>>,
    ) -> Self {
        let gain_ratio = (split_info > 0.0).then(|| info_gain / split_info);
        Self {
            variable,
            split_value,
            info_gain,
            split_info,
            gain_ratio,
            children,
        }
    }
}

/// Information-theoretic split scoring for one dataset and label vector.
///
/// Entropies are computed from the dataset's `n·log2(n)` table and
/// normalized by the number of observations in the node.
#[derive(Debug, Clone, Copy)]
pub struct SplitEvaluator<'a> {
    dataset: &'a Dataset,
    labels: &'a Labels,
    min_node_size: usize,
}

impl<'a> SplitEvaluator<'a> {
    /// Create an evaluator. `min_node_size` is the smallest child a split may produce.
    #[must_use]
    pub fn new(dataset: &'a Dataset, labels: &'a Labels, min_node_size: usize) -> Self {
        Self {
            dataset,
            labels,
            min_node_size,
        }
    }

    /// `n·log2(n) - Σ c·log2(c)`, i.e. `n` times the entropy of `counts`.
    fn sum_nlogn(&self, counts: &[usize], n: usize) -> f64 {
        self.dataset.nlogn(n) - counts.iter().map(|&c| self.dataset.nlogn(c)).sum::<f64>()
    }

    /// Entropy (bits) of the label distribution over `obs`.
    #[must_use]
    pub fn entropy(&self, obs: &[usize]) -> f64 {
        if obs.is_empty() {
            return 0.0;
        }
        self.sum_nlogn(&self.labels.frequencies(obs), obs.len()) / obs.len() as f64
    }

    /// Find the best split of `obs` on `variable`, or `None` if none is usable.
    #[must_use]
    pub fn evaluate(&self, variable: VariableIndex, obs: &[usize]) -> Option<SplitResult> {
        self.evaluate_with_info(variable, obs, self.entropy(obs))
    }

    fn evaluate_with_info(
        &self,
        variable: VariableIndex,
        obs: &[usize],
        info: f64,
    ) -> Option<SplitResult> {
        if self.dataset.variable(variable).is_discrete() {
            self.evaluate_discrete(variable, obs, info)
        } else {
            self.evaluate_continuous(variable, obs, info)
        }
    }

    fn evaluate_discrete(
        &self,
        variable: VariableIndex,
        obs: &[usize],
        info: f64,
    ) -> Option<SplitResult> {
        let buckets = self.dataset.split_discrete(variable, obs);
        let usable = buckets
            .iter()
            .filter(|b| b.len() >= self.min_node_size)
            .count();
        if usable < 2 {
            return None;
        }

        let n = obs.len();
        let mut subinfo = 0.0;
        let mut size_nlogn = 0.0;
        for bucket in buckets.iter().filter(|b| !b.is_empty()) {
            size_nlogn += self.dataset.nlogn(bucket.len());
            subinfo += self.sum_nlogn(&self.labels.frequencies(bucket), bucket.len());
        }

        let info_gain = info - subinfo / n as f64;
        if info_gain <= 0.0 {
            return None;
        }
        let split_info = (self.dataset.nlogn(n) - size_nlogn) / n as f64;

        Some(SplitResult::new(variable, None, info_gain, split_info, buckets))
    }

    /// Smallest side a numeric cut may leave: `0.1 · n / L` clamped to
    /// `[2, 25]`, never below the configured minimum node size.
    fn min_cut_size(&self, n: usize) -> usize {
        let adaptive = (0.1 * n as f64 / self.labels.n_labels() as f64).floor() as usize;
        adaptive
            .clamp(MIN_CUT_FLOOR, MIN_CUT_CEILING)
            .max(self.min_node_size)
    }

    fn evaluate_continuous(
        &self,
        variable: VariableIndex,
        obs: &[usize],
        info: f64,
    ) -> Option<SplitResult> {
        let n = obs.len();
        let m = self.min_cut_size(n);
        if n < 2 * m {
            return None;
        }

        let value = |i: usize| self.dataset.value(variable, i);
        let mut sorted = obs.to_vec();
        sorted.sort_by(|&a, &b| value(a).total_cmp(&value(b)));

        let mut left = vec![0usize; self.labels.n_labels()];
        let mut right = self.labels.frequencies(obs);
        let mut current_label = 0;
        for &i in &sorted[..m] {
            current_label = self.labels.class_of(i);
            left[current_label] += 1;
            right[current_label] -= 1;
        }
        let mut current_value = value(sorted[m - 1]);

        // (weighted child entropy, cut value, last position on the left)
        let mut best: Option<(f64, f64, usize)> = None;
        for (i, &next) in sorted.iter().enumerate().take(n - m).skip(m) {
            let next_label = self.labels.class_of(next);
            let next_value = value(next);
            if current_label != next_label && current_value != next_value {
                let subinfo =
                    (self.sum_nlogn(&left, i) + self.sum_nlogn(&right, n - i)) / n as f64;
                if best.is_none_or(|(s, _, _)| subinfo < s) {
                    best = Some((subinfo, current_value, i - 1));
                }
            }
            left[next_label] += 1;
            right[next_label] -= 1;
            current_label = next_label;
            current_value = next_value;
        }

        let (subinfo, split_value, pos) = best?;
        let info_gain = info - subinfo;
        if info_gain <= 0.0 {
            return None;
        }
        let n_left = pos + 1;
        let split_info = (self.dataset.nlogn(n)
            - self.dataset.nlogn(n_left)
            - self.dataset.nlogn(n - n_left))
            / n as f64;

        let right_obs = sorted.split_off(n_left);
        Some(SplitResult::new(
            variable,
            Some(split_value),
            info_gain,
            split_info,
            vec![sorted, right_obs],
        ))
    }

    /// Evaluate each variable, stopping early on cancellation.
    ///
    /// Returns `None` when a yielding checkpoint fired.
    fn evaluate_all(
        &self,
        variables: &[VariableIndex],
        obs: &[usize],
        interrupt: &Interrupt<'_>,
    ) -> Result<Option<BTreeMap<VariableIndex, SplitResult>>, ForestError> {
        let info = self.entropy(obs);
        let mut results = BTreeMap::new();
        for &variable in variables {
            if interrupt.should_stop()? {
                return Ok(None);
            }
            if let Some(split) = self.evaluate_with_info(variable, obs, info) {
                results.insert(variable, split);
            }
        }
        Ok(Some(results))
    }

    /// Uniform subspace selection.
    ///
    /// Draws `mtry` candidates uniformly from `variables` with `seed`, then
    /// among those whose gain reaches the mean gain (less a small epsilon)
    /// and whose split info is positive, returns the one with the largest
    /// gain ratio. Falls back to the lowest-indexed usable candidate.
    pub(crate) fn select_uniform(
        &self,
        obs: &[usize],
        variables: &[VariableIndex],
        mtry: usize,
        seed: u64,
        interrupt: &Interrupt<'_>,
    ) -> Result<Option<SplitResult>, ForestError> {
        let subspace = random_sample(variables, mtry, seed);
        let Some(mut results) = self.evaluate_all(&subspace, obs, interrupt)? else {
            return Ok(None);
        };
        let Some(threshold) = mean_gain_threshold(&results) else {
            return Ok(None);
        };

        let mut best: Option<(VariableIndex, f64)> = None;
        for (&variable, split) in &results {
            if split.info_gain < threshold {
                continue;
            }
            if let Some(ratio) = split.gain_ratio
                && best.is_none_or(|(_, r)| ratio > r)
            {
                best = Some((variable, ratio));
            }
        }

        let chosen = best.map_or_else(|| first_key(&results), |(v, _)| Some(v));
        Ok(chosen.and_then(|v| results.remove(&v)))
    }

    /// Information-gain-ratio weighted subspace selection.
    ///
    /// Evaluates every variable in `variables`, keeps those whose gain reaches
    /// the mean gain (less a small epsilon) with positive split info, then
    /// draws `mtry` of them with probability proportional to the square root
    /// of their gain ratio and returns the drawn one with the largest gain
    /// ratio. Falls back to the lowest-indexed usable variable.
    pub(crate) fn select_weighted(
        &self,
        obs: &[usize],
        variables: &[VariableIndex],
        mtry: usize,
        seed: u64,
        sampler: &mut WeightedSampler,
        interrupt: &Interrupt<'_>,
    ) -> Result<Option<SplitResult>, ForestError> {
        let Some(mut results) = self.evaluate_all(variables, obs, interrupt)? else {
            return Ok(None);
        };
        let Some(threshold) = mean_gain_threshold(&results) else {
            return Ok(None);
        };

        let mut candidates = Vec::new();
        let mut ratios = Vec::new();
        for (&variable, split) in &results {
            if split.info_gain < threshold {
                continue;
            }
            if let Some(ratio) = split.gain_ratio {
                candidates.push(variable);
                ratios.push(ratio);
            }
        }

        if candidates.is_empty() {
            return Ok(first_key(&results).and_then(|v| results.remove(&v)));
        }

        let drawn = sampler.sample_interruptible(
            &ratios,
            mtry,
            seed,
            WeightTransform::Sqrt,
            interrupt,
        )?;
        let mut best: Option<usize> = None;
        for &d in &drawn {
            if best.is_none_or(|b| ratios[d] >= ratios[b]) {
                best = Some(d);
            }
        }

        // An empty draw means a yielding checkpoint fired mid-sample.
        Ok(best.and_then(|b| results.remove(&candidates[b])))
    }
}

fn mean_gain_threshold(results: &BTreeMap<VariableIndex, SplitResult>) -> Option<f64> {
    if results.is_empty() {
        return None;
    }
    let total: f64 = results.values().map(|s| s.info_gain).sum();
    Some(total / results.len() as f64 - MEAN_GAIN_EPSILON)
}

fn first_key(results: &BTreeMap<VariableIndex, SplitResult>) -> Option<VariableIndex> {
    results.keys().next().copied()
}
