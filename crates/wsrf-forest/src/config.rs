//! Configuration builder for forest training.

use crate::dataset::{Dataset, Labels};
use crate::error::ForestError;
use crate::forest::{Forest, TrainingControl};

/// Floor on the automatically sized worker pool.
const MIN_AUTO_THREADS: usize = 10;

/// Threads left to the rest of the machine by the automatically sized pool.
const RESERVED_CORES: usize = 2;

/// How trees are distributed over threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// Build one tree at a time on the calling thread.
    Sequential,
    /// Size the worker pool from the available cores.
    Auto,
    /// Use exactly this many workers.
    Threads(usize),
}

impl Parallelism {
    /// Interpret an integer parallel degree: `0` or `1` is sequential,
    /// negative is automatic, anything larger is an exact worker count.
    #[must_use]
    pub fn from_degree(degree: i64) -> Self {
        match degree {
            d if d < 0 => Self::Auto,
            0 | 1 => Self::Sequential,
            d => Self::Threads(d as usize),
        }
    }

    /// Return the worker count, or `None` for sequential builds.
    #[must_use]
    pub fn n_threads(self) -> Option<usize> {
        match self {
            Self::Sequential | Self::Threads(0 | 1) => None,
            Self::Threads(n) => Some(n),
            Self::Auto => {
                let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
                Some(cores.saturating_sub(RESERVED_CORES).max(MIN_AUTO_THREADS))
            }
        }
    }
}

/// Configuration for weighted-subspace forest training.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter       | Default                        |
/// |-----------------|--------------------------------|
/// | `mtry`          | `floor(log2(M)) + 1`           |
/// | `min_node_size` | 2                              |
/// | `weighting`     | `true`                         |
/// | `importance`    | `false`                        |
/// | `parallelism`   | `Sequential`                   |
/// | `seed`          | 42                             |
/// | `tree_seeds`    | derived from `seed`            |
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) mtry: Option<usize>,
    pub(crate) min_node_size: usize,
    pub(crate) weighting: bool,
    pub(crate) importance: bool,
    pub(crate) parallelism: Parallelism,
    pub(crate) seed: u64,
    pub(crate) tree_seeds: Option<Vec<u64>>,
}

impl ForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, ForestError> {
        if n_trees == 0 {
            return Err(ForestError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            n_trees,
            mtry: None,
            min_node_size: 2,
            weighting: true,
            importance: false,
            parallelism: Parallelism::Sequential,
            seed: 42,
            tree_seeds: None,
        })
    }

    // --- Setters ---

    /// Set the subspace size. `None` uses `floor(log2(M)) + 1`.
    #[must_use]
    pub fn with_mtry(mut self, mtry: Option<usize>) -> Self {
        self.mtry = mtry;
        self
    }

    /// Set the smallest child a split may produce.
    #[must_use]
    pub fn with_min_node_size(mut self, min_node_size: usize) -> Self {
        self.min_node_size = min_node_size;
        self
    }

    /// Toggle gain-ratio weighted subspace selection.
    #[must_use]
    pub fn with_weighting(mut self, weighting: bool) -> Self {
        self.weighting = weighting;
        self
    }

    /// Toggle per-tree permutation importance.
    #[must_use]
    pub fn with_importance(mut self, importance: bool) -> Self {
        self.importance = importance;
        self
    }

    /// Set how trees are spread over threads.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Set the master seed the per-tree seeds are drawn from.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Supply one seed per tree explicitly, overriding the master seed.
    #[must_use]
    pub fn with_tree_seeds(mut self, tree_seeds: Vec<u64>) -> Self {
        self.tree_seeds = Some(tree_seeds);
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the configured subspace size, if set.
    #[must_use]
    pub fn mtry(&self) -> Option<usize> {
        self.mtry
    }

    /// Return the minimum node size.
    #[must_use]
    pub fn min_node_size(&self) -> usize {
        self.min_node_size
    }

    /// Return whether weighted subspace selection is on.
    #[must_use]
    pub fn weighting(&self) -> bool {
        self.weighting
    }

    /// Return whether permutation importance is assessed.
    #[must_use]
    pub fn importance(&self) -> bool {
        self.importance
    }

    /// Return the parallelism setting.
    #[must_use]
    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    /// Return the master seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the explicit per-tree seeds, if any.
    #[must_use]
    pub fn tree_seeds(&self) -> Option<&[u64]> {
        self.tree_seeds.as_deref()
    }

    /// Resolve the subspace size for `n_variables` candidate variables.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidMtry`] when an explicit `mtry` is zero
    /// or exceeds `n_variables`.
    pub fn resolve_mtry(&self, n_variables: usize) -> Result<usize, ForestError> {
        match self.mtry {
            None => Ok(default_mtry(n_variables)),
            Some(mtry) if mtry == 0 || mtry > n_variables => {
                Err(ForestError::InvalidMtry { mtry, n_variables })
            }
            Some(mtry) => Ok(mtry),
        }
    }

    /// Train a forest.
    ///
    /// # Errors
    ///
    /// | Variant                               | When                                         |
    /// |---------------------------------------|----------------------------------------------|
    /// | [`ForestError::LabelCountMismatch`]   | `labels` and `dataset` disagree on N         |
    /// | [`ForestError::InvalidMtry`]          | `mtry` is zero or larger than M              |
    /// | [`ForestError::InvalidMinNodeSize`]   | `min_node_size` is zero                      |
    /// | [`ForestError::SeedCountMismatch`]    | explicit seeds do not match `n_trees`        |
    /// | [`ForestError::ThreadPool`]           | the worker pool could not be created         |
    /// | [`ForestError::EmptyNode`]            | a node was grown from no observations        |
    pub fn fit(&self, dataset: &Dataset, labels: &Labels) -> Result<Forest, ForestError> {
        self.fit_with_control(dataset, labels, &TrainingControl::new())
    }

    /// Train a forest under external control (cancellation, progress).
    ///
    /// # Errors
    ///
    /// As [`fit`](Self::fit), plus [`ForestError::Cancelled`] once the
    /// control's token is cancelled.
    pub fn fit_with_control(
        &self,
        dataset: &Dataset,
        labels: &Labels,
        control: &TrainingControl<'_>,
    ) -> Result<Forest, ForestError> {
        crate::forest::train(self, dataset, labels, control)
    }
}

/// `floor(log2(M)) + 1`.
pub(crate) fn default_mtry(n_variables: usize) -> usize {
    n_variables.max(1).ilog2() as usize + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_trees_rejected() {
        assert!(matches!(
            ForestConfig::new(0),
            Err(ForestError::InvalidTreeCount { n_trees: 0 })
        ));
    }

    #[test]
    fn defaults() {
        let config = ForestConfig::new(10).unwrap();
        assert_eq!(config.n_trees(), 10);
        assert_eq!(config.min_node_size(), 2);
        assert!(config.weighting());
        assert!(!config.importance());
        assert_eq!(config.parallelism(), Parallelism::Sequential);
        assert_eq!(config.seed(), 42);
        assert!(config.tree_seeds().is_none());
    }

    #[test]
    fn default_mtry_is_log2_plus_one() {
        assert_eq!(default_mtry(1), 1);
        assert_eq!(default_mtry(2), 2);
        assert_eq!(default_mtry(3), 2);
        assert_eq!(default_mtry(8), 4);
        assert_eq!(default_mtry(100), 7);
    }

    #[test]
    fn explicit_mtry_validated() {
        let config = ForestConfig::new(1).unwrap().with_mtry(Some(5));
        assert!(matches!(
            config.resolve_mtry(4),
            Err(ForestError::InvalidMtry { mtry: 5, n_variables: 4 })
        ));
        assert_eq!(config.resolve_mtry(5).unwrap(), 5);
        let zero = ForestConfig::new(1).unwrap().with_mtry(Some(0));
        assert!(zero.resolve_mtry(3).is_err());
    }

    #[test]
    fn parallel_degree_mapping() {
        assert_eq!(Parallelism::from_degree(0), Parallelism::Sequential);
        assert_eq!(Parallelism::from_degree(1), Parallelism::Sequential);
        assert_eq!(Parallelism::from_degree(-1), Parallelism::Auto);
        assert_eq!(Parallelism::from_degree(4), Parallelism::Threads(4));
        assert_eq!(Parallelism::Sequential.n_threads(), None);
        assert_eq!(Parallelism::Threads(4).n_threads(), Some(4));
        assert!(Parallelism::Auto.n_threads().unwrap() >= MIN_AUTO_THREADS);
    }
}
