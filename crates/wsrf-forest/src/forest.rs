//! Forest training: per-tree seeding, sequential or pooled tree construction,
//! and aggregation of the ensemble statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument, warn};

use crate::cancel::{CancelPolicy, CancellationToken, Interrupt};
use crate::config::ForestConfig;
use crate::dataset::{Dataset, Labels, Schema};
use crate::error::ForestError;
use crate::importance::VariableImportance;
use crate::oob::OobSummary;
use crate::tree::{DecisionTree, TreeParams};

type TreeCallback<'a> = Box<dyn Fn(usize) + Send + Sync + 'a>;

/// External control over a training run.
///
/// Holds the cancellation token observed by every tree builder and an
/// optional callback invoked with the tree index each time a tree completes.
/// In pooled builds a worker that fails cancels the token so the others stop.
#[derive(Default)]
pub struct TrainingControl<'a> {
    token: CancellationToken,
    on_tree_built: Option<TreeCallback<'a>>,
}

impl<'a> TrainingControl<'a> {
    /// Create a control with a fresh token and no callback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `token` for cancellation.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Call `callback` with the tree index after each tree is built.
    #[must_use]
    pub fn with_tree_callback(mut self, callback: impl Fn(usize) + Send + Sync + 'a) -> Self {
        self.on_tree_built = Some(Box::new(callback));
        self
    }

    /// Return the cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn tree_built(&self, index: usize) {
        debug!(tree = index, "tree complete");
        if let Some(callback) = &self.on_tree_built {
            callback(index);
        }
    }
}

impl std::fmt::Debug for TrainingControl<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingControl")
            .field("token", &self.token)
            .field("on_tree_built", &self.on_tree_built.is_some())
            .finish()
    }
}

/// A fitted weighted-subspace random forest.
///
/// Read-only after training. Carries the training schema so prediction data
/// can be conformed to the training encoding.
#[derive(Debug, Clone)]
pub struct Forest {
    pub(crate) schema: Schema,
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) mtry: usize,
    pub(crate) min_node_size: usize,
    pub(crate) weighting: bool,
    pub(crate) oob: OobSummary,
    pub(crate) importance: VariableImportance,
}

impl Forest {
    /// Return the trees in build order.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the training schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Return the class names; internal class `i` is `label_names()[i]`.
    #[must_use]
    pub fn label_names(&self) -> &[String] {
        self.schema.label_names()
    }

    /// Return the resolved subspace size.
    #[must_use]
    pub fn mtry(&self) -> usize {
        self.mtry
    }

    /// Return the minimum node size used for training.
    #[must_use]
    pub fn min_node_size(&self) -> usize {
        self.min_node_size
    }

    /// Return whether weighted subspace selection was used.
    #[must_use]
    pub fn weighting(&self) -> bool {
        self.weighting
    }

    /// Return the out-of-bag statistics.
    #[must_use]
    pub fn oob(&self) -> &OobSummary {
        &self.oob
    }

    /// Return the variable importance measures.
    #[must_use]
    pub fn importance(&self) -> &VariableImportance {
        &self.importance
    }
}

/// Train the forest. Entry point behind [`ForestConfig::fit_with_control`].
#[instrument(skip_all, fields(n_trees = config.n_trees, n_observations = dataset.n_observations()))]
pub(crate) fn train(
    config: &ForestConfig,
    dataset: &Dataset,
    labels: &Labels,
    control: &TrainingControl<'_>,
) -> Result<Forest, ForestError> {
    // --- Validate inputs ---
    if labels.len() != dataset.n_observations() {
        return Err(ForestError::LabelCountMismatch {
            n_observations: dataset.n_observations(),
            n_labels: labels.len(),
        });
    }
    let mtry = config.resolve_mtry(dataset.n_variables())?;
    if config.min_node_size == 0 {
        return Err(ForestError::InvalidMinNodeSize {
            min_node_size: config.min_node_size,
        });
    }

    let seeds = match &config.tree_seeds {
        Some(seeds) if seeds.len() != config.n_trees => {
            return Err(ForestError::SeedCountMismatch {
                expected: config.n_trees,
                got: seeds.len(),
            });
        }
        Some(seeds) => seeds.clone(),
        None => {
            let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
            (0..config.n_trees).map(|_| master_rng.r#gen()).collect()
        }
    };

    let params = TreeParams {
        mtry,
        min_node_size: config.min_node_size,
        weighting: config.weighting,
        importance: config.importance,
    };
    let n_threads = config.parallelism.n_threads();

    info!(
        n_trees = config.n_trees,
        n_observations = dataset.n_observations(),
        n_variables = dataset.n_variables(),
        n_labels = labels.n_labels(),
        mtry,
        weighting = config.weighting,
        importance = config.importance,
        threads = n_threads.unwrap_or(1),
        "training forest"
    );

    let trees = match n_threads {
        None => build_sequential(dataset, labels, params, &seeds, control)?,
        Some(n) => build_pooled(n, dataset, labels, params, &seeds, control)?,
    };

    // --- Aggregate ---
    let oob = OobSummary::compute(&trees, labels);
    let importance = VariableImportance::aggregate(&trees, dataset.variables(), labels.names());

    info!(
        oob_error_rate = ?oob.error_rate(),
        strength = ?oob.strength(),
        correlation = ?oob.correlation(),
        "forest training complete"
    );

    Ok(Forest {
        schema: Schema::new(dataset.variables().to_vec(), labels.names().to_vec()),
        trees,
        mtry,
        min_node_size: config.min_node_size,
        weighting: config.weighting,
        oob,
        importance,
    })
}

fn build_sequential(
    dataset: &Dataset,
    labels: &Labels,
    params: TreeParams,
    seeds: &[u64],
    control: &TrainingControl<'_>,
) -> Result<Vec<DecisionTree>, ForestError> {
    let interrupt = Interrupt::new(control.token(), CancelPolicy::Raise);
    let mut trees = Vec::with_capacity(seeds.len());
    for (index, &seed) in seeds.iter().enumerate() {
        trees.push(DecisionTree::build(dataset, labels, params, seed, interrupt)?);
        control.tree_built(index);
    }
    Ok(trees)
}

/// Build on a dedicated pool whose workers claim tree indices from a shared counter.
///
/// Returns only after every worker has exited; a failure or cancellation
/// discards all finished trees.
fn build_pooled(
    n_threads: usize,
    dataset: &Dataset,
    labels: &Labels,
    params: TreeParams,
    seeds: &[u64],
    control: &TrainingControl<'_>,
) -> Result<Vec<DecisionTree>, ForestError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .thread_name(|i| format!("wsrf-tree-{i}"))
        .build()
        .map_err(|source| ForestError::ThreadPool { source })?;

    let token = control.token();
    let interrupt = Interrupt::new(token, CancelPolicy::Yield);
    let next_tree = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<DecisionTree>>> = Mutex::new(vec![None; seeds.len()]);
    let failure: Mutex<Option<ForestError>> = Mutex::new(None);

    pool.broadcast(|_| {
        while !token.is_cancelled() {
            let index = next_tree.fetch_add(1, Ordering::SeqCst);
            if index >= seeds.len() {
                break;
            }

            match DecisionTree::build(dataset, labels, params, seeds[index], interrupt) {
                Ok(tree) => {
                    slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(tree);
                    control.tree_built(index);
                }
                Err(ForestError::Cancelled) => break,
                Err(e) => {
                    warn!(tree = index, error = %e, "tree build failed, stopping workers");
                    token.cancel();
                    failure
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .get_or_insert(e);
                    break;
                }
            }
        }
    });

    if let Some(e) = failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(e);
    }
    if token.is_cancelled() {
        return Err(ForestError::Cancelled);
    }

    slots
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or(ForestError::Cancelled)
}
