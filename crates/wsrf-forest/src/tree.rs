use std::collections::{BTreeSet, VecDeque};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::cancel::Interrupt;
use crate::dataset::{Dataset, Labels};
use crate::error::ForestError;
use crate::node::{self, Node, NodeIndex, NodeRecord, VariableIndex, majority};
use crate::perm_importance::assess_permutation_importance;
use crate::sampling::WeightedSampler;
use crate::split::{SplitEvaluator, SplitResult};

/// Per-tree growth parameters, resolved by the forest configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub(crate) mtry: usize,
    pub(crate) min_node_size: usize,
    pub(crate) weighting: bool,
    pub(crate) importance: bool,
}

/// A column substituted for one variable while classifying.
///
/// `values` is indexed by observation, like a dataset column.
#[derive(Debug, Clone)]
pub(crate) struct ColumnOverride {
    pub(crate) variable: VariableIndex,
    pub(crate) values: Vec<f64>,
}

/// A fitted C4.5 decision tree together with its out-of-bag measures.
///
/// Nodes live in an arena with the root at index 0. Immutable once built.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) seed: u64,
    pub(crate) bag: Vec<usize>,
    pub(crate) oob: Vec<usize>,
    pub(crate) oob_predictions: Vec<usize>,
    pub(crate) oob_error_rate: Option<f64>,
    pub(crate) label_oob_error_rates: Vec<Option<f64>>,
    pub(crate) igr_importance: Vec<f64>,
    pub(crate) permutation_importance: Option<Vec<Vec<f64>>>,
}

/// Grow-time state shared across the recursion.
struct Grower<'a> {
    labels: &'a Labels,
    params: TreeParams,
    interrupt: Interrupt<'a>,
    evaluator: SplitEvaluator<'a>,
    sampler: WeightedSampler,
    node_seed: u64,
    nodes: Vec<Node>,
    igr_importance: Vec<f64>,
}

impl DecisionTree {
    /// Build one tree: bag, grow, then evaluate on the out-of-bag set.
    ///
    /// Yielding checkpoints collapse the in-flight recursion into leaves;
    /// the tree then reports [`ForestError::Cancelled`] before any OOB work.
    #[instrument(skip_all, fields(seed))]
    pub(crate) fn build(
        dataset: &Dataset,
        labels: &Labels,
        params: TreeParams,
        seed: u64,
        interrupt: Interrupt<'_>,
    ) -> Result<Self, ForestError> {
        if interrupt.should_stop()? {
            return Err(ForestError::Cancelled);
        }

        // --- Bagging ---
        let (bag, oob) = bootstrap(dataset.n_observations(), seed);

        // --- Growing ---
        let mut grower = Grower {
            labels,
            params,
            interrupt,
            evaluator: SplitEvaluator::new(dataset, labels, params.min_node_size),
            sampler: WeightedSampler::new(),
            node_seed: seed,
            nodes: Vec::new(),
            igr_importance: vec![0.0; dataset.n_variables()],
        };
        let variables: Vec<VariableIndex> =
            (0..dataset.n_variables()).map(VariableIndex::new).collect();
        grower.grow(bag.clone(), &variables)?;
        interrupt.ensure_running()?;

        let mut tree = Self {
            nodes: grower.nodes,
            seed,
            bag,
            oob,
            oob_predictions: Vec::new(),
            oob_error_rate: None,
            label_oob_error_rates: vec![None; labels.n_labels()],
            igr_importance: grower.igr_importance,
            permutation_importance: None,
        };

        // --- OOB evaluation ---
        tree.evaluate_oob(dataset, labels);

        // --- Importance ---
        if params.importance {
            tree.permutation_importance = Some(assess_permutation_importance(&tree, dataset, labels));
        }

        debug!(
            n_nodes = tree.nodes.len(),
            n_oob = tree.oob.len(),
            oob_error_rate = ?tree.oob_error_rate,
            "tree built"
        );
        Ok(tree)
    }

    fn evaluate_oob(&mut self, dataset: &Dataset, labels: &Labels) {
        let n_labels = labels.n_labels();
        let mut label_counts = vec![0usize; n_labels];
        let mut label_errors = vec![0usize; n_labels];
        let mut errors = 0usize;

        let predictions: Vec<usize> = self
            .oob
            .iter()
            .map(|&obs| self.classify(dataset, obs, None))
            .collect();
        for (&obs, &predicted) in self.oob.iter().zip(&predictions) {
            let actual = labels.class_of(obs);
            label_counts[actual] += 1;
            if predicted != actual {
                errors += 1;
                label_errors[actual] += 1;
            }
        }

        self.oob_error_rate = rate(errors, self.oob.len());
        self.label_oob_error_rates = label_errors
            .iter()
            .zip(&label_counts)
            .map(|(&e, &c)| rate(e, c))
            .collect();
        self.oob_predictions = predictions;
    }

    /// Walk from the root to the leaf that `obs` falls into.
    pub(crate) fn leaf(
        &self,
        dataset: &Dataset,
        obs: usize,
        column_override: Option<&ColumnOverride>,
    ) -> &Node {
        let value = |variable: VariableIndex| match column_override {
            Some(o) if o.variable == variable => o.values[obs],
            _ => dataset.value(variable, obs),
        };

        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                leaf @ Node::Leaf { .. } => return leaf,
                Node::Internal {
                    variable,
                    split_value,
                    children,
                    ..
                } => {
                    let v = value(*variable);
                    let child = match split_value {
                        Some(cut) => usize::from(v > *cut),
                        // Discrete columns hold conformed 1-based level codes.
                        None => v as usize - 1,
                    };
                    idx = children[child].index();
                }
            }
        }
    }

    /// Zero-based class predicted for `obs`, optionally with one column replaced.
    pub(crate) fn classify(
        &self,
        dataset: &Dataset,
        obs: usize,
        column_override: Option<&ColumnOverride>,
    ) -> usize {
        match self.leaf(dataset, obs, column_override) {
            Node::Leaf { label, .. } => *label,
            Node::Internal { .. } => unreachable!("leaf() always ends at a leaf"),
        }
    }

    /// Predict the zero-based class of observation `obs` of `dataset`.
    ///
    /// `dataset` must use the training encoding (see [`Dataset::conform_to`]).
    /// [`Forest::predict`](crate::Forest::predict) conforms its input first.
    ///
    /// # Panics
    ///
    /// Panics if `obs` is out of range, if `dataset` lacks a variable the tree
    /// splits on, or if a discrete code has no matching branch. Data that has
    /// not been passed through [`Dataset::conform_to`] can trigger any of these.
    #[must_use]
    pub fn predict(&self, dataset: &Dataset, obs: usize) -> usize {
        self.classify(dataset, obs, None)
    }

    /// Return the class distribution of the leaf `obs` falls into.
    ///
    /// # Panics
    ///
    /// Under the same conditions as [`DecisionTree::predict`].
    #[must_use]
    pub fn predict_distribution(&self, dataset: &Dataset, obs: usize) -> Vec<f64> {
        self.leaf(dataset, obs, None).distribution().unwrap_or_default()
    }

    /// Flatten the tree into breadth-first node records.
    #[must_use]
    pub fn flatten(&self) -> Vec<NodeRecord> {
        node::flatten(&self.nodes)
    }

    /// Rebuild a tree's structure from breadth-first node records.
    ///
    /// The result predicts identically to the flattened tree but carries no
    /// out-of-bag data.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidNodeList`] when the records do not form a tree.
    pub fn from_records(records: &[NodeRecord], seed: u64) -> Result<Self, ForestError> {
        Ok(Self {
            nodes: node::rebuild(records)?,
            seed,
            bag: Vec::new(),
            oob: Vec::new(),
            oob_predictions: Vec::new(),
            oob_error_rate: None,
            label_oob_error_rates: Vec::new(),
            igr_importance: Vec::new(),
            permutation_importance: None,
        })
    }

    /// Return the node arena (root at index 0).
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the root node.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Return the seed the tree was grown from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the bootstrap sample (with repeats, in draw order).
    #[must_use]
    pub fn bag(&self) -> &[usize] {
        &self.bag
    }

    /// Return the out-of-bag observations in ascending order.
    #[must_use]
    pub fn oob(&self) -> &[usize] {
        &self.oob
    }

    /// Return the zero-based class predicted for each out-of-bag observation.
    #[must_use]
    pub fn oob_predictions(&self) -> &[usize] {
        &self.oob_predictions
    }

    /// Return the out-of-bag error rate, `None` when no observation was out of bag.
    #[must_use]
    pub fn oob_error_rate(&self) -> Option<f64> {
        self.oob_error_rate
    }

    /// Return per-class out-of-bag error rates, `None` for classes with no OOB observation.
    #[must_use]
    pub fn label_oob_error_rates(&self) -> &[Option<f64>] {
        &self.label_oob_error_rates
    }

    /// Return the summed gain ratio of every split, per variable.
    #[must_use]
    pub fn igr_importance(&self) -> &[f64] {
        &self.igr_importance
    }

    /// Return the `(L+1) × M` permutation importance rows, if assessed.
    ///
    /// Rows `0..L` hold per-class error increases; row `L` the overall increase.
    #[must_use]
    pub fn permutation_importance(&self) -> Option<&[Vec<f64>]> {
        self.permutation_importance.as_deref()
    }

    /// Return the variables used by at least one internal node, ascending.
    #[must_use]
    pub fn used_variables(&self) -> BTreeSet<VariableIndex> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Internal { variable, .. } => Some(*variable),
                Node::Leaf { .. } => None,
            })
            .collect()
    }

    /// Return the total number of nodes.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of internal (split) nodes.
    #[must_use]
    pub fn n_internal(&self) -> usize {
        self.nodes.len() - self.n_leaves()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth; a single-leaf tree has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut max_depth = 0usize;
        let mut queue = VecDeque::new();
        queue.push_back((0usize, 0usize));
        while let Some((idx, d)) = queue.pop_front() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Internal { children, .. } => {
                    queue.extend(children.iter().map(|c| (c.index(), d + 1)));
                }
            }
        }
        max_depth
    }
}

impl Grower<'_> {
    fn push_leaf(&mut self, counts: Vec<usize>, n_obs: usize) -> NodeIndex {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            label: majority(&counts),
            counts,
            n_obs,
        });
        NodeIndex::new(idx)
    }

    fn grow(&mut self, obs: Vec<usize>, variables: &[VariableIndex]) -> Result<NodeIndex, ForestError> {
        if obs.is_empty() {
            return Err(ForestError::EmptyNode);
        }
        let n_obs = obs.len();
        let counts = self.labels.frequencies(&obs);

        if self.interrupt.should_stop()?
            || self.labels.all_same(&obs)
            || variables.is_empty()
        {
            return Ok(self.push_leaf(counts, n_obs));
        }

        let selection = if self.params.weighting {
            self.evaluator.select_weighted(
                &obs,
                variables,
                self.params.mtry,
                self.node_seed,
                &mut self.sampler,
                &self.interrupt,
            )?
        } else {
            self.evaluator.select_uniform(
                &obs,
                variables,
                self.params.mtry,
                self.node_seed,
                &self.interrupt,
            )?
        };
        self.node_seed = self.node_seed.wrapping_add(1);

        let Some(split) = selection else {
            return Ok(self.push_leaf(counts, n_obs));
        };
        let SplitResult {
            variable,
            split_value,
            info_gain,
            split_info,
            gain_ratio,
            children: child_obs,
        } = split;

        if let Some(ratio) = gain_ratio {
            self.igr_importance[variable.index()] += ratio;
        }

        // Reserve the parent slot, grow the children, then fill it in.
        let node_idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            label: 0,
            counts: Vec::new(),
            n_obs,
        });

        // Categorical variables are used up below this node; numeric ones stay eligible.
        let remaining: Vec<VariableIndex>;
        let child_variables = if split_value.is_none() {
            remaining = variables.iter().copied().filter(|&v| v != variable).collect();
            remaining.as_slice()
        } else {
            variables
        };

        let mut children = Vec::with_capacity(child_obs.len());
        for child in child_obs {
            let idx = if child.is_empty() {
                self.push_leaf(counts.clone(), 0)
            } else {
                self.grow(child, child_variables)?
            };
            children.push(idx);
        }

        self.nodes[node_idx] = Node::Internal {
            variable,
            info_gain,
            split_info,
            gain_ratio,
            split_value,
            children,
            n_obs,
        };
        Ok(NodeIndex::new(node_idx))
    }
}

/// Draw `n` observations with replacement; the never-drawn ones form the OOB set.
fn bootstrap(n: usize, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut in_bag = vec![false; n];
    let mut bag = Vec::with_capacity(n);
    for _ in 0..n {
        let idx = rng.gen_range(0..n);
        bag.push(idx);
        in_bag[idx] = true;
    }
    let oob = (0..n).filter(|&i| !in_bag[i]).collect();
    (bag, oob)
}

pub(crate) fn rate(errors: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| errors as f64 / total as f64)
}
