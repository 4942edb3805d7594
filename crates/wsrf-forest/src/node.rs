use std::collections::VecDeque;
use std::fmt;

use crate::error::ForestError;

/// Zero-based feature variable index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct VariableIndex(usize);

impl VariableIndex {
    /// Create a variable index from a zero-based column position.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based column position.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VariableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into a `Vec<Node>` arena, identifying a specific node in a decision tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in a decision tree arena.
///
/// Children are referenced by [`NodeIndex`]; the root is always index 0.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node.
    Internal {
        /// Variable the node splits on.
        variable: VariableIndex,
        /// Entropy reduction achieved by the split.
        info_gain: f64,
        /// Entropy of the partition sizes.
        split_info: f64,
        /// `info_gain / split_info`, undefined when `split_info` is zero.
        gain_ratio: Option<f64>,
        /// Cut point for numeric variables: values `<=` go to child 0.
        split_value: Option<f64>,
        /// One child per level (discrete) or `[left, right]` (numeric).
        children: Vec<NodeIndex>,
        /// Number of training observations that reached this node.
        n_obs: usize,
    },
    /// A terminal leaf node.
    Leaf {
        /// Predicted zero-based class.
        label: usize,
        /// Per-class observation counts.
        counts: Vec<usize>,
        /// Number of training observations that reached this leaf.
        /// Zero for leaves standing in for an empty categorical branch,
        /// which carry their parent's counts instead.
        n_obs: usize,
    },
}

impl Node {
    /// Return the number of training observations that reached this node.
    #[must_use]
    pub fn n_obs(&self) -> usize {
        match self {
            Node::Internal { n_obs, .. } | Node::Leaf { n_obs, .. } => *n_obs,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Return the normalized class distribution of a leaf, or `None` for internal nodes.
    #[must_use]
    pub fn distribution(&self) -> Option<Vec<f64>> {
        match self {
            Node::Leaf { counts, .. } => {
                let total: usize = counts.iter().sum();
                if total == 0 {
                    return Some(vec![0.0; counts.len()]);
                }
                Some(counts.iter().map(|&c| c as f64 / total as f64).collect())
            }
            Node::Internal { .. } => None,
        }
    }
}

/// Return the first class with the largest count.
pub(crate) fn majority(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

/// One node of a breadth-first flattened tree.
///
/// Children are implicit: an internal node's `n_children` children are the
/// next unclaimed records in breadth-first order.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum NodeRecord {
    /// A flattened leaf.
    Leaf {
        /// Training observations that reached the leaf.
        n_obs: usize,
        /// Predicted zero-based class.
        label: usize,
        /// Per-class observation counts.
        counts: Vec<usize>,
    },
    /// A flattened internal node.
    Internal {
        /// Training observations that reached the node.
        n_obs: usize,
        /// Number of children that follow in breadth-first order.
        n_children: usize,
        /// Variable the node splits on.
        variable: VariableIndex,
        /// Entropy reduction achieved by the split.
        info_gain: f64,
        /// Entropy of the partition sizes.
        split_info: f64,
        /// `info_gain / split_info` when defined.
        gain_ratio: Option<f64>,
        /// Cut point for numeric variables.
        split_value: Option<f64>,
    },
}

/// Flatten an arena into breadth-first records starting from the root.
pub(crate) fn flatten(nodes: &[Node]) -> Vec<NodeRecord> {
    let mut records = Vec::with_capacity(nodes.len());
    if nodes.is_empty() {
        return records;
    }

    let mut queue = VecDeque::new();
    queue.push_back(NodeIndex::new(0));
    while let Some(idx) = queue.pop_front() {
        match &nodes[idx.index()] {
            Node::Leaf { label, counts, n_obs } => records.push(NodeRecord::Leaf {
                n_obs: *n_obs,
                label: *label,
                counts: counts.clone(),
            }),
            Node::Internal {
                variable,
                info_gain,
                split_info,
                gain_ratio,
                split_value,
                children,
                n_obs,
            } => {
                records.push(NodeRecord::Internal {
                    n_obs: *n_obs,
                    n_children: children.len(),
                    variable: *variable,
                    info_gain: *info_gain,
                    split_info: *split_info,
                    gain_ratio: *gain_ratio,
                    split_value: *split_value,
                });
                queue.extend(children.iter().copied());
            }
        }
    }
    records
}

/// Rebuild an arena from breadth-first records.
///
/// The rebuilt arena is in breadth-first order, so record `i` becomes node `i`.
///
/// # Errors
///
/// Returns [`ForestError::InvalidNodeList`] when the list is empty, when a
/// record is not claimed by an earlier internal node, when an internal node
/// claims children past the end, or when records are left over. Children are
/// claimed in order, so every non-root record belongs to exactly one parent
/// with a smaller index.
pub(crate) fn rebuild(records: &[NodeRecord]) -> Result<Vec<Node>, ForestError> {
    if records.is_empty() {
        return Err(ForestError::InvalidNodeList {
            reason: "node list is empty".to_string(),
        });
    }

    let mut nodes = Vec::with_capacity(records.len());
    let mut next_child = 1usize;

    for (i, record) in records.iter().enumerate() {
        if i > 0 && i >= next_child {
            return Err(ForestError::InvalidNodeList {
                reason: format!("record {i} is not a child of any earlier node"),
            });
        }
        let node = match record {
            NodeRecord::Leaf { n_obs, label, counts } => Node::Leaf {
                label: *label,
                counts: counts.clone(),
                n_obs: *n_obs,
            },
            NodeRecord::Internal {
                n_obs,
                n_children,
                variable,
                info_gain,
                split_info,
                gain_ratio,
                split_value,
            } => {
                if *n_children == 0 {
                    return Err(ForestError::InvalidNodeList {
                        reason: format!("internal node {i} has no children"),
                    });
                }
                let end = next_child + n_children;
                if end > records.len() {
                    return Err(ForestError::InvalidNodeList {
                        reason: format!(
                            "node {i} claims children up to {end}, but only {} records exist",
                            records.len()
                        ),
                    });
                }
                let children = (next_child..end).map(NodeIndex::new).collect();
                next_child = end;
                Node::Internal {
                    variable: *variable,
                    info_gain: *info_gain,
                    split_info: *split_info,
                    gain_ratio: *gain_ratio,
                    split_value: *split_value,
                    children,
                    n_obs: *n_obs,
                }
            }
        };
        nodes.push(node);
    }

    if next_child != records.len() {
        return Err(ForestError::InvalidNodeList {
            reason: format!(
                "{} records are not reachable from the root",
                records.len() - next_child
            ),
        });
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- indices ---

    #[test]
    fn variable_index_roundtrip() {
        let vi = VariableIndex::new(7);
        assert_eq!(vi.index(), 7);
        assert_eq!(format!("{vi}"), "7");
    }

    #[test]
    fn variable_index_ordering() {
        assert!(VariableIndex::new(1) < VariableIndex::new(5));
    }

    #[test]
    fn node_index_display() {
        assert_eq!(format!("{}", NodeIndex::new(0)), "0");
    }

    // --- Node ---

    fn leaf(label: usize, counts: Vec<usize>) -> Node {
        let n_obs = counts.iter().sum();
        Node::Leaf { label, counts, n_obs }
    }

    #[test]
    fn leaf_distribution_normalized() {
        let dist = leaf(1, vec![1, 3]).distribution().unwrap();
        assert!((dist[0] - 0.25).abs() < 1e-12);
        assert!((dist[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn empty_leaf_distribution_is_zero() {
        let dist = leaf(0, vec![0, 0]).distribution().unwrap();
        assert_eq!(dist, vec![0.0, 0.0]);
    }

    #[test]
    fn majority_prefers_lowest_on_tie() {
        assert_eq!(majority(&[2, 5, 5]), 1);
        assert_eq!(majority(&[0, 0]), 0);
    }

    // --- flatten / rebuild ---

    /// Depth-first arena: root splits into an internal node and a leaf.
    fn depth_first_arena() -> Vec<Node> {
        vec![
            Node::Internal {
                variable: VariableIndex::new(0),
                info_gain: 0.5,
                split_info: 1.0,
                gain_ratio: Some(0.5),
                split_value: Some(2.5),
                children: vec![NodeIndex::new(1), NodeIndex::new(4)],
                n_obs: 10,
            },
            Node::Internal {
                variable: VariableIndex::new(1),
                info_gain: 0.3,
                split_info: 0.0,
                gain_ratio: None,
                split_value: None,
                children: vec![NodeIndex::new(2), NodeIndex::new(3)],
                n_obs: 6,
            },
            leaf(0, vec![4, 0]),
            leaf(1, vec![0, 2]),
            leaf(1, vec![1, 3]),
        ]
    }

    #[test]
    fn flatten_is_breadth_first() {
        let records = flatten(&depth_first_arena());
        assert_eq!(records.len(), 5);
        assert!(matches!(records[0], NodeRecord::Internal { n_children: 2, .. }));
        assert!(matches!(records[1], NodeRecord::Internal { n_obs: 6, .. }));
        assert!(matches!(records[2], NodeRecord::Leaf { n_obs: 4, .. }));
        assert!(matches!(records[3], NodeRecord::Leaf { n_obs: 4, label: 0, .. }));
    }

    #[test]
    fn rebuild_then_flatten_is_stable() {
        let records = flatten(&depth_first_arena());
        let rebuilt = rebuild(&records).unwrap();
        assert_eq!(flatten(&rebuilt), records);
    }

    #[test]
    fn rebuild_rejects_overlong_child_claim() {
        let records = vec![NodeRecord::Internal {
            n_obs: 3,
            n_children: 2,
            variable: VariableIndex::new(0),
            info_gain: 0.1,
            split_info: 0.2,
            gain_ratio: Some(0.5),
            split_value: Some(1.0),
        }];
        assert!(matches!(rebuild(&records), Err(ForestError::InvalidNodeList { .. })));
    }

    #[test]
    fn rebuild_rejects_orphans() {
        let records = vec![
            NodeRecord::Leaf { n_obs: 1, label: 0, counts: vec![1] },
            NodeRecord::Leaf { n_obs: 1, label: 0, counts: vec![1] },
        ];
        assert!(matches!(rebuild(&records), Err(ForestError::InvalidNodeList { .. })));
    }

    fn internal(n_obs: usize, n_children: usize) -> NodeRecord {
        NodeRecord::Internal {
            n_obs,
            n_children,
            variable: VariableIndex::new(0),
            info_gain: 0.1,
            split_info: 0.2,
            gain_ratio: Some(0.5),
            split_value: Some(1.0),
        }
    }

    #[test]
    fn rebuild_rejects_self_referencing_child() {
        // Node 2 would claim itself and is unreachable from the root.
        let records = vec![
            internal(4, 1),
            NodeRecord::Leaf { n_obs: 4, label: 0, counts: vec![4] },
            internal(2, 1),
        ];
        let err = rebuild(&records).unwrap_err();
        assert!(
            matches!(&err, ForestError::InvalidNodeList { reason } if reason.contains("record 2")),
            "{err}"
        );
    }

    #[test]
    fn rebuild_rejects_unclaimed_subtree() {
        // The root is a leaf, so the trailing internal node and its child dangle.
        let records = vec![
            NodeRecord::Leaf { n_obs: 2, label: 0, counts: vec![2] },
            internal(2, 1),
            NodeRecord::Leaf { n_obs: 2, label: 0, counts: vec![2] },
        ];
        assert!(matches!(rebuild(&records), Err(ForestError::InvalidNodeList { .. })));
    }

    #[test]
    fn rebuild_children_follow_parents() {
        let rebuilt = rebuild(&flatten(&depth_first_arena())).unwrap();
        for (i, node) in rebuilt.iter().enumerate() {
            if let Node::Internal { children, .. } = node {
                assert!(children.iter().all(|c| c.index() > i));
            }
        }
    }

    #[test]
    fn rebuild_rejects_empty() {
        assert!(matches!(rebuild(&[]), Err(ForestError::InvalidNodeList { .. })));
    }
}
