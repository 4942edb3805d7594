//! Model store: bincode persistence of a fitted forest.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::dataset::Schema;
use crate::error::ForestError;
use crate::forest::Forest;
use crate::importance::VariableImportance;
use crate::node::{self, NodeRecord};
use crate::oob::OobSummary;
use crate::tree::DecisionTree;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// One persisted tree: its breadth-first node list plus OOB bookkeeping.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TreeRecord {
    /// Seed the tree was grown from.
    pub seed: u64,
    /// Breadth-first flattened nodes.
    pub nodes: Vec<NodeRecord>,
    /// Out-of-bag observations.
    pub oob: Vec<usize>,
    /// Zero-based class predicted for each OOB observation.
    pub oob_predictions: Vec<usize>,
    /// OOB error rate, `None` for an empty OOB set.
    pub oob_error_rate: Option<f64>,
    /// Per-class OOB error rates.
    pub label_oob_error_rates: Vec<Option<f64>>,
    /// Summed gain ratio per variable.
    pub igr_importance: Vec<f64>,
    /// `(L+1) × M` permutation importance, when assessed.
    pub permutation_importance: Option<Vec<Vec<f64>>>,
}

impl From<&DecisionTree> for TreeRecord {
    fn from(tree: &DecisionTree) -> Self {
        Self {
            seed: tree.seed,
            nodes: tree.flatten(),
            oob: tree.oob.clone(),
            oob_predictions: tree.oob_predictions.clone(),
            oob_error_rate: tree.oob_error_rate,
            label_oob_error_rates: tree.label_oob_error_rates.clone(),
            igr_importance: tree.igr_importance.clone(),
            permutation_importance: tree.permutation_importance.clone(),
        }
    }
}

impl TryFrom<TreeRecord> for DecisionTree {
    type Error = ForestError;

    fn try_from(record: TreeRecord) -> Result<Self, Self::Error> {
        if record.oob.len() != record.oob_predictions.len() {
            return Err(ForestError::InvalidNodeList {
                reason: format!(
                    "{} OOB observations but {} OOB predictions",
                    record.oob.len(),
                    record.oob_predictions.len()
                ),
            });
        }
        Ok(Self {
            nodes: node::rebuild(&record.nodes)?,
            seed: record.seed,
            bag: Vec::new(),
            oob: record.oob,
            oob_predictions: record.oob_predictions,
            oob_error_rate: record.oob_error_rate,
            label_oob_error_rates: record.label_oob_error_rates,
            igr_importance: record.igr_importance,
            permutation_importance: record.permutation_importance,
        })
    }
}

/// Versioned envelope for the serialized model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ForestModel {
    /// Format version for compatibility checking.
    pub format_version: u32,
    /// Training variables and class names.
    pub schema: Schema,
    /// Resolved subspace size.
    pub mtry: usize,
    /// Minimum node size used for training.
    pub min_node_size: usize,
    /// Whether weighted subspace selection was used.
    pub weighting: bool,
    /// Trees in build order.
    pub trees: Vec<TreeRecord>,
    /// Forest OOB statistics.
    pub oob: OobSummary,
    /// Forest importance measures.
    pub importance: VariableImportance,
}

impl From<&Forest> for ForestModel {
    fn from(forest: &Forest) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            schema: forest.schema.clone(),
            mtry: forest.mtry,
            min_node_size: forest.min_node_size,
            weighting: forest.weighting,
            trees: forest.trees.iter().map(TreeRecord::from).collect(),
            oob: forest.oob.clone(),
            importance: forest.importance.clone(),
        }
    }
}

impl TryFrom<ForestModel> for Forest {
    type Error = ForestError;

    fn try_from(model: ForestModel) -> Result<Self, Self::Error> {
        let trees = model
            .trees
            .into_iter()
            .map(DecisionTree::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            schema: model.schema,
            trees,
            mtry: model.mtry,
            min_node_size: model.min_node_size,
            weighting: model.weighting,
            oob: model.oob,
            importance: model.importance,
        })
    }
}

impl Forest {
    /// Save the model to a binary file.
    ///
    /// Uses bincode encoding wrapped in a versioned envelope.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::SerializeModel`] | bincode encoding failed |
    /// | [`ForestError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ForestError> {
        let path = path.as_ref();
        let envelope = ForestModel::from(self);

        let bytes =
            bincode::serialize(&envelope).map_err(|source| ForestError::SerializeModel { source })?;

        std::fs::write(path, &bytes).map_err(|source| ForestError::WriteModel {
            path: path.to_path_buf(),
            source,
        })?;

        info!(size_bytes = bytes.len(), n_trees = self.trees.len(), "model saved");
        Ok(())
    }

    /// Load a model from a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ReadModel`] | file read failed |
    /// | [`ForestError::DeserializeModel`] | bincode decoding failed |
    /// | [`ForestError::IncompatibleModelVersion`] | format version mismatch |
    /// | [`ForestError::InvalidNodeList`] | a stored tree is malformed |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ForestError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|source| ForestError::ReadModel {
            path: path.to_path_buf(),
            source,
        })?;

        let envelope: ForestModel =
            bincode::deserialize(&bytes).map_err(|source| ForestError::DeserializeModel {
                path: path.to_path_buf(),
                source,
            })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(ForestError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }

        debug!(
            n_trees = envelope.trees.len(),
            n_variables = envelope.schema.variables().len(),
            n_labels = envelope.schema.n_labels(),
            "model loaded"
        );

        Forest::try_from(envelope)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::ForestConfig;
    use crate::dataset::{Column, Dataset, Labels, Variable};
    use crate::predict::PredictionKind;

    fn train_simple_model() -> (Forest, Dataset) {
        let ds = Dataset::new(
            vec![
                Variable::continuous("x"),
                Variable::discrete("colour", vec!["red".into(), "blue".into()]),
            ],
            vec![
                Column::Real(vec![1.0, 2.0, 3.0, 4.0, 10.0, 11.0, 12.0, 13.0]),
                Column::Discrete(vec![1, 1, 2, 1, 2, 2, 1, 2]),
            ],
        )
        .unwrap();
        let labels = Labels::new(vec![1, 1, 1, 1, 2, 2, 2, 2], vec!["a".into(), "b".into()]).unwrap();
        let forest = ForestConfig::new(5)
            .unwrap()
            .with_seed(42)
            .with_importance(true)
            .fit(&ds, &labels)
            .unwrap();
        (forest, ds)
    }

    #[test]
    fn round_trip_identical_predictions() {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("test_model.bin");

        let (forest, ds) = train_simple_model();
        forest.save(&model_path).unwrap();
        let loaded = Forest::load(&model_path).unwrap();

        for kind in [PredictionKind::Class, PredictionKind::Aprob, PredictionKind::Waprob] {
            assert_eq!(
                forest.predict(&ds, kind).unwrap(),
                loaded.predict(&ds, kind).unwrap()
            );
        }
        assert_eq!(loaded.oob(), forest.oob());
        assert_eq!(loaded.importance(), forest.importance());
        assert_eq!(loaded.schema(), forest.schema());
        for (a, b) in forest.trees().iter().zip(loaded.trees()) {
            assert_eq!(a.nodes(), b.nodes());
            assert_eq!(a.oob(), b.oob());
            assert_eq!(a.oob_error_rate(), b.oob_error_rate());
        }
    }

    #[test]
    fn version_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.bin");
        let (forest, _) = train_simple_model();
        let mut envelope = ForestModel::from(&forest);
        envelope.format_version = FORMAT_VERSION + 1;
        std::fs::write(&path, bincode::serialize(&envelope).unwrap()).unwrap();

        let err = Forest::load(&path).unwrap_err();
        assert!(matches!(err, ForestError::IncompatibleModelVersion { .. }));
    }

    #[test]
    fn load_nonexistent_file_error() {
        let dir = TempDir::new().unwrap();
        let err = Forest::load(dir.path().join("missing.bin")).unwrap_err();
        assert!(matches!(err, ForestError::ReadModel { .. }));
    }

    #[test]
    fn load_corrupt_file_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.bin");
        std::fs::write(&path, b"not a valid bincode file").unwrap();
        let err = Forest::load(&path).unwrap_err();
        assert!(matches!(err, ForestError::DeserializeModel { .. }));
    }

    #[test]
    fn mismatched_oob_lengths_rejected() {
        let (forest, _) = train_simple_model();
        let mut record = TreeRecord::from(&forest.trees()[0]);
        record.oob_predictions.push(0);
        assert!(matches!(
            DecisionTree::try_from(record),
            Err(ForestError::InvalidNodeList { .. })
        ));
    }
}
