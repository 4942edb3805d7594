//! JSON result writer for training and prediction outputs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};
use wsrf_forest::{Forest, PredictionKind, Predictions, RankedVariable};

use crate::IoError;
use crate::domain::ExperimentName;

/// Writes training and prediction results to JSON files.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_train.json` and
/// `{experiment}_predictions.json`.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Write the forest's OOB statistics and importance to `{experiment}_train.json`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::Serialize`] | JSON encoding failed |
    /// | [`IoError::WriteFile`] | the file cannot be written |
    #[instrument(skip_all)]
    pub fn write_training(&self, forest: &Forest) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("train");
        let oob = forest.oob();
        let importance = forest.importance();

        let artifact = TrainArtifact {
            experiment: self.experiment.as_str(),
            n_trees: forest.n_trees(),
            mtry: forest.mtry(),
            min_node_size: forest.min_node_size(),
            weighting: forest.weighting(),
            label_names: forest.label_names(),
            oob_error_rate: oob.error_rate(),
            strength: oob.strength(),
            correlation: oob.correlation(),
            c_s2: oob.c_s2(),
            confusion_matrix: oob.confusion().as_rows(),
            class_error: oob.confusion().class_error(),
            igr_importance: importance.ranked_igr(),
            permutation_importance: importance.ranked_permutation(),
            mean_tree_size: mean(forest.trees().iter().map(|t| t.n_nodes())),
            mean_tree_depth: mean(forest.trees().iter().map(|t| t.depth())),
        };

        self.write_json(&path, &artifact)?;
        info!(path = %path.display(), "training result written");
        Ok(path)
    }

    /// Write predictions to `{experiment}_predictions.json`.
    ///
    /// Each row carries the predicted class name and, for vote and
    /// probability kinds, the per-class values.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::Serialize`] | JSON encoding failed |
    /// | [`IoError::WriteFile`] | the file cannot be written |
    #[instrument(skip_all, fields(n = predictions.len()))]
    pub fn write_predictions(
        &self,
        label_names: &[String],
        kind: PredictionKind,
        predictions: &Predictions,
    ) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("predictions");
        let name = |class: usize| label_names.get(class).map_or("?", String::as_str);

        let rows: Vec<PredictionEntry<'_>> = match predictions {
            Predictions::Class(classes) => classes
                .iter()
                .enumerate()
                .map(|(row, &c)| PredictionEntry {
                    row,
                    label: name(c),
                    values: None,
                })
                .collect(),
            Predictions::Vote(votes) => votes
                .iter()
                .enumerate()
                .map(|(row, v)| {
                    let values: Vec<f64> = v.iter().map(|&n| n as f64).collect();
                    PredictionEntry {
                        row,
                        label: name(first_max(&values)),
                        values: Some(values),
                    }
                })
                .collect(),
            Predictions::Prob(probs) | Predictions::Aprob(probs) | Predictions::Waprob(probs) => {
                probs
                    .iter()
                    .enumerate()
                    .map(|(row, p)| PredictionEntry {
                        row,
                        label: name(first_max(p)),
                        values: Some(p.clone()),
                    })
                    .collect()
            }
        };

        let artifact = PredictArtifact {
            experiment: self.experiment.as_str(),
            kind,
            label_names,
            n_observations: rows.len(),
            predictions: rows,
        };

        self.write_json(&path, &artifact)?;
        info!(path = %path.display(), "predictions written");
        Ok(path)
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Does not write anything, just computes `{output_dir}/{experiment}_model.bin`.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_model.bin", self.experiment.as_str()))
    }

    fn artifact_path(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{suffix}.json", self.experiment.as_str()))
    }

    fn write_json<T: Serialize>(&self, path: &Path, artifact: &T) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::Serialize {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, &json).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Index of the first maximum; 0 for an empty slice.
fn first_max(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn mean(values: impl ExactSizeIterator<Item = usize>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<usize>() as f64 / n as f64
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct TrainArtifact<'a> {
    experiment: &'a str,
    n_trees: usize,
    mtry: usize,
    min_node_size: usize,
    weighting: bool,
    label_names: &'a [String],
    oob_error_rate: Option<f64>,
    strength: Option<f64>,
    correlation: Option<f64>,
    c_s2: Option<f64>,
    confusion_matrix: &'a [Vec<usize>],
    class_error: Vec<Option<f64>>,
    igr_importance: Vec<RankedVariable>,
    permutation_importance: Option<Vec<RankedVariable>>,
    mean_tree_size: f64,
    mean_tree_depth: f64,
}

#[derive(Serialize)]
struct PredictArtifact<'a> {
    experiment: &'a str,
    kind: PredictionKind,
    label_names: &'a [String],
    n_observations: usize,
    predictions: Vec<PredictionEntry<'a>>,
}

#[derive(Serialize)]
struct PredictionEntry<'a> {
    row: usize,
    label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Vec<f64>>,
}
