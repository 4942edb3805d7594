use std::path::PathBuf;

/// Which way a prediction-time categorical variable disagrees with training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryMismatchKind {
    /// The variable carries levels never seen during training.
    UnknownLevels,
    /// A level name appears more than once, so codes cannot be matched by name.
    AmbiguousLevels,
}

impl std::fmt::Display for CategoryMismatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLevels => f.write_str("levels unseen at training time"),
            Self::AmbiguousLevels => f.write_str("level names listed more than once"),
        }
    }
}

/// Errors from forest construction, prediction, and model persistence.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Returned when the dataset has zero observations.
    #[error("dataset has zero observations")]
    EmptyDataset,

    /// Returned when the dataset has zero feature variables.
    #[error("dataset has zero feature variables")]
    EmptyFeatureSet,

    /// Returned when a column's storage does not match its declared variable kind.
    #[error("variable \"{variable}\" expected {expected} values, found {found}")]
    UnsupportedVariableType {
        /// Name of the offending variable.
        variable: String,
        /// Storage type the variable kind requires.
        expected: &'static str,
        /// Storage type actually supplied.
        found: &'static str,
    },

    /// Returned when prediction data cannot be mapped onto the training levels.
    #[error("categorical variable \"{variable}\" does not match training: {kind}")]
    CategoryMismatch {
        /// Name of the offending variable.
        variable: String,
        /// How the levels disagree.
        kind: CategoryMismatchKind,
    },

    /// Returned when a tree is asked to grow from an empty observation set.
    #[error("cannot grow a node from an empty observation set")]
    EmptyNode,

    /// Returned when training was cancelled before every tree finished.
    #[error("training cancelled")]
    Cancelled,

    /// Returned when the number of trees is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid n_trees value provided.
        n_trees: usize,
    },

    /// Returned when mtry resolves to 0 or exceeds the number of variables.
    #[error("mtry resolved to {mtry}, but must be in [1, {n_variables}]")]
    InvalidMtry {
        /// The resolved mtry value.
        mtry: usize,
        /// The number of feature variables in the dataset.
        n_variables: usize,
    },

    /// Returned when min_node_size is zero.
    #[error("min_node_size must be at least 1, got {min_node_size}")]
    InvalidMinNodeSize {
        /// The invalid min_node_size value provided.
        min_node_size: usize,
    },

    /// Returned when explicit tree seeds do not match the number of trees.
    #[error("{got} tree seeds supplied for {expected} trees")]
    SeedCountMismatch {
        /// The configured number of trees.
        expected: usize,
        /// The number of seeds supplied.
        got: usize,
    },

    /// Returned when columns have different lengths.
    #[error("variable \"{variable}\" has {got} observations, expected {expected}")]
    ColumnLengthMismatch {
        /// Name of the offending variable.
        variable: String,
        /// The expected number of observations.
        expected: usize,
        /// The actual number of observations in the column.
        got: usize,
    },

    /// Returned when the number of variables and columns disagree.
    #[error("{n_variables} variables declared but {n_columns} columns supplied")]
    VariableCountMismatch {
        /// Number of declared variables.
        n_variables: usize,
        /// Number of supplied columns.
        n_columns: usize,
    },

    /// Returned when a discrete code falls outside `1..=n_levels`.
    #[error("variable \"{variable}\" has level code {code} at observation {observation}, expected 1..={n_levels}")]
    LevelOutOfRange {
        /// Name of the offending variable.
        variable: String,
        /// Zero-based index of the offending observation.
        observation: usize,
        /// The offending code.
        code: u32,
        /// Number of declared levels.
        n_levels: usize,
    },

    /// Returned when a continuous value is NaN or infinite.
    #[error("non-finite value in variable \"{variable}\" at observation {observation}")]
    NonFiniteValue {
        /// Name of the offending variable.
        variable: String,
        /// Zero-based index of the offending observation.
        observation: usize,
    },

    /// Returned when a label code falls outside `1..=n_labels`.
    #[error("label code {code} at observation {observation} outside 1..={n_labels}")]
    LabelOutOfRange {
        /// Zero-based index of the offending observation.
        observation: usize,
        /// The offending code.
        code: u32,
        /// Number of declared label names.
        n_labels: usize,
    },

    /// Returned when the label vector is empty of class names.
    #[error("labels must declare at least one class name")]
    NoLabelNames,

    /// Returned when labels and dataset disagree on the number of observations.
    #[error("dataset has {n_observations} observations but {n_labels} labels")]
    LabelCountMismatch {
        /// Observations in the dataset.
        n_observations: usize,
        /// Entries in the label vector.
        n_labels: usize,
    },

    /// Returned when prediction data lacks a variable the model splits on.
    #[error("prediction data is missing variable \"{variable}\"")]
    MissingVariable {
        /// Name of the missing variable.
        variable: String,
    },

    /// Returned when a variable is discrete at training time but continuous at prediction (or vice versa).
    #[error("variable \"{variable}\" changed kind between training and prediction")]
    VariableKindMismatch {
        /// Name of the offending variable.
        variable: String,
    },

    /// Returned when a flattened node list cannot be rebuilt into a tree.
    #[error("invalid node list: {reason}")]
    InvalidNodeList {
        /// Human-readable description of the defect.
        reason: String,
    },

    /// Returned when the worker pool cannot be created.
    #[error("failed to build worker pool")]
    ThreadPool {
        /// The underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },
}
