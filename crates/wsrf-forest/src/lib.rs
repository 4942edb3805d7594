//! Weighted-subspace random forests: train, evaluate, predict.
//!
//! Grows ensembles of C4.5 decision trees over bootstrap samples of mixed
//! categorical/numeric data. Each split draws a variable subspace either
//! uniformly or weighted by information gain ratio. Trees are built in
//! parallel with cooperative cancellation, and the forest reports
//! out-of-bag error, strength, correlation and variable importance.

mod cancel;
mod config;
mod confusion;
mod dataset;
mod error;
mod forest;
mod importance;
mod node;
mod oob;
mod perm_importance;
mod predict;
mod render;
mod sampling;
mod serialize;
mod split;
mod tree;

pub use cancel::CancellationToken;
pub use config::{ForestConfig, Parallelism};
pub use confusion::ConfusionMatrix;
pub use dataset::{Column, Dataset, Labels, Schema, Variable, VariableKind};
pub use error::{CategoryMismatchKind, ForestError};
pub use forest::{Forest, TrainingControl};
pub use importance::{RankedVariable, VariableImportance};
pub use node::{Node, NodeIndex, NodeRecord, VariableIndex};
pub use oob::OobSummary;
pub use predict::{PredictionKind, Predictions};
pub use render::TreeDisplay;
pub use sampling::{WeightTransform, WeightedSampler, random_sample};
pub use serialize::{ForestModel, TreeRecord};
pub use split::{SplitEvaluator, SplitResult};
pub use tree::DecisionTree;
