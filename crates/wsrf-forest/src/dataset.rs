//! Typed columnar training data: variables, columns, labels, and the `n·log2(n)` table.

use crate::error::{CategoryMismatchKind, ForestError};
use crate::node::VariableIndex;

/// Whether a variable is categorical (with named levels) or numeric.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum VariableKind {
    /// Categorical variable. Column codes are 1-based positions into `levels`.
    Discrete {
        /// Ordered level names.
        levels: Vec<String>,
    },
    /// Numeric variable stored as integers or reals.
    Continuous,
}

/// A named feature variable.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Variable {
    name: String,
    kind: VariableKind,
}

impl Variable {
    /// Create a categorical variable with the given ordered levels.
    pub fn discrete(name: impl Into<String>, levels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Discrete { levels },
        }
    }

    /// Create a numeric variable.
    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Continuous,
        }
    }

    /// Return the variable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the variable kind.
    #[must_use]
    pub fn kind(&self) -> &VariableKind {
        &self.kind
    }

    /// Return `true` for categorical variables.
    #[must_use]
    pub fn is_discrete(&self) -> bool {
        matches!(self.kind, VariableKind::Discrete { .. })
    }

    /// Return the ordered level names, or `None` for numeric variables.
    #[must_use]
    pub fn levels(&self) -> Option<&[String]> {
        match &self.kind {
            VariableKind::Discrete { levels } => Some(levels),
            VariableKind::Continuous => None,
        }
    }
}

/// Column storage for one variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// 1-based level codes of a categorical variable.
    Discrete(Vec<u32>),
    /// Integer-valued numeric variable.
    Integer(Vec<i64>),
    /// Real-valued numeric variable.
    Real(Vec<f64>),
}

impl Column {
    /// Return the number of observations in the column.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Column::Discrete(v) => v.len(),
            Column::Integer(v) => v.len(),
            Column::Real(v) => v.len(),
        }
    }

    /// Return `true` if the column holds no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn type_name(&self) -> &'static str {
        match self {
            Column::Discrete(_) => "discrete",
            Column::Integer(_) => "integer",
            Column::Real(_) => "real",
        }
    }

    fn value(&self, obs: usize) -> f64 {
        match self {
            Column::Discrete(v) => f64::from(v[obs]),
            Column::Integer(v) => v[obs] as f64,
            Column::Real(v) => v[obs],
        }
    }
}

/// Variables and class names a model was trained with.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Schema {
    variables: Vec<Variable>,
    label_names: Vec<String>,
}

impl Schema {
    pub(crate) fn new(variables: Vec<Variable>, label_names: Vec<String>) -> Self {
        Self {
            variables,
            label_names,
        }
    }

    /// Return the training variables in column order.
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Return the variable at `index`.
    #[must_use]
    pub fn variable(&self, index: VariableIndex) -> &Variable {
        &self.variables[index.index()]
    }

    /// Return the class names, indexed by zero-based label.
    #[must_use]
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_labels(&self) -> usize {
        self.label_names.len()
    }
}

/// An N × M column-major table of feature values.
///
/// Owns a table of `n·log2(n)` for every `n` in `[0, N]` so entropy
/// computations never call `log2` in the split search.
#[derive(Debug, Clone)]
pub struct Dataset {
    variables: Vec<Variable>,
    columns: Vec<Column>,
    n_observations: usize,
    nlogn: Vec<f64>,
}

impl Dataset {
    /// Build a dataset from declared variables and their columns.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::EmptyFeatureSet`] | `variables` is empty |
    /// | [`ForestError::VariableCountMismatch`] | `variables.len() != columns.len()` |
    /// | [`ForestError::EmptyDataset`] | columns hold zero observations |
    /// | [`ForestError::ColumnLengthMismatch`] | columns differ in length |
    /// | [`ForestError::UnsupportedVariableType`] | column storage disagrees with the variable kind |
    /// | [`ForestError::LevelOutOfRange`] | a discrete code is outside `1..=n_levels` |
    /// | [`ForestError::NonFiniteValue`] | a real value is NaN or infinite |
    pub fn new(variables: Vec<Variable>, columns: Vec<Column>) -> Result<Self, ForestError> {
        if variables.is_empty() {
            return Err(ForestError::EmptyFeatureSet);
        }
        if variables.len() != columns.len() {
            return Err(ForestError::VariableCountMismatch {
                n_variables: variables.len(),
                n_columns: columns.len(),
            });
        }

        let n_observations = columns[0].len();
        if n_observations == 0 {
            return Err(ForestError::EmptyDataset);
        }

        for (variable, column) in variables.iter().zip(&columns) {
            if column.len() != n_observations {
                return Err(ForestError::ColumnLengthMismatch {
                    variable: variable.name.clone(),
                    expected: n_observations,
                    got: column.len(),
                });
            }
            validate_column(variable, column)?;
        }

        Ok(Self {
            variables,
            columns,
            n_observations,
            nlogn: nlogn_table(n_observations),
        })
    }

    /// Return the number of observations (rows).
    #[must_use]
    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    /// Return the number of feature variables (columns).
    #[must_use]
    pub fn n_variables(&self) -> usize {
        self.variables.len()
    }

    /// Return the declared variables in column order.
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Return the variable at `index`.
    #[must_use]
    pub fn variable(&self, index: VariableIndex) -> &Variable {
        &self.variables[index.index()]
    }

    /// Return the column at `index`.
    #[must_use]
    pub fn column(&self, index: VariableIndex) -> &Column {
        &self.columns[index.index()]
    }

    /// Return the value of `variable` at `obs` as a float.
    ///
    /// Discrete columns yield their 1-based level code.
    #[must_use]
    pub fn value(&self, variable: VariableIndex, obs: usize) -> f64 {
        self.columns[variable.index()].value(obs)
    }

    /// Return `n·log2(n)` from the precomputed table (`0·log2(0) = 0`).
    #[must_use]
    pub fn nlogn(&self, n: usize) -> f64 {
        self.nlogn[n]
    }

    /// Partition `obs` by the levels of a discrete variable.
    ///
    /// Returns one bucket per level (bucket `i` holds code `i + 1`), empty
    /// buckets included. Observation order inside each bucket follows `obs`.
    pub(crate) fn split_discrete(&self, variable: VariableIndex, obs: &[usize]) -> Vec<Vec<usize>> {
        let n_levels = self.variables[variable.index()]
            .levels()
            .map_or(0, <[String]>::len);
        let mut buckets = vec![Vec::new(); n_levels];
        if let Column::Discrete(codes) = &self.columns[variable.index()] {
            for &i in obs {
                buckets[codes[i] as usize - 1].push(i);
            }
        }
        buckets
    }

    /// Map this dataset onto the encoding of a trained model.
    ///
    /// Variables are matched by name and reordered into training order.
    /// Categorical levels are matched to the training levels by name, so a
    /// subset or reordering of the training levels is re-coded onto the
    /// training positions; integer and real columns
    /// are interchangeable for numeric variables.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::MissingVariable`] | a training variable is absent |
    /// | [`ForestError::VariableKindMismatch`] | a variable changed between discrete and numeric |
    /// | [`ForestError::CategoryMismatch`] | unknown levels, or a level name listed twice |
    pub fn conform_to(&self, schema: &Schema) -> Result<Dataset, ForestError> {
        let mut variables = Vec::with_capacity(schema.variables.len());
        let mut columns = Vec::with_capacity(schema.variables.len());

        for trained in &schema.variables {
            let position = self
                .variables
                .iter()
                .position(|v| v.name == trained.name)
                .ok_or_else(|| ForestError::MissingVariable {
                    variable: trained.name.clone(),
                })?;
            let current = &self.variables[position];
            let column = &self.columns[position];

            let conformed = match (&trained.kind, &current.kind) {
                (VariableKind::Continuous, VariableKind::Continuous) => column.clone(),
                (
                    VariableKind::Discrete { levels: known },
                    VariableKind::Discrete { levels: given },
                ) => remap_levels(&trained.name, known, given, column)?,
                _ => {
                    return Err(ForestError::VariableKindMismatch {
                        variable: trained.name.clone(),
                    });
                }
            };

            variables.push(trained.clone());
            columns.push(conformed);
        }

        Ok(Dataset {
            variables,
            columns,
            n_observations: self.n_observations,
            nlogn: self.nlogn.clone(),
        })
    }
}

fn nlogn_table(n: usize) -> Vec<f64> {
    (0..=n)
        .map(|i| {
            if i == 0 {
                0.0
            } else {
                let x = i as f64;
                x * x.log2()
            }
        })
        .collect()
}

fn validate_column(variable: &Variable, column: &Column) -> Result<(), ForestError> {
    match (&variable.kind, column) {
        (VariableKind::Discrete { levels }, Column::Discrete(codes)) => {
            for (observation, &code) in codes.iter().enumerate() {
                if code == 0 || code as usize > levels.len() {
                    return Err(ForestError::LevelOutOfRange {
                        variable: variable.name.clone(),
                        observation,
                        code,
                        n_levels: levels.len(),
                    });
                }
            }
            Ok(())
        }
        (VariableKind::Continuous, Column::Real(values)) => {
            match values.iter().position(|v| !v.is_finite()) {
                Some(observation) => Err(ForestError::NonFiniteValue {
                    variable: variable.name.clone(),
                    observation,
                }),
                None => Ok(()),
            }
        }
        (VariableKind::Continuous, Column::Integer(_)) => Ok(()),
        (VariableKind::Discrete { .. }, other) => Err(ForestError::UnsupportedVariableType {
            variable: variable.name.clone(),
            expected: "discrete",
            found: other.type_name(),
        }),
        (VariableKind::Continuous, other) => Err(ForestError::UnsupportedVariableType {
            variable: variable.name.clone(),
            expected: "integer or real",
            found: other.type_name(),
        }),
    }
}

fn remap_levels(
    name: &str,
    known: &[String],
    given: &[String],
    column: &Column,
) -> Result<Column, ForestError> {
    if given == known {
        return Ok(column.clone());
    }

    let mismatch = |kind| ForestError::CategoryMismatch {
        variable: name.to_string(),
        kind,
    };

    let duplicated = given
        .iter()
        .enumerate()
        .any(|(i, level)| given[..i].contains(level));
    if duplicated {
        return Err(mismatch(CategoryMismatchKind::AmbiguousLevels));
    }

    let positions = given
        .iter()
        .map(|level| {
            known
                .iter()
                .position(|k| k == level)
                .map(|p| p as u32 + 1)
        })
        .collect::<Option<Vec<u32>>>()
        .ok_or_else(|| mismatch(CategoryMismatchKind::UnknownLevels))?;

    match column {
        Column::Discrete(codes) => Ok(Column::Discrete(
            codes.iter().map(|&c| positions[c as usize - 1]).collect(),
        )),
        other => Ok(other.clone()),
    }
}

/// Class labels: one 1-based code per observation plus the class names.
#[derive(Debug, Clone)]
pub struct Labels {
    codes: Vec<u32>,
    names: Vec<String>,
}

impl Labels {
    /// Build a label vector.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::NoLabelNames`] | `names` is empty |
    /// | [`ForestError::EmptyDataset`] | `codes` is empty |
    /// | [`ForestError::LabelOutOfRange`] | a code is outside `1..=names.len()` |
    pub fn new(codes: Vec<u32>, names: Vec<String>) -> Result<Self, ForestError> {
        if names.is_empty() {
            return Err(ForestError::NoLabelNames);
        }
        if codes.is_empty() {
            return Err(ForestError::EmptyDataset);
        }
        for (observation, &code) in codes.iter().enumerate() {
            if code == 0 || code as usize > names.len() {
                return Err(ForestError::LabelOutOfRange {
                    observation,
                    code,
                    n_labels: names.len(),
                });
            }
        }
        Ok(Self { codes, names })
    }

    /// Return the number of observations labelled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Return `true` if no observation is labelled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_labels(&self) -> usize {
        self.names.len()
    }

    /// Return the class names.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Return the 1-based codes.
    #[must_use]
    pub fn codes(&self) -> &[u32] {
        &self.codes
    }

    /// Return the zero-based class of observation `obs`.
    #[must_use]
    pub fn class_of(&self, obs: usize) -> usize {
        self.codes[obs] as usize - 1
    }

    /// Count observations per zero-based class.
    pub(crate) fn frequencies(&self, obs: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.names.len()];
        for &i in obs {
            counts[self.class_of(i)] += 1;
        }
        counts
    }

    /// Return `true` if every observation in `obs` carries the same class.
    pub(crate) fn all_same(&self, obs: &[usize]) -> bool {
        match obs.split_first() {
            Some((&first, rest)) => rest.iter().all(|&i| self.codes[i] == self.codes[first]),
            None => true,
        }
    }
}
