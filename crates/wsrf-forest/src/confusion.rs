//! Out-of-bag confusion matrix with per-class error.

use std::fmt;

/// A confusion matrix for multi-class classification.
///
/// Entry `as_rows()[actual][predicted]` counts observations of class
/// `actual` predicted as `predicted`. Rendered with a trailing
/// `class.error` column.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    label_names: Vec<String>,
}

impl ConfusionMatrix {
    /// Create an all-zero matrix over the given classes.
    #[must_use]
    pub fn new(label_names: Vec<String>) -> Self {
        let n = label_names.len();
        Self {
            matrix: vec![vec![0; n]; n],
            label_names,
        }
    }

    pub(crate) fn record(&mut self, actual: usize, predicted: usize) {
        self.matrix[actual][predicted] += 1;
    }

    /// Number of observations counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    /// Proportion of correct predictions, 0.0 when empty.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes()).map(|i| self.matrix[i][i]).sum();
        match self.total() {
            0 => 0.0,
            total => correct as f64 / total as f64,
        }
    }

    /// `1 - correct / total` per actual class; `None` for classes never observed.
    #[must_use]
    pub fn class_error(&self) -> Vec<Option<f64>> {
        self.matrix
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let total: usize = row.iter().sum();
                (total > 0).then(|| 1.0 - row[i] as f64 / total as f64)
            })
            .collect()
    }

    /// Return the underlying matrix rows.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Return the class names.
    #[must_use]
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.label_names.len()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .label_names
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(7);

        write!(f, "{:>width$}", "")?;
        for name in &self.label_names {
            write!(f, " {name:>width$}")?;
        }
        writeln!(f, " {:>11}", "class.error")?;

        for ((name, row), err) in self.label_names.iter().zip(&self.matrix).zip(self.class_error()) {
            write!(f, "{name:>width$}")?;
            for val in row {
                write!(f, " {val:>width$}")?;
            }
            match err {
                Some(e) => writeln!(f, " {e:>11.4}")?,
                None => writeln!(f, " {:>11}", "NA")?,
            }
        }

        Ok(())
    }
}
