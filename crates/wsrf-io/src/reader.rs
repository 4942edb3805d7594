//! CSV table reader with column type inference.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};
use wsrf_forest::{Column, Dataset, Labels, Variable};

use crate::IoError;
use crate::domain::Table;

/// Reads a mixed categorical/numeric table from a CSV file.
///
/// Expected CSV format:
/// - Header row required, one column per variable
/// - One row per observation, all rows must have the same number of columns
///
/// A column becomes an integer variable when every cell parses as `i64`, a
/// real variable when every cell parses as a finite `f64`, and a categorical
/// variable otherwise. Categorical levels and class names are sorted by
/// name, so files listing rows in a different order share one encoding.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::MissingTargetColumn`] | Requested target is not in the header |
/// | [`IoError::NoFeatureColumns`] | No column left besides the target |
/// | [`IoError::Dataset`] | Parsed columns fail dataset validation |
pub struct TableReader {
    path: PathBuf,
}

impl TableReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read the CSV file, splitting off `target` as the class labels.
    ///
    /// With `target = None` every column is a predictor and
    /// [`Table::labels`] is `None`.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self, target: Option<&str>) -> Result<Table, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that InconsistentRowLength fires instead of CsvParse.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header: Vec<String> = rdr
            .headers()
            .map_err(|e| self.parse_error(e))?
            .iter()
            .map(String::from)
            .collect();
        let expected_cols = header.len();
        debug!(expected_cols, "read CSV header");

        let target_index = match target {
            Some(name) => Some(header.iter().position(|h| h == name).ok_or_else(|| {
                IoError::MissingTargetColumn {
                    path: self.path.clone(),
                    target: name.to_string(),
                }
            })?),
            None => None,
        };
        if expected_cols == usize::from(target_index.is_some()) {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); expected_cols];
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.parse_error(e))?;
            if record.len() != expected_cols {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: expected_cols,
                    got: record.len(),
                });
            }
            for (column, cell) in cells.iter_mut().zip(record.iter()) {
                column.push(cell.to_string());
            }
        }

        if cells[0].is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        let mut variables = Vec::with_capacity(expected_cols);
        let mut columns = Vec::with_capacity(expected_cols);
        let mut labels = None;
        for (index, (name, raw)) in header.into_iter().zip(cells).enumerate() {
            if Some(index) == target_index {
                let (levels, codes) = encode_levels(&raw);
                labels = Some(Labels::new(codes, levels).map_err(|e| self.dataset_error(e))?);
                continue;
            }
            let (variable, column) = infer_column(name, &raw);
            variables.push(variable);
            columns.push(column);
        }

        let dataset = Dataset::new(variables, columns).map_err(|e| self.dataset_error(e))?;
        info!(
            n_observations = dataset.n_observations(),
            n_variables = dataset.n_variables(),
            n_classes = labels.as_ref().map(Labels::n_labels),
            "table loaded"
        );

        Ok(Table { dataset, labels })
    }

    fn parse_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }

    fn dataset_error(&self, source: wsrf_forest::ForestError) -> IoError {
        IoError::Dataset {
            path: self.path.clone(),
            source,
        }
    }
}

fn infer_column(name: String, raw: &[String]) -> (Variable, Column) {
    if let Some(values) = raw
        .iter()
        .map(|s| s.parse::<i64>().ok())
        .collect::<Option<Vec<_>>>()
    {
        return (Variable::continuous(name), Column::Integer(values));
    }
    if let Some(values) = raw
        .iter()
        .map(|s| s.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<Vec<_>>>()
    {
        return (Variable::continuous(name), Column::Real(values));
    }
    let (levels, codes) = encode_levels(raw);
    (Variable::discrete(name, levels), Column::Discrete(codes))
}

/// Assign 1-based codes to distinct strings, levels sorted by name.
fn encode_levels(raw: &[String]) -> (Vec<String>, Vec<u32>) {
    let levels: Vec<String> = raw.iter().collect::<BTreeSet<_>>().into_iter().cloned().collect();
    let codes = raw
        .iter()
        .map(|cell| {
            // Every cell is present in `levels` by construction.
            let position = levels.binary_search(cell).unwrap_or_default();
            position as u32 + 1
        })
        .collect();
    (levels, codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use wsrf_forest::{VariableIndex, VariableKind};

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    // --- type inference ---

    #[test]
    fn infers_integer_real_and_discrete() {
        let csv = "age,height,colour,class\n30,1.75,red,yes\n41,1.62,blue,no\n25,1.80,red,yes\n";
        let f = write_csv(csv);
        let table = TableReader::new(f.path()).read(Some("class")).unwrap();
        let ds = &table.dataset;

        assert_eq!(ds.n_observations(), 3);
        assert_eq!(ds.n_variables(), 3);
        assert_eq!(ds.column(VariableIndex::new(0)), &Column::Integer(vec![30, 41, 25]));
        assert!(matches!(ds.column(VariableIndex::new(1)), Column::Real(_)));
        assert_eq!(ds.column(VariableIndex::new(2)), &Column::Discrete(vec![2, 1, 2]));
        assert_eq!(
            ds.variable(VariableIndex::new(2)).kind(),
            &VariableKind::Discrete {
                levels: vec!["blue".into(), "red".into()]
            }
        );

        let labels = table.labels.unwrap();
        assert_eq!(labels.names(), &["no", "yes"]);
        assert_eq!(labels.codes(), &[2, 1, 2]);
    }

    #[test]
    fn levels_sorted_regardless_of_row_order() {
        let first = write_csv("colour,class\nred,b\ngreen,a\nblue,c\n");
        let second = write_csv("colour,class\nblue,c\ngreen,a\nred,b\n");
        let a = TableReader::new(first.path()).read(Some("class")).unwrap();
        let b = TableReader::new(second.path()).read(Some("class")).unwrap();

        let sorted = VariableKind::Discrete {
            levels: vec!["blue".into(), "green".into(), "red".into()],
        };
        assert_eq!(a.dataset.variable(VariableIndex::new(0)).kind(), &sorted);
        assert_eq!(b.dataset.variable(VariableIndex::new(0)).kind(), &sorted);
        assert_eq!(a.dataset.column(VariableIndex::new(0)), &Column::Discrete(vec![3, 2, 1]));
        assert_eq!(b.dataset.column(VariableIndex::new(0)), &Column::Discrete(vec![1, 2, 3]));
        assert_eq!(a.labels.unwrap().names(), &["a", "b", "c"]);
        assert_eq!(b.labels.unwrap().codes(), &[3, 1, 2]);
    }

    #[test]
    fn non_finite_cells_make_column_discrete() {
        let csv = "x,y\n1.5,a\nNaN,b\n";
        let f = write_csv(csv);
        let table = TableReader::new(f.path()).read(None).unwrap();
        assert!(table.dataset.variable(VariableIndex::new(0)).is_discrete());
        assert!(table.labels.is_none());
    }

    // --- errors ---

    #[test]
    fn missing_target_error() {
        let f = write_csv("a,b\n1,2\n");
        let err = TableReader::new(f.path()).read(Some("class")).unwrap_err();
        assert!(matches!(err, IoError::MissingTargetColumn { .. }));
    }

    #[test]
    fn empty_dataset_error() {
        let f = write_csv("a,class\n");
        let err = TableReader::new(f.path()).read(Some("class")).unwrap_err();
        assert!(matches!(err, IoError::EmptyDataset { .. }));
    }

    #[test]
    fn no_feature_columns_error() {
        let f = write_csv("class\nyes\nno\n");
        let err = TableReader::new(f.path()).read(Some("class")).unwrap_err();
        assert!(matches!(err, IoError::NoFeatureColumns { .. }));
    }

    #[test]
    fn inconsistent_row_length_error() {
        let f = write_csv("a,b,class\n1,2,yes\n3,no\n");
        let err = TableReader::new(f.path()).read(Some("class")).unwrap_err();
        assert!(matches!(err, IoError::InconsistentRowLength { row_index: 1, .. }));
    }

    #[test]
    fn missing_file_error() {
        let err = TableReader::new(Path::new("/nonexistent/table.csv"))
            .read(None)
            .unwrap_err();
        assert!(matches!(err, IoError::FileNotFound { .. }));
    }
}
