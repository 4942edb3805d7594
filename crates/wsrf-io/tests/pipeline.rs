//! End-to-end integration tests: CSV -> train -> save/load -> predict -> JSON.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use wsrf_forest::{Forest, ForestConfig, PredictionKind};
use wsrf_io::{ExperimentName, ResultWriter, TableReader};

/// Path to the test fixture directory.
fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn train_save_load_predict_round_trip() {
    // 1. Read training CSV
    let table = TableReader::new(&fixture_path("iris_like.csv"))
        .read(Some("species"))
        .expect("fixture should parse");
    let labels = table.labels.expect("target requested");
    assert_eq!(table.dataset.n_observations(), 60);
    assert_eq!(table.dataset.n_variables(), 3);
    assert_eq!(labels.names(), &["setosa", "versicolor", "virginica"]);

    // 2. Train
    let forest = ForestConfig::new(25)
        .unwrap()
        .with_seed(42)
        .with_importance(true)
        .fit(&table.dataset, &labels)
        .unwrap();
    let error = forest.oob().error_rate().unwrap();
    assert!(error < 0.2, "oob error {error}");

    // 3. Write artifacts and the model
    let dir = TempDir::new().unwrap();
    let experiment = ExperimentName::new("pipeline".into()).unwrap();
    let writer = ResultWriter::new(dir.path(), experiment).unwrap();
    let train_path = writer.write_training(&forest).unwrap();
    forest.save(writer.model_path()).unwrap();

    let content: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&train_path).unwrap()).unwrap();
    assert_eq!(content["n_trees"], 25);
    assert_eq!(content["igr_importance"].as_array().unwrap().len(), 3);

    // 4. Reload and predict new observations with reordered columns
    let loaded = Forest::load(writer.model_path()).unwrap();
    let new = TableReader::new(&fixture_path("new_observations.csv"))
        .read(None)
        .unwrap();
    let preds = loaded.predict(&new.dataset, PredictionKind::Class).unwrap();
    assert_eq!(preds.len(), 4);
    assert_eq!(
        preds,
        forest.predict(&new.dataset, PredictionKind::Class).unwrap()
    );
    assert_eq!(preds.classes().unwrap()[2], 2, "height 5.9 should be virginica");

    // 5. Prediction artifact
    let pred_path = writer
        .write_predictions(loaded.label_names(), PredictionKind::Class, &preds)
        .unwrap();
    let content: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&pred_path).unwrap()).unwrap();
    assert_eq!(content["n_observations"], 4);
    assert_eq!(content["predictions"][2]["label"], "virginica");
}

#[test]
fn prediction_rejects_missing_variable() {
    let table = TableReader::new(&fixture_path("iris_like.csv"))
        .read(Some("species"))
        .unwrap();
    let labels = table.labels.unwrap();
    let forest = ForestConfig::new(3)
        .unwrap()
        .fit(&table.dataset, &labels)
        .unwrap();

    // "count" is absent.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.csv");
    fs::write(&path, "height,colour\n1.5,red\n").unwrap();
    let partial = TableReader::new(&path).read(None).unwrap();
    assert!(forest.predict(&partial.dataset, PredictionKind::Class).is_err());
}

#[test]
fn prediction_file_in_different_row_order() {
    let table = TableReader::new(&fixture_path("iris_like.csv"))
        .read(Some("species"))
        .unwrap();
    let labels = table.labels.unwrap();
    let forest = ForestConfig::new(25)
        .unwrap()
        .with_seed(7)
        .fit(&table.dataset, &labels)
        .unwrap();

    // Rows start blue, green, red; the training file starts red, green, blue.
    let reordered = TableReader::new(&fixture_path("reordered_observations.csv"))
        .read(None)
        .unwrap();
    let preds = forest
        .predict(&reordered.dataset, PredictionKind::Class)
        .expect("reordered rows should conform by level name");
    let classes = preds.classes().unwrap();
    assert_eq!(classes.len(), 5);
    assert_eq!(classes[0], 2, "blue, height 5.9 should be virginica");
    assert_eq!(classes[1], 1, "green, height 3.6 should be versicolor");
    assert_eq!(classes[2], 0, "red, height 1.5 should be setosa");
    assert_eq!(classes[4], 2, "blue, height 5.4 should be virginica");

    // Same observations as new_observations.csv, permuted.
    let original = TableReader::new(&fixture_path("new_observations.csv"))
        .read(None)
        .unwrap();
    let expected = forest
        .predict(&original.dataset, PredictionKind::Class)
        .unwrap();
    let expected = expected.classes().unwrap();
    assert_eq!(classes[0], expected[2]);
    assert_eq!(classes[1], expected[1]);
    assert_eq!(classes[2], expected[0]);
    assert_eq!(classes[3], expected[3]);
}

#[test]
fn prediction_file_with_subset_of_levels() {
    let table = TableReader::new(&fixture_path("iris_like.csv"))
        .read(Some("species"))
        .unwrap();
    let labels = table.labels.unwrap();
    let forest = ForestConfig::new(25)
        .unwrap()
        .with_seed(7)
        .fit(&table.dataset, &labels)
        .unwrap();

    let dir = TempDir::new().unwrap();
    let subset = dir.path().join("subset.csv");
    fs::write(&subset, "height,colour,count\n3.6,green,1\n1.5,red,3\n").unwrap();
    let subset = TableReader::new(&subset).read(None).unwrap();
    let preds = forest.predict(&subset.dataset, PredictionKind::Class).unwrap();
    assert_eq!(preds.classes().unwrap(), &[1, 0]);

    // A level never seen in training is still rejected.
    let unseen = dir.path().join("unseen.csv");
    fs::write(&unseen, "height,colour,count\n3.6,purple,1\n").unwrap();
    let unseen = TableReader::new(&unseen).read(None).unwrap();
    assert!(forest.predict(&unseen.dataset, PredictionKind::Class).is_err());
}
