use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use wsrf_forest::{Forest, ForestConfig, Parallelism, PredictionKind, TrainingControl};
use wsrf_io::{ExperimentName, ResultWriter, TableReader};

#[derive(Parser)]
#[command(name = "wsrf")]
#[command(about = "Weighted-subspace random forests for mixed categorical and numeric data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Master RNG seed; per-tree seeds are derived from it
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for batch prediction (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Train a forest on a CSV table and save the model
    Train {
        /// Path to the training CSV file
        #[arg(long)]
        data: PathBuf,

        /// Name of the class label column
        #[arg(long)]
        target: String,

        /// Number of trees
        #[arg(long, default_value_t = 500)]
        n_trees: usize,

        /// Variables drawn per node (defaults to floor(log2(M)) + 1)
        #[arg(long)]
        mtry: Option<usize>,

        /// Minimum observations per child for a split to be usable
        #[arg(long, default_value_t = 2)]
        min_node_size: usize,

        /// Weight subspace selection by information gain ratio
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        weights: bool,

        /// Assess permutation importance on out-of-bag observations
        #[arg(long, default_value_t = false)]
        importance: bool,

        /// Build degree: 0 or 1 sequential, negative automatic, larger exact
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        parallel: i64,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Predict new observations with a saved model
    Predict {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Path to the CSV file with observations to predict
        #[arg(long)]
        data: PathBuf,

        /// Prediction kind: "class", "vote", "prob", "aprob" or "waprob"
        #[arg(long, default_value = "class")]
        kind: String,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Print trees of a saved model as indented text
    Print {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Zero-based tree indices to print (all trees if omitted)
        #[arg(long, value_delimiter = ',')]
        trees: Vec<usize>,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct TrainOutput {
    experiment: String,
    n_observations: usize,
    n_variables: usize,
    n_classes: usize,
    n_trees: usize,
    mtry: usize,
    oob_error_rate: Option<f64>,
    strength: Option<f64>,
    correlation: Option<f64>,
    c_s2: Option<f64>,
    model_path: PathBuf,
}

#[derive(Serialize)]
struct PredictOutput {
    experiment: String,
    kind: PredictionKind,
    n_observations: usize,
    model_n_trees: usize,
    model_n_classes: usize,
}

fn parse_kind(s: &str) -> Result<PredictionKind> {
    match s {
        "class" => Ok(PredictionKind::Class),
        "vote" => Ok(PredictionKind::Vote),
        "prob" => Ok(PredictionKind::Prob),
        "aprob" => Ok(PredictionKind::Aprob),
        "waprob" => Ok(PredictionKind::Waprob),
        other => anyhow::bail!(
            "unknown prediction kind: {other} (expected class, vote, prob, aprob, or waprob)"
        ),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Global pool used by batch prediction; training sizes its own pool.
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Train {
            data,
            target,
            n_trees,
            mtry,
            min_node_size,
            weights,
            importance,
            parallel,
            experiment,
            output_dir,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;

            // 1. Read table
            let table = TableReader::new(&data)
                .read(Some(&target))
                .context("failed to read training CSV")?;
            let labels = table
                .labels
                .context("training table has no label column")?;

            // 2. Train
            let config = ForestConfig::new(n_trees)?
                .with_mtry(mtry)
                .with_min_node_size(min_node_size)
                .with_weighting(weights)
                .with_importance(importance)
                .with_parallelism(Parallelism::from_degree(parallel))
                .with_seed(cli.seed);
            let built = AtomicUsize::new(0);
            let progress = TrainingControl::new().with_tree_callback(|_| {
                let done = built.fetch_add(1, Ordering::Relaxed) + 1;
                if done % 50 == 0 || done == n_trees {
                    info!(done, n_trees, "trees built");
                }
            });
            let forest = config
                .fit_with_control(&table.dataset, &labels, &progress)
                .context("training failed")?;

            // 3. Save model and write JSON artifact
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            let model_path = writer.model_path();
            forest
                .save(&model_path)
                .context("failed to save model")?;
            writer.write_training(&forest)?;

            // 4. Print summary
            let oob = forest.oob();
            let output = TrainOutput {
                experiment,
                n_observations: table.dataset.n_observations(),
                n_variables: table.dataset.n_variables(),
                n_classes: labels.n_labels(),
                n_trees: forest.n_trees(),
                mtry: forest.mtry(),
                oob_error_rate: oob.error_rate(),
                strength: oob.strength(),
                correlation: oob.correlation(),
                c_s2: oob.c_s2(),
                model_path,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            model,
            data,
            kind,
            experiment,
            output_dir,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let kind = parse_kind(&kind)?;

            // 1. Load model
            let forest = Forest::load(&model).context("failed to load model")?;
            info!(
                n_trees = forest.n_trees(),
                n_variables = forest.schema().variables().len(),
                n_classes = forest.label_names().len(),
                "model loaded"
            );

            // 2. Read observations; extra columns such as a label are ignored
            let table = TableReader::new(&data)
                .read(None)
                .context("failed to read prediction CSV")?;

            // 3. Predict
            let predictions = forest
                .predict(&table.dataset, kind)
                .context("prediction failed")?;

            // 4. Write predictions JSON
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            writer.write_predictions(forest.label_names(), kind, &predictions)?;

            // 5. Print summary
            let output = PredictOutput {
                experiment,
                kind,
                n_observations: predictions.len(),
                model_n_trees: forest.n_trees(),
                model_n_classes: forest.label_names().len(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Print { model, trees } => {
            let forest = Forest::load(&model).context("failed to load model")?;
            let indices: Vec<usize> = if trees.is_empty() {
                (0..forest.n_trees()).collect()
            } else {
                trees
            };

            for index in indices {
                let Some(tree) = forest.trees().get(index) else {
                    anyhow::bail!(
                        "tree index {index} out of range (model has {} trees)",
                        forest.n_trees()
                    );
                };
                let error = tree
                    .oob_error_rate()
                    .map_or_else(|| "NA".to_string(), |e| format!("{e:.4}"));
                println!(
                    "Tree {index}: {} nodes, {} leaves, depth {}, OOB error {error}",
                    tree.n_nodes(),
                    tree.n_leaves(),
                    tree.depth()
                );
                print!("{}", tree.display(forest.schema()));
                println!();
            }
        }
    }

    Ok(())
}
