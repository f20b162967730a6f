use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use configuration::{init_tracing, load_config};
use ml_features::{FeatureSchema, load_dataset};
use ml_trainer::{TrainingPipeline, TrainingReport};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Train the BUY/HOLD/SELL ensemble", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train both classifiers from a labeled dataset and write the artifact set.
    Train(TrainArgs),
}

#[derive(Parser)]
struct TrainArgs {
    /// CSV or Parquet file with one column per feature plus a `label` column.
    #[arg(long)]
    dataset: PathBuf,

    /// Where to write the artifact set. Defaults to `artifacts.model_dir`.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Configuration file. Defaults to `config.toml` if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated feature columns, in model input order.
    #[arg(long, value_delimiter = ',')]
    features: Option<Vec<String>>,

    /// Overrides `training.seed`.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => handle_train(args),
    }
}

fn handle_train(args: TrainArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging).context("Failed to initialise logging")?;

    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    let model_dir = args.model_dir.unwrap_or_else(|| config.artifacts.model_dir.clone());
    let schema = match args.features {
        Some(names) => FeatureSchema::new(names).context("Invalid --features")?,
        None => FeatureSchema::default(),
    };

    let dataset = load_dataset(&args.dataset, &schema)
        .with_context(|| format!("Failed to load dataset {}", args.dataset.display()))?;

    let pipeline = TrainingPipeline::from_config(&config)?;
    let trained = pipeline.run(&dataset).context("Training failed")?;
    let published = trained
        .persist(&model_dir)
        .with_context(|| format!("Failed to write artifacts to {}", model_dir.display()))?;

    print_report(&trained.report);
    println!("\nArtifacts published to {}", published.display());
    Ok(())
}

fn print_report(report: &TrainingReport) {
    let mut summary = Table::new();
    summary.load_preset(UTF8_FULL);
    summary.set_header(vec!["Dataset", "Value"]);
    summary.add_row(vec!["Samples".to_string(), report.n_samples.to_string()]);
    summary.add_row(vec!["Train / Test".to_string(), format!("{} / {}", report.n_train, report.n_test)]);
    summary.add_row(vec!["Seed".to_string(), report.seed.to_string()]);
    for (label, count) in &report.class_distribution {
        summary.add_row(vec![format!("Class {label}"), count.to_string()]);
    }
    summary.add_row(vec![
        "Weights (primary / secondary)".to_string(),
        format!("{:.2} / {:.2}", report.primary_weight, report.secondary_weight),
    ]);
    if let Some(reason) = &report.secondary_failure {
        summary.add_row(vec!["Secondary unavailable".to_string(), reason.clone()]);
    }
    println!("{summary}");

    let mut models = Table::new();
    models.load_preset(UTF8_FULL);
    models.set_header(vec!["Model", "Accuracy", "Macro F1", "Weighted F1"]);
    let mut rows = vec![("Random Forest", &report.primary)];
    if let Some(secondary) = &report.secondary {
        rows.push(("Neural Network", secondary));
    }
    rows.push(("Ensemble", &report.ensemble));
    for (name, metrics) in rows {
        models.add_row(vec![
            Cell::new(name),
            Cell::new(format!("{:.3}", metrics.accuracy)),
            Cell::new(format!("{:.3}", metrics.macro_avg.f1)),
            Cell::new(format!("{:.3}", metrics.weighted_avg.f1)),
        ]);
    }
    println!("{models}");

    let mut per_class = Table::new();
    per_class.load_preset(UTF8_FULL);
    per_class.set_header(vec!["Ensemble class", "Precision", "Recall", "F1", "Support"]);
    for class in &report.ensemble.per_class {
        per_class.add_row(vec![
            class.label.clone(),
            format!("{:.3}", class.precision),
            format!("{:.3}", class.recall),
            format!("{:.3}", class.f1),
            class.support.to_string(),
        ]);
    }
    println!("{per_class}");

    let mut confusion = Table::new();
    confusion.load_preset(UTF8_FULL);
    let mut header = vec!["actual \\ predicted".to_string()];
    header.extend(report.classes.iter().cloned());
    confusion.set_header(header);
    for (label, row) in report.classes.iter().zip(&report.ensemble.confusion_matrix) {
        let mut cells = vec![label.clone()];
        cells.extend(row.iter().map(|n| n.to_string()));
        confusion.add_row(cells);
    }
    println!("{confusion}");
}
