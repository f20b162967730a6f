use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{init_tracing, load_config};
use core_types::FeatureVector;
use engine::EnsembleEngine;
use std::io::Read;
use std::path::PathBuf;

/// The entry point for the Verdict decision CLI.
fn main() -> anyhow::Result<()> {
    // Environment overrides may live in a .env file; it is optional.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging).context("Failed to initialise logging")?;
    if let Some(model_dir) = cli.model_dir {
        config.artifacts.model_dir = model_dir;
    }

    match cli.command {
        Commands::Predict(args) => handle_predict(args, &config),
        Commands::Status => handle_status(&config),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Turns market features into a BUY/HOLD/SELL decision.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file. Defaults to `config.toml` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Artifact directory. Overrides `artifacts.model_dir`.
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide for one feature vector given as a JSON object.
    Predict(PredictArgs),
    /// Show which artifact set the engine would serve from.
    Status,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PredictArgs {
    /// JSON file holding `{"feature": value, ...}`.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Read the JSON object from standard input.
    #[arg(long)]
    stdin: bool,
}

// ==============================================================================
// Command Logic
// ==============================================================================

fn handle_predict(args: PredictArgs, config: &configuration::Config) -> anyhow::Result<()> {
    let raw = match (&args.input, args.stdin) {
        (Some(path), _) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, true) => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read standard input")?;
            buffer
        }
        (None, false) => bail!("either --input or --stdin is required"),
    };
    let features = FeatureVector::from_json(&raw).context("Invalid feature vector")?;

    let engine = EnsembleEngine::from_config(config).context("Failed to load decision engine")?;
    let result = engine.predict(&features)?;

    println!("{}", result.to_json_pretty()?);
    Ok(())
}

fn handle_status(config: &configuration::Config) -> anyhow::Result<()> {
    let engine = EnsembleEngine::from_config(config).context("Failed to load decision engine")?;
    let metadata = engine.metadata();
    let weights = engine.weights();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Engine", "Value"]);
    table.add_row(vec!["Model directory".to_string(), config.artifacts.model_dir.display().to_string()]);
    table.add_row(vec!["State".to_string(), engine.state().to_string()]);
    table.add_row(vec!["Contributing models".to_string(), engine.contributing_models().to_string()]);
    table.add_row(vec![
        "Weights (primary / secondary)".to_string(),
        format!("{:.2} / {:.2}", weights.primary, weights.secondary),
    ]);
    table.add_row(vec!["Classes".to_string(), metadata.classes.join(", ")]);
    table.add_row(vec!["Features".to_string(), metadata.features.names().join(", ")]);
    table.add_row(vec![
        "Trained at".to_string(),
        metadata
            .trained_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string()),
    ]);
    table.add_row(vec!["Format version".to_string(), metadata.format_version.to_string()]);
    println!("{table}");

    tracing::debug!(state = %engine.state(), "Status reported");
    Ok(())
}
