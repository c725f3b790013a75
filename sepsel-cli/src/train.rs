//! `train` stage: fit the instance -> configuration classifier.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use sepsel_core::{ActionSetArtifact, DeltaMatrix, FeatureStore, trace};
use sepsel_ml::{PolicyTrainer, TrainerConfig};

#[derive(Debug, Args)]
pub struct TrainArgs {
    /// Timing trace (results.csv or results.jsonl)
    #[arg(long)]
    pub results: PathBuf,

    /// Feature store artifact (features.json)
    #[arg(long)]
    pub features: PathBuf,

    /// Action-set artifact (A.json) from build-action-set
    #[arg(long)]
    pub action_set: Option<PathBuf>,

    /// Explicit comma-separated action list (overrides --action-set)
    #[arg(long, value_delimiter = ',')]
    pub actions: Option<Vec<String>>,

    /// Output directory
    #[arg(long)]
    pub out_dir: PathBuf,

    /// Baseline configuration name
    #[arg(long, default_value = "all_off")]
    pub baseline: String,

    /// Fraction of instances held out for validation
    #[arg(long, default_value_t = 0.2)]
    pub val_frac: f64,

    /// Number of epochs
    #[arg(long, default_value_t = 200)]
    pub epochs: usize,

    /// Learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,

    /// Hidden layer width
    #[arg(long, default_value_t = 128)]
    pub hidden: usize,

    /// Number of hidden layers
    #[arg(long, default_value_t = 2)]
    pub depth: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

fn resolve_actions(args: &TrainArgs) -> Result<Vec<String>> {
    if let Some(actions) = &args.actions {
        let actions: Vec<String> = actions
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if actions.is_empty() {
            bail!("--actions parsed to an empty list");
        }
        return Ok(actions);
    }
    if let Some(path) = &args.action_set {
        let artifact = ActionSetArtifact::load(path)?;
        return Ok(artifact.actions);
    }
    bail!("provide either --action-set or --actions")
}

pub fn run(args: TrainArgs) -> Result<()> {
    let actions = resolve_actions(&args)?;
    let records = trace::read_trace(&args.results)
        .with_context(|| format!("reading {}", args.results.display()))?;
    let matrix = DeltaMatrix::from_records(&records, &args.baseline)?;
    let store = FeatureStore::from_json_file(&args.features)?;
    info!(
        actions = actions.len(),
        instances = matrix.n_instances(),
        features = store.len(),
        "starting training"
    );

    let trainer = PolicyTrainer::new(TrainerConfig {
        epochs: args.epochs,
        learning_rate: args.learning_rate,
        hidden: args.hidden,
        depth: args.depth,
        val_frac: args.val_frac,
        seed: args.seed,
        ..TrainerConfig::default()
    });
    let outcome = trainer.train(&matrix, &actions, &store)?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let policy_path = args.out_dir.join("policy.json");
    outcome.policy.save(&policy_path)?;

    let preds_path = args.out_dir.join("preds_val.csv");
    let mut writer = csv::Writer::from_path(&preds_path)
        .with_context(|| format!("creating {}", preds_path.display()))?;
    for pred in &outcome.val_predictions {
        writer.serialize(pred)?;
    }
    writer.flush()?;

    let metrics_path = args.out_dir.join("metrics.json");
    let metrics_json = serde_json::to_string_pretty(&outcome.metrics)?;
    fs::write(&metrics_path, &metrics_json)
        .with_context(|| format!("writing {}", metrics_path.display()))?;

    println!("Wrote:");
    println!("  {}", policy_path.display());
    println!("  {}", preds_path.display());
    println!("  {}", metrics_path.display());
    println!("\n{metrics_json}");
    Ok(())
}
