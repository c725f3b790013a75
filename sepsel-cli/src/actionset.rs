//! `build-action-set` stage: timing trace in, restricted action set out.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use sepsel_core::greedy::{self, DeltaSummary};
use sepsel_core::{ActionSetArtifact, DeltaMatrix, trace};

#[derive(Debug, Args)]
pub struct BuildActionSetArgs {
    /// Timing trace (results.csv or results.jsonl)
    #[arg(long)]
    pub results: PathBuf,

    /// Output directory
    #[arg(long, default_value = "outputs_action_set")]
    pub out_dir: PathBuf,

    /// Baseline configuration name
    #[arg(long, default_value = "all_on")]
    pub baseline: String,

    /// Drop candidates whose average delta is below this
    #[arg(long, default_value_t = 0.0)]
    pub min_avg_delta: f64,

    /// Maximum action-set size
    #[arg(long, default_value_t = 5)]
    pub max_size: usize,
}

pub fn run(args: BuildActionSetArgs) -> Result<()> {
    let records = trace::read_trace(&args.results)
        .with_context(|| format!("reading {}", args.results.display()))?;
    info!(records = records.len(), "loaded timing trace");

    let matrix = DeltaMatrix::from_records(&records, &args.baseline)?;
    let selection = greedy::select_action_set(&matrix, args.min_avg_delta, args.max_size)?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let matrix_path = args.out_dir.join("delta_matrix.csv");
    let file = fs::File::create(&matrix_path)
        .with_context(|| format!("creating {}", matrix_path.display()))?;
    matrix.write_csv(file)?;

    let artifact = ActionSetArtifact {
        baseline: args.baseline.clone(),
        min_avg_delta: args.min_avg_delta,
        max_size: args.max_size,
        actions: selection.actions.clone(),
    };
    let artifact_path = args.out_dir.join("A.json");
    artifact.save(&artifact_path)?;

    let summary = DeltaSummary::new(&matrix, &selection);
    let summary_path = args.out_dir.join("delta_summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    println!("Wrote:");
    println!("  {}", artifact_path.display());
    println!("  {}", matrix_path.display());
    println!("  {}", summary_path.display());
    println!("\nSelected actions:");
    for (i, action) in selection.actions.iter().enumerate() {
        println!("  {}. {} (curve {:.4})", i + 1, action, selection.curve[i]);
    }
    Ok(())
}
