//! `eval-offline` stage: replay predictions against a collected trace.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use sepsel_core::offline::{self, OfflineEvalConfig};
use sepsel_core::trace;

#[derive(Debug, Args)]
pub struct EvalOfflineArgs {
    /// Timing trace CSV to replay against
    #[arg(long)]
    pub results: PathBuf,

    /// Predictions CSV (instance + predicted configuration)
    #[arg(long)]
    pub preds: PathBuf,

    /// Baseline configuration name
    #[arg(long, default_value = "all_off")]
    pub baseline: String,

    /// Output directory
    #[arg(long, default_value = "outputs_eval_offline")]
    pub out_dir: PathBuf,

    /// Keep only trace rows whose status looks solved
    #[arg(long)]
    pub require_optimal: bool,
}

pub fn run(args: EvalOfflineArgs) -> Result<()> {
    let (records, time_column) = trace::read_trace_csv(&args.results)
        .with_context(|| format!("reading {}", args.results.display()))?;
    let predictions = offline::read_predictions_csv(&args.preds)
        .with_context(|| format!("reading {}", args.preds.display()))?;
    info!(
        trace_rows = records.len(),
        predictions = predictions.len(),
        time_column = %time_column,
        "replaying predictions"
    );

    let config = OfflineEvalConfig {
        baseline: args.baseline,
        require_optimal: args.require_optimal,
    };
    let (rows, summary) = offline::evaluate(&records, &predictions, &config)?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let rows_path = args.out_dir.join("offline_eval_rows.csv");
    let mut writer = csv::Writer::from_path(&rows_path)
        .with_context(|| format!("creating {}", rows_path.display()))?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    let summary_path = args.out_dir.join("offline_eval_summary.json");
    let summary_json = serde_json::to_string_pretty(&summary)?;
    fs::write(&summary_path, &summary_json)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    println!("Wrote:");
    println!("  {}", rows_path.display());
    println!("  {}", summary_path.display());
    println!("\n{summary_json}");
    Ok(())
}
