//! Offline Policy Evaluation
//!
//! Replays externally supplied per-instance predictions against a
//! previously collected timing trace: no new solves, just joins. Rows
//! that fail to match stay visible in the output with empty cells so the
//! join quality can be audited.

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::trace::{
    self, PRED_CONFIG_COLUMNS, PRED_INSTANCE_COLUMNS, TimingRecord, normalize_instance_name,
};

/// One predicted (instance, configuration) assignment.
#[derive(Debug, Clone)]
pub struct PredictionRow {
    /// Instance identifier (raw)
    pub instance: String,
    /// Predicted configuration name
    pub config: String,
}

/// Read predictions from a CSV with negotiated columns.
pub fn read_predictions_csv(path: &Path) -> Result<Vec<PredictionRow>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| Error::parse(path, e))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::parse(path, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let inst_idx = trace::resolve_column(&headers, PRED_INSTANCE_COLUMNS, "predictions", "instance")?;
    let cfg_idx = trace::resolve_column(
        &headers,
        PRED_CONFIG_COLUMNS,
        "predictions",
        "predicted config",
    )?;

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| Error::parse(path, e))?;
        rows.push(PredictionRow {
            instance: row.get(inst_idx).unwrap_or_default().to_string(),
            config: row.get(cfg_idx).unwrap_or_default().to_string(),
        });
    }
    if rows.is_empty() {
        return Err(Error::coverage(
            "prediction load",
            format!("{} contains no prediction rows", path.display()),
        ));
    }
    Ok(rows)
}

/// Per-instance replay outcome. Empty cells mark join gaps.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineEvalRow {
    /// Normalized instance identifier
    pub instance_name: String,
    /// Predicted configuration
    pub pred_config: String,
    /// Observed time under the predicted configuration, when the trace has it
    pub pred_time_sec: Option<f64>,
    /// Baseline time for the instance, when the trace has it
    pub baseline_time_sec: Option<f64>,
    /// Relative improvement; absent when either time is missing or the
    /// baseline time is zero
    pub delta: Option<f64>,
}

/// Aggregate replay report.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineEvalSummary {
    /// Total prediction rows
    pub n_preds: usize,
    /// Rows whose (instance, config) pair was found in the trace
    pub n_matched: usize,
    /// `n_matched / max(1, n_preds)`
    pub match_rate: f64,
    /// Baseline configuration used for the join
    pub baseline_config: String,
    /// Mean delta over rows with a finite delta
    pub mean_delta: Option<f64>,
    /// Median delta over rows with a finite delta
    pub median_delta: Option<f64>,
    /// Fraction of finite-delta rows with delta > 0
    pub positive_delta_fraction: Option<f64>,
}

/// Options for a replay run.
#[derive(Debug, Clone)]
pub struct OfflineEvalConfig {
    /// Baseline configuration name
    pub baseline: String,
    /// Keep only trace rows whose status looks solved before joining
    pub require_optimal: bool,
}

/// Statuses counted as solved under `require_optimal`.
fn status_is_solved(status: &str) -> bool {
    let s = status.to_lowercase();
    s.contains("optimal") || s.contains("solved") || s.contains("feasible")
}

/// Replay `predictions` against `records`.
pub fn evaluate(
    records: &[TimingRecord],
    predictions: &[PredictionRow],
    config: &OfflineEvalConfig,
) -> Result<(Vec<OfflineEvalRow>, OfflineEvalSummary)> {
    let kept: Vec<&TimingRecord> = if config.require_optimal {
        let kept: Vec<&TimingRecord> = records
            .iter()
            .filter(|r| r.status.as_deref().is_some_and(status_is_solved))
            .collect();
        debug!(
            kept = kept.len(),
            total = records.len(),
            "filtered trace to solved rows"
        );
        kept
    } else {
        records.iter().collect()
    };
    if kept.is_empty() {
        return Err(Error::coverage(
            "status filter",
            "no trace rows left to join against",
        ));
    }

    // First match wins for both lookups.
    let mut baseline_time: FxHashMap<String, f64> = FxHashMap::default();
    let mut pair_time: FxHashMap<(String, String), f64> = FxHashMap::default();
    for r in &kept {
        let inst = normalize_instance_name(&r.instance_name);
        if r.config_name == config.baseline {
            baseline_time.entry(inst.clone()).or_insert(r.solve_time_sec);
        }
        pair_time
            .entry((inst, r.config_name.clone()))
            .or_insert(r.solve_time_sec);
    }

    let mut rows = Vec::with_capacity(predictions.len());
    let mut n_matched = 0usize;
    for pred in predictions {
        let inst = normalize_instance_name(&pred.instance);
        let pred_time = pair_time.get(&(inst.clone(), pred.config.clone())).copied();
        let base_time = baseline_time.get(&inst).copied();
        if pred_time.is_some() {
            n_matched += 1;
        } else {
            warn!(instance = %inst, config = %pred.config, "prediction has no matching trace row");
        }
        let delta = match (pred_time, base_time) {
            (Some(t_pred), Some(t_base)) => {
                let d = (t_base - t_pred) / t_base;
                d.is_finite().then_some(d)
            }
            _ => None,
        };
        rows.push(OfflineEvalRow {
            instance_name: inst,
            pred_config: pred.config.clone(),
            pred_time_sec: pred_time,
            baseline_time_sec: base_time,
            delta,
        });
    }

    let mut deltas: Vec<f64> = rows.iter().filter_map(|r| r.delta).collect();
    deltas.sort_by(|a, b| a.partial_cmp(b).expect("finite deltas compare"));
    let summary = OfflineEvalSummary {
        n_preds: predictions.len(),
        n_matched,
        match_rate: n_matched as f64 / predictions.len().max(1) as f64,
        baseline_config: config.baseline.clone(),
        mean_delta: (!deltas.is_empty())
            .then(|| deltas.iter().sum::<f64>() / deltas.len() as f64),
        median_delta: median_of_sorted(&deltas),
        positive_delta_fraction: (!deltas.is_empty())
            .then(|| deltas.iter().filter(|&&d| d > 0.0).count() as f64 / deltas.len() as f64),
    };
    Ok((rows, summary))
}

fn median_of_sorted(sorted: &[f64]) -> Option<f64> {
    match sorted.len() {
        0 => None,
        n if n % 2 == 1 => Some(sorted[n / 2]),
        n => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(instance: &str, config: &str, time: f64, status: Option<&str>) -> TimingRecord {
        TimingRecord {
            instance_name: instance.to_string(),
            config_name: config.to_string(),
            solve_time_sec: time,
            wall_time_sec: None,
            status: status.map(|s| s.to_string()),
            obj: None,
            nodes: None,
            lp_iterations: None,
        }
    }

    fn pred(instance: &str, config: &str) -> PredictionRow {
        PredictionRow {
            instance: instance.to_string(),
            config: config.to_string(),
        }
    }

    fn eval_config() -> OfflineEvalConfig {
        OfflineEvalConfig {
            baseline: "all_off".to_string(),
            require_optimal: false,
        }
    }

    #[test]
    fn test_full_coverage_match_rate_and_mean() {
        let records = vec![
            record("i1", "all_off", 10.0, None),
            record("i1", "c1", 5.0, None),
            record("i2", "all_off", 20.0, None),
            record("i2", "c2", 10.0, None),
        ];
        let preds = vec![pred("i1", "c1"), pred("i2", "c2")];
        let (rows, summary) = evaluate(&records, &preds, &eval_config()).unwrap();
        assert_eq!(summary.match_rate, 1.0);
        assert_eq!(summary.n_matched, 2);
        // Both deltas are 0.5, so the mean equals the per-row mean.
        let per_row: f64 =
            rows.iter().map(|r| r.delta.unwrap()).sum::<f64>() / rows.len() as f64;
        assert_eq!(summary.mean_delta, Some(per_row));
        assert_eq!(summary.positive_delta_fraction, Some(1.0));
    }

    #[test]
    fn test_unmatched_prediction_is_counted_not_fatal() {
        let records = vec![record("i1", "all_off", 10.0, None)];
        let preds = vec![pred("i1", "missing_cfg")];
        let (rows, summary) = evaluate(&records, &preds, &eval_config()).unwrap();
        assert_eq!(summary.n_matched, 0);
        assert_eq!(summary.match_rate, 0.0);
        assert_eq!(summary.mean_delta, None);
        assert!(rows[0].pred_time_sec.is_none());
        assert_eq!(rows[0].baseline_time_sec, Some(10.0));
    }

    #[test]
    fn test_zero_baseline_delta_is_missing() {
        let records = vec![
            record("i1", "all_off", 0.0, None),
            record("i1", "c1", 5.0, None),
        ];
        let preds = vec![pred("i1", "c1")];
        let (rows, summary) = evaluate(&records, &preds, &eval_config()).unwrap();
        // Matched (the pair exists) but the delta is unusable.
        assert_eq!(summary.n_matched, 1);
        assert!(rows[0].delta.is_none());
        assert_eq!(summary.mean_delta, None);
    }

    #[test]
    fn test_first_baseline_match_wins() {
        let records = vec![
            record("i1", "all_off", 10.0, None),
            record("i1", "all_off", 99.0, None),
            record("i1", "c1", 5.0, None),
        ];
        let preds = vec![pred("i1", "c1")];
        let (rows, _) = evaluate(&records, &preds, &eval_config()).unwrap();
        assert_eq!(rows[0].baseline_time_sec, Some(10.0));
    }

    #[test]
    fn test_identifiers_join_across_producers() {
        let records = vec![
            record("runs/uc_3.lp", "all_off", 10.0, None),
            record("runs/uc_3.lp", "c1", 4.0, None),
        ];
        let preds = vec![pred("uc_3", "c1")];
        let (rows, summary) = evaluate(&records, &preds, &eval_config()).unwrap();
        assert_eq!(summary.match_rate, 1.0);
        assert!((rows[0].delta.unwrap() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_require_optimal_filters_trace() {
        let records = vec![
            record("i1", "all_off", 10.0, Some("optimal solution found")),
            record("i1", "c1", 5.0, Some("time limit reached")),
        ];
        let preds = vec![pred("i1", "c1")];
        let mut config = eval_config();
        config.require_optimal = true;
        let (_, summary) = evaluate(&records, &preds, &config).unwrap();
        assert_eq!(summary.n_matched, 0);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median_of_sorted(&[]), None);
        assert_eq!(median_of_sorted(&[1.0, 2.0, 4.0]), Some(2.0));
        assert_eq!(median_of_sorted(&[1.0, 3.0]), Some(2.0));
    }
}
