//! Greedy Action-Set Selection
//!
//! Picks a restricted set of configurations that maximizes the mean of
//! the per-instance best delta, one configuration per round. Candidates
//! are scanned in lexicographic order so ties resolve deterministically,
//! and a round only commits when it genuinely improves the objective.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::delta::DeltaMatrix;
use crate::error::{Error, Result};

/// A candidate must beat the current objective by more than this to be
/// selected; guards against floating-point noise masquerading as gain.
pub const IMPROVEMENT_TOLERANCE: f64 = 1e-12;

/// Persisted action-set artifact (`A.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSetArtifact {
    /// Baseline configuration the deltas were measured against
    pub baseline: String,
    /// Minimum average delta a candidate needed to enter selection
    pub min_avg_delta: f64,
    /// Maximum number of actions requested
    pub max_size: usize,
    /// Selected configuration names, in selection order
    pub actions: Vec<String>,
}

impl ActionSetArtifact {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| Error::parse(path, e))
    }

    /// Write to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).expect("artifact serializes");
        std::fs::write(path, json).map_err(|e| Error::io(path, e))
    }
}

/// Result of a greedy selection run.
#[derive(Debug, Clone)]
pub struct GreedySelection {
    /// Selected configuration names, in selection order
    pub actions: Vec<String>,
    /// Mean best delta after each round; non-decreasing by construction
    pub curve: Vec<f64>,
}

impl GreedySelection {
    /// Mean best delta achieved by the full set (zero for an empty set,
    /// matching the baseline's own delta).
    pub fn mean_best_delta(&self) -> f64 {
        self.curve.last().copied().unwrap_or(0.0)
    }
}

/// Summary artifact describing the matrix and the selection.
#[derive(Debug, Clone, Serialize)]
pub struct DeltaSummary {
    /// Number of instance rows in the matrix
    pub n_instances: usize,
    /// All configuration columns
    pub configs_all: Vec<String>,
    /// Mean delta per configuration
    pub avg_delta: BTreeMap<String, f64>,
    /// Selected action set
    pub actions: Vec<String>,
    /// Greedy objective after each round
    pub greedy_curve_mean_best_delta: Vec<f64>,
    /// Final objective value
    pub mean_best_delta: f64,
}

impl DeltaSummary {
    /// Assemble the summary for a matrix and its selection.
    pub fn new(matrix: &DeltaMatrix, selection: &GreedySelection) -> Self {
        Self {
            n_instances: matrix.n_instances(),
            configs_all: matrix.configs().to_vec(),
            avg_delta: matrix.avg_deltas().into_iter().collect(),
            actions: selection.actions.clone(),
            greedy_curve_mean_best_delta: selection.curve.clone(),
            mean_best_delta: selection.mean_best_delta(),
        }
    }
}

/// Greedily select up to `max_size` configurations from the matrix.
///
/// Candidates are the columns whose average delta is at least
/// `min_avg_delta`. Each round scores every remaining candidate by the
/// mean of `max(running_best, candidate_column)` and selects the best
/// strict improvement; selection stops early once no candidate improves.
/// Missing cells leave the running best untouched for that instance.
pub fn select_action_set(
    matrix: &DeltaMatrix,
    min_avg_delta: f64,
    max_size: usize,
) -> Result<GreedySelection> {
    let mut remaining: Vec<usize> = (0..matrix.configs().len())
        .filter(|&col| matrix.avg_delta(col).is_some_and(|d| d >= min_avg_delta))
        .collect();
    if remaining.is_empty() {
        return Err(Error::coverage(
            "candidate filter",
            format!("no configuration has average delta >= {min_avg_delta}"),
        ));
    }
    debug!(candidates = remaining.len(), "filtered candidate configurations");

    let n = matrix.n_instances();
    // The baseline's own zero delta is the floor for every instance.
    let mut running_best = vec![0.0f64; n];
    let mut objective = 0.0f64;
    let mut actions = Vec::new();
    let mut curve = Vec::new();

    for round in 0..max_size {
        let mut best: Option<(usize, f64, Vec<f64>)> = None;
        for &col in &remaining {
            let merged: Vec<f64> = (0..n)
                .map(|row| match matrix.get(row, col) {
                    Some(delta) => running_best[row].max(delta),
                    None => running_best[row],
                })
                .collect();
            let score = merged.iter().sum::<f64>() / n as f64;
            let bar = best.as_ref().map_or(objective, |(_, s, _)| *s);
            if score > bar + IMPROVEMENT_TOLERANCE {
                best = Some((col, score, merged));
            }
        }
        let Some((col, score, merged)) = best else {
            debug!(round, "no candidate improves the objective, stopping");
            break;
        };
        actions.push(matrix.configs()[col].clone());
        curve.push(score);
        remaining.retain(|&c| c != col);
        running_best = merged;
        objective = score;
        if remaining.is_empty() {
            break;
        }
    }

    info!(
        selected = actions.len(),
        mean_best_delta = objective,
        "greedy selection finished"
    );
    Ok(GreedySelection { actions, curve })
}
