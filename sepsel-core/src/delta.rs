//! Delta Matrix
//!
//! Relative-improvement table over a baseline configuration:
//! `delta = (t_base - t_config) / t_base`, one row per instance (in
//! first-seen order), one column per configuration (lexicographic).
//! Cells with no measurement stay empty; duplicate measurements for the
//! same (instance, configuration) pair average.

use std::io::Write;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::DELTA_CLIP;
use crate::error::{Error, Result};
use crate::trace::TimingRecord;

/// Instance × configuration table of clipped deltas.
#[derive(Debug, Clone)]
pub struct DeltaMatrix {
    baseline: String,
    instances: Vec<String>,
    configs: Vec<String>,
    /// Row-major, `instances.len() * configs.len()`
    cells: Vec<Option<f64>>,
}

impl DeltaMatrix {
    /// Build the matrix from raw timing records.
    ///
    /// Instances without any baseline measurement are silently dropped;
    /// only the intersection survives. The baseline time per instance is
    /// the mean of its baseline measurements, which keeps the baseline's
    /// own column identically zero.
    pub fn from_records(records: &[TimingRecord], baseline: &str) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::coverage("trace load", "timing trace is empty"));
        }

        // Baseline time per instance (mean over duplicates).
        let mut base_sum: FxHashMap<&str, (f64, usize)> = FxHashMap::default();
        for r in records {
            if r.config_name == baseline {
                let entry = base_sum.entry(r.instance_name.as_str()).or_insert((0.0, 0));
                entry.0 += r.solve_time_sec;
                entry.1 += 1;
            }
        }
        if base_sum.is_empty() {
            return Err(Error::coverage(
                "baseline join",
                format!("no measurements for baseline configuration '{baseline}'"),
            ));
        }
        let base_time: FxHashMap<&str, f64> = base_sum
            .into_iter()
            .map(|(name, (sum, count))| (name, sum / count as f64))
            .collect();

        // Rows: instances with a usable baseline, in first-seen order.
        let mut instances: Vec<String> = Vec::new();
        let mut instance_idx: FxHashMap<&str, usize> = FxHashMap::default();
        let total_instances = records
            .iter()
            .map(|r| r.instance_name.as_str())
            .collect::<FxHashSet<_>>()
            .len();
        for r in records {
            if instance_idx.contains_key(r.instance_name.as_str()) {
                continue;
            }
            let Some(&t_base) = base_time.get(r.instance_name.as_str()) else {
                continue;
            };
            if !(t_base.is_finite() && t_base > 0.0) {
                warn!(instance = %r.instance_name, t_base, "non-positive baseline time, instance dropped");
                continue;
            }
            instance_idx.insert(r.instance_name.as_str(), instances.len());
            instances.push(r.instance_name.clone());
        }
        if instances.is_empty() {
            return Err(Error::coverage(
                "baseline join",
                "no instance has a usable baseline time",
            ));
        }
        if instances.len() < total_instances {
            debug!(
                kept = instances.len(),
                total = total_instances,
                "restricted to instances with a baseline measurement"
            );
        }

        // Columns: every configuration observed on a kept instance, lexicographic.
        let mut configs: Vec<String> = {
            let mut seen: FxHashSet<&str> = FxHashSet::default();
            records
                .iter()
                .filter(|r| instance_idx.contains_key(r.instance_name.as_str()))
                .filter(|r| seen.insert(r.config_name.as_str()))
                .map(|r| r.config_name.clone())
                .collect()
        };
        configs.sort_unstable();
        let config_idx: FxHashMap<&str, usize> = configs
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        // Accumulate mean delta per cell, clipping after aggregation.
        let n_cols = configs.len();
        let mut sums = vec![(0.0f64, 0usize); instances.len() * n_cols];
        for r in records {
            let Some(&row) = instance_idx.get(r.instance_name.as_str()) else {
                continue;
            };
            let col = config_idx[r.config_name.as_str()];
            let t_base = base_time[r.instance_name.as_str()];
            let delta = (t_base - r.solve_time_sec) / t_base;
            let cell = &mut sums[row * n_cols + col];
            cell.0 += delta;
            cell.1 += 1;
        }
        let cells = sums
            .into_iter()
            .map(|(sum, count)| {
                (count > 0).then(|| (sum / count as f64).clamp(-DELTA_CLIP, DELTA_CLIP))
            })
            .collect();

        Ok(Self {
            baseline: baseline.to_string(),
            instances,
            configs,
            cells,
        })
    }

    /// Baseline configuration name.
    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    /// Row labels, in first-seen order.
    pub fn instances(&self) -> &[String] {
        &self.instances
    }

    /// Column labels, lexicographic.
    pub fn configs(&self) -> &[String] {
        &self.configs
    }

    /// Cell value, `None` where no measurement exists.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.cells[row * self.configs.len() + col]
    }

    /// Column index for a configuration name.
    pub fn column_index(&self, config: &str) -> Option<usize> {
        self.configs.iter().position(|c| c == config)
    }

    /// One column as a vector of optional deltas.
    pub fn column(&self, col: usize) -> Vec<Option<f64>> {
        (0..self.instances.len()).map(|r| self.get(r, col)).collect()
    }

    /// Mean delta of one column over its present cells.
    pub fn avg_delta(&self, col: usize) -> Option<f64> {
        let (sum, count) = (0..self.instances.len())
            .filter_map(|r| self.get(r, col))
            .fold((0.0, 0usize), |(s, n), d| (s + d, n + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// `(name, mean delta)` for every column with at least one cell,
    /// in column order.
    pub fn avg_deltas(&self) -> Vec<(String, f64)> {
        self.configs
            .iter()
            .enumerate()
            .filter_map(|(col, name)| self.avg_delta(col).map(|d| (name.clone(), d)))
            .collect()
    }

    /// Number of instance rows.
    pub fn n_instances(&self) -> usize {
        self.instances.len()
    }

    /// Write the matrix as CSV (empty cells where no measurement exists).
    pub fn write_csv<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        write!(out, "instance_name")?;
        for config in &self.configs {
            write!(out, ",{config}")?;
        }
        writeln!(out)?;
        for (row, instance) in self.instances.iter().enumerate() {
            write!(out, "{instance}")?;
            for col in 0..self.configs.len() {
                match self.get(row, col) {
                    Some(delta) => write!(out, ",{delta}")?,
                    None => write!(out, ",")?,
                }
            }
            writeln!(out)?;
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(instance: &str, config: &str, time: f64) -> TimingRecord {
        TimingRecord {
            instance_name: instance.to_string(),
            config_name: config.to_string(),
            solve_time_sec: time,
            wall_time_sec: None,
            status: None,
            obj: None,
            nodes: None,
            lp_iterations: None,
        }
    }

    #[test]
    fn test_baseline_column_is_zero() {
        let records = vec![
            record("i1", "base", 10.0),
            record("i1", "c1", 8.0),
            record("i2", "base", 20.0),
            record("i2", "c1", 25.0),
        ];
        let matrix = DeltaMatrix::from_records(&records, "base").unwrap();
        let base_col = matrix.column_index("base").unwrap();
        for row in 0..matrix.n_instances() {
            assert_eq!(matrix.get(row, base_col), Some(0.0));
        }
    }

    #[test]
    fn test_delta_values_and_ordering() {
        let records = vec![
            record("i2", "c1", 25.0),
            record("i2", "base", 20.0),
            record("i1", "base", 10.0),
            record("i1", "c1", 8.0),
        ];
        let matrix = DeltaMatrix::from_records(&records, "base").unwrap();
        // Rows keep first-seen order, columns sort lexicographically.
        assert_eq!(matrix.instances(), &["i2".to_string(), "i1".to_string()]);
        assert_eq!(matrix.configs(), &["base".to_string(), "c1".to_string()]);
        let c1 = matrix.column_index("c1").unwrap();
        assert!((matrix.get(0, c1).unwrap() - (-0.25)).abs() < 1e-12);
        assert!((matrix.get(1, c1).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_instances_without_baseline_are_dropped() {
        let records = vec![
            record("i1", "base", 10.0),
            record("i1", "c1", 5.0),
            record("i2", "c1", 7.0),
        ];
        let matrix = DeltaMatrix::from_records(&records, "base").unwrap();
        assert_eq!(matrix.instances(), &["i1".to_string()]);
    }

    #[test]
    fn test_duplicate_measurements_average() {
        let records = vec![
            record("i1", "base", 10.0),
            record("i1", "c1", 8.0),
            record("i1", "c1", 4.0),
        ];
        let matrix = DeltaMatrix::from_records(&records, "base").unwrap();
        let c1 = matrix.column_index("c1").unwrap();
        // deltas 0.2 and 0.6 average to 0.4
        assert!((matrix.get(0, c1).unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_extreme_delta_is_clipped() {
        let records = vec![record("i1", "base", 1.0), record("i1", "slow", 100.0)];
        let matrix = DeltaMatrix::from_records(&records, "base").unwrap();
        let slow = matrix.column_index("slow").unwrap();
        assert_eq!(matrix.get(0, slow), Some(-DELTA_CLIP));
    }

    #[test]
    fn test_no_baseline_anywhere_is_coverage_error() {
        let records = vec![record("i1", "c1", 5.0)];
        let err = DeltaMatrix::from_records(&records, "base").unwrap_err();
        assert!(matches!(err, Error::Coverage { .. }));
    }

    #[test]
    fn test_missing_cell_stays_empty() {
        let records = vec![
            record("i1", "base", 10.0),
            record("i2", "base", 10.0),
            record("i1", "c1", 5.0),
        ];
        let matrix = DeltaMatrix::from_records(&records, "base").unwrap();
        let c1 = matrix.column_index("c1").unwrap();
        assert!(matrix.get(0, c1).is_some());
        assert!(matrix.get(1, c1).is_none());
    }

    #[test]
    fn test_write_csv_shape() {
        let records = vec![record("i1", "base", 10.0), record("i1", "c1", 8.0)];
        let matrix = DeltaMatrix::from_records(&records, "base").unwrap();
        let mut out = Vec::new();
        matrix.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("instance_name,base,c1"));
        assert!(lines.next().unwrap().starts_with("i1,0,"));
    }
}
