//! Timing Traces
//!
//! One record per (instance, configuration) solve. Traces arrive either
//! as CSV written by an external collector or as JSONL; CSV headers vary
//! between producers, so required fields are resolved through fixed,
//! ordered candidate lists rather than guessed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A single solve-time measurement, immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingRecord {
    /// Instance identifier (raw, as the producer wrote it)
    pub instance_name: String,
    /// Configuration name the solve ran under
    pub config_name: String,
    /// Solver-reported solve time in seconds
    pub solve_time_sec: f64,
    /// Wall-clock time, when the producer recorded it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_time_sec: Option<f64>,
    /// Solver status string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Objective value, when a solution was found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj: Option<f64>,
    /// Branch-and-bound node count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<i64>,
    /// LP iteration count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lp_iterations: Option<i64>,
}

/// Candidate column names for the instance identifier, tried in order.
pub const INSTANCE_COLUMNS: &[&str] = &[
    "instance_name",
    "instance",
    "instance_id",
    "case",
    "name",
    "lp_path",
    "mps_path",
    "problem",
];

/// Candidate column names for the configuration, tried in order.
pub const CONFIG_COLUMNS: &[&str] =
    &["config_name", "config", "config_id", "action", "arm", "policy"];

/// Candidate column names for the solve time, tried in order.
pub const TIME_COLUMNS: &[&str] = &[
    "solve_time_sec",
    "wall_time_sec",
    "solve_time",
    "solving_time",
    "time",
    "seconds",
    "scip_time",
    "our_time",
];

/// Candidate column names for the (optional) status, tried in order.
pub const STATUS_COLUMNS: &[&str] = &["status", "scip_status", "result"];

/// Candidate column names for the instance identifier in prediction files.
pub const PRED_INSTANCE_COLUMNS: &[&str] = &["instance", "instance_name", "case", "name"];

/// Candidate column names for the predicted configuration.
pub const PRED_CONFIG_COLUMNS: &[&str] =
    &["pred_config", "pred", "y_pred", "config_name", "action"];

/// Resolve a required column to its index by trying `candidates` in order.
pub fn resolve_column(
    headers: &[String],
    candidates: &'static [&'static str],
    artifact: &'static str,
    field: &'static str,
) -> Result<usize> {
    resolve_optional_column(headers, candidates).ok_or_else(|| Error::Schema {
        artifact,
        field,
        candidates: candidates.to_vec(),
        found: headers.to_vec(),
    })
}

/// Resolve an optional column, `None` when no candidate is present.
pub fn resolve_optional_column(
    headers: &[String],
    candidates: &'static [&'static str],
) -> Option<usize> {
    candidates
        .iter()
        .find_map(|c| headers.iter().position(|h| h == c))
}

/// Strip path components and known file-extension suffixes so identifiers
/// from different producers join. Longest suffix wins, so compound
/// extensions strip whole.
pub fn normalize_instance_name(raw: &str) -> String {
    let s = raw.replace('\\', "/");
    let s = s.rsplit('/').next().unwrap_or(s.as_str());
    const SUFFIXES: &[&str] = &[
        ".minud.json",
        ".proto.lp",
        ".mps.gz",
        ".lp",
        ".mps",
        ".gz",
        ".json",
        ".minud",
    ];
    for suffix in SUFFIXES {
        if let Some(stem) = s.strip_suffix(suffix) {
            return stem.to_string();
        }
    }
    s.to_string()
}

/// Read a timing trace, dispatching on the file extension
/// (`.jsonl`/`.json` → JSONL, anything else → CSV).
pub fn read_trace(path: &Path) -> Result<Vec<TimingRecord>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") | Some("json") => read_trace_jsonl(path),
        _ => read_trace_csv(path).map(|(records, _)| records),
    }
}

/// Read a CSV timing trace. Returns the records together with the name of
/// the column the solve time was taken from. Rows whose time cell does not
/// parse as a number are skipped as per-row gaps, not errors.
pub fn read_trace_csv(path: &Path) -> Result<(Vec<TimingRecord>, String)> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| Error::parse(path, e))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::parse(path, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let inst_idx = resolve_column(&headers, INSTANCE_COLUMNS, "timing trace", "instance")?;
    let cfg_idx = resolve_column(&headers, CONFIG_COLUMNS, "timing trace", "config")?;
    let time_idx = resolve_column(&headers, TIME_COLUMNS, "timing trace", "time")?;
    let status_idx = resolve_optional_column(&headers, STATUS_COLUMNS);
    let time_column = headers[time_idx].clone();
    debug!(
        instance = %headers[inst_idx],
        config = %headers[cfg_idx],
        time = %time_column,
        "resolved trace columns"
    );

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for row in reader.records() {
        let row = row.map_err(|e| Error::parse(path, e))?;
        let time = row.get(time_idx).and_then(|s| s.trim().parse::<f64>().ok());
        let Some(solve_time_sec) = time else {
            skipped += 1;
            continue;
        };
        records.push(TimingRecord {
            instance_name: row.get(inst_idx).unwrap_or_default().to_string(),
            config_name: row.get(cfg_idx).unwrap_or_default().to_string(),
            solve_time_sec,
            wall_time_sec: None,
            status: status_idx
                .and_then(|i| row.get(i))
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            obj: None,
            nodes: None,
            lp_iterations: None,
        });
    }
    if skipped > 0 {
        warn!(skipped, "trace rows without a numeric time were dropped");
    }
    Ok((records, time_column))
}

/// Read a JSONL timing trace (one record per line, blank lines ignored).
pub fn read_trace_jsonl(path: &Path) -> Result<Vec<TimingRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let mut records = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: TimingRecord = serde_json::from_str(line)
            .map_err(|e| Error::parse(path, format!("line {}: {}", lineno + 1, e)))?;
        records.push(record);
    }
    if records.is_empty() {
        return Err(Error::coverage(
            "trace load",
            format!("{} contains no records", path.display()),
        ));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_normalize_strips_path_and_suffix() {
        assert_eq!(normalize_instance_name("data/uc_0001.lp"), "uc_0001");
        assert_eq!(normalize_instance_name("C:\\inst\\uc_7.mps"), "uc_7");
        assert_eq!(normalize_instance_name("uc_3"), "uc_3");
    }

    #[test]
    fn test_normalize_compound_suffix_strips_whole() {
        assert_eq!(normalize_instance_name("uc_2.mps.gz"), "uc_2");
        assert_eq!(normalize_instance_name("uc_2.minud.json"), "uc_2");
    }

    #[test]
    fn test_resolve_column_priority_order() {
        let headers = vec!["wall_time_sec".to_string(), "solve_time_sec".to_string()];
        let idx = resolve_column(&headers, TIME_COLUMNS, "timing trace", "time").unwrap();
        // solve_time_sec is earlier in the candidate list even though
        // wall_time_sec appears first in the file
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_resolve_column_missing_is_schema_error() {
        let headers = vec!["foo".to_string()];
        let err = resolve_column(&headers, CONFIG_COLUMNS, "timing trace", "config").unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
        assert!(err.to_string().contains("config_name"));
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn test_read_trace_csv_with_alias_headers() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "case,action,seconds,result").unwrap();
        writeln!(file, "uc_1.lp,all_on,12.5,optimal").unwrap();
        writeln!(file, "uc_1.lp,all_off,not_a_number,optimal").unwrap();
        file.flush().unwrap();

        let (records, time_col) = read_trace_csv(file.path()).unwrap();
        assert_eq!(time_col, "seconds");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].instance_name, "uc_1.lp");
        assert_eq!(records[0].config_name, "all_on");
        assert_eq!(records[0].status.as_deref(), Some("optimal"));
    }

    #[test]
    fn test_read_trace_jsonl_roundtrip() {
        let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        let record = TimingRecord {
            instance_name: "uc_9".into(),
            config_name: "gomory_cmir".into(),
            solve_time_sec: 3.25,
            wall_time_sec: Some(3.3),
            status: Some("optimal".into()),
            obj: Some(101.5),
            nodes: Some(17),
            lp_iterations: None,
        };
        writeln!(file, "{}", serde_json::to_string(&record).unwrap()).unwrap();
        writeln!(file).unwrap();
        file.flush().unwrap();

        let records = read_trace_jsonl(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].config_name, "gomory_cmir");
        assert_eq!(records[0].nodes, Some(17));
    }
}
