//! External SCIP Invocation
//!
//! Each measurement shells out to the SCIP binary with the separator
//! toggles applied as `separating/<name>/freq` settings and a wall-clock
//! limit via `limits/time`. The time limit is the only cancellation
//! mechanism; a time-limited solve still yields a valid measurement.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::debug;

use sepsel_core::ConfigRegistry;

/// Metrics from one solver run.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    /// Solver-reported solving time; wall time when SCIP did not print one
    pub solve_time_sec: f64,
    /// Wall-clock time of the whole invocation
    pub wall_time_sec: f64,
    /// Solver status line
    pub status: String,
    /// Branch-and-bound node count, when printed
    pub nodes: Option<i64>,
}

/// Locates and drives the SCIP binary.
#[derive(Debug, Clone)]
pub struct ScipRunner {
    binary: PathBuf,
}

impl ScipRunner {
    /// Find a usable SCIP binary: the explicit path if given, otherwise
    /// the first of the common install locations that answers
    /// `--version`.
    pub fn locate(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(binary) = explicit {
            return Ok(Self { binary });
        }
        let candidates = [
            "scip",
            "/usr/local/bin/scip",
            "/usr/bin/scip",
            "/opt/scip/bin/scip",
        ];
        for candidate in candidates {
            if Command::new(candidate).arg("--version").output().is_ok() {
                debug!(binary = candidate, "found SCIP");
                return Ok(Self {
                    binary: PathBuf::from(candidate),
                });
            }
        }
        bail!("SCIP not found; install it or pass --scip-bin")
    }

    /// Solve one instance under one configuration, blocking until the
    /// solver finishes or hits its own time limit.
    pub fn solve(
        &self,
        problem: &Path,
        registry: &ConfigRegistry,
        config_name: &str,
        time_limit_sec: f64,
    ) -> Result<SolveOutcome> {
        let toggles = registry.toggle_vector(config_name)?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-c").arg(format!("set limits time {time_limit_sec}"));
        for (separator, &on) in registry.separators().iter().zip(&toggles) {
            cmd.arg("-c")
                .arg(format!("set separating {separator} freq {}", i32::from(on > 0)));
        }
        cmd.arg("-c").arg(format!("read {}", problem.display()));
        cmd.arg("-c").arg("optimize");
        cmd.arg("-c").arg("quit");

        debug!(problem = %problem.display(), config = config_name, "invoking SCIP");
        let start = Instant::now();
        let output = cmd
            .output()
            .with_context(|| format!("failed to execute {}", self.binary.display()))?;
        let wall_time_sec = start.elapsed().as_secs_f64();

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "SCIP exited with {:?} on {}: {}",
                output.status.code(),
                problem.display(),
                stderr.trim()
            );
        }

        Ok(SolveOutcome {
            solve_time_sec: parse_solve_time(&stdout).unwrap_or(wall_time_sec),
            wall_time_sec,
            status: parse_status(&stdout).unwrap_or_else(|| "unknown".to_string()),
            nodes: parse_nodes(&stdout),
        })
    }
}

/// Value after the colon on the first line starting with `prefix`.
fn field_after_colon<'a>(stdout: &'a str, prefix: &str) -> Option<&'a str> {
    stdout
        .lines()
        .find(|line| line.trim_start().starts_with(prefix))
        .and_then(|line| line.split_once(':'))
        .map(|(_, rest)| rest.trim())
}

fn parse_solve_time(stdout: &str) -> Option<f64> {
    field_after_colon(stdout, "Solving Time (sec)")?.parse().ok()
}

fn parse_status(stdout: &str) -> Option<String> {
    field_after_colon(stdout, "SCIP Status").map(|s| s.to_string())
}

fn parse_nodes(stdout: &str) -> Option<i64> {
    field_after_colon(stdout, "Solving Nodes")?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCIP_OUTPUT: &str = "\
SCIP version 9.2.0 [precision: 8 byte]
read problem </tmp/uc_1.lp>
presolving (3 rounds)
SCIP Status        : problem is solved [optimal solution found]
Solving Time (sec) : 12.43
Solving Nodes      : 57 (total of 57 nodes in 1 runs)
Primal Bound       : +1.01500000000000e+02
";

    #[test]
    fn test_parse_solve_time() {
        assert_eq!(parse_solve_time(SCIP_OUTPUT), Some(12.43));
        assert_eq!(parse_solve_time("no stats here"), None);
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(
            parse_status(SCIP_OUTPUT).as_deref(),
            Some("problem is solved [optimal solution found]")
        );
    }

    #[test]
    fn test_parse_nodes_strips_annotation() {
        assert_eq!(parse_nodes(SCIP_OUTPUT), Some(57));
    }

    #[test]
    fn test_time_limit_status_is_still_parsed() {
        let out = "SCIP Status        : solving was interrupted [time limit reached]\n\
                   Solving Time (sec) : 300.00\n";
        assert_eq!(parse_solve_time(out), Some(300.0));
        assert!(parse_status(out).unwrap().contains("time limit"));
    }
}
