//! Configuration Registry
//!
//! Named separator configurations over a fixed toggle universe. The
//! registry is loaded once per run from a versioned artifact and passed
//! to every component that resolves configuration names; nothing mutates
//! it after load.

use std::collections::BTreeMap;
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default separator universe, in toggle-vector order.
pub const SEPARATORS: &[&str] = &[
    "gomory",
    "cmir",
    "clique",
    "flowcover",
    "zerohalf",
    "strongcg",
    "aggregation",
    "impliedbounds",
];

/// A named separator configuration: which separators run, which do not.
///
/// Frequencies above zero mean "on"; the registry binarizes them when
/// building toggle vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparatorConfig {
    /// Numeric id assigned by the collector
    pub config_id: u32,
    /// Configuration name; identity across all artifacts
    pub name: String,
    /// Per-separator frequency setting
    pub sepa_freq: BTreeMap<String, i64>,
}

impl SeparatorConfig {
    /// Whether the named separator is enabled in this configuration.
    pub fn is_on(&self, separator: &str) -> bool {
        self.sepa_freq.get(separator).copied().unwrap_or(0) > 0
    }
}

/// Registry row as it appears inside a results JSONL line.
#[derive(Debug, Deserialize)]
struct JsonlConfigRow {
    config_name: Option<String>,
    #[serde(default)]
    config_id: Option<u32>,
    #[serde(default)]
    sepa_freq: Option<BTreeMap<String, i64>>,
}

/// Immutable lookup table from configuration name to toggle map.
#[derive(Debug, Clone)]
pub struct ConfigRegistry {
    separators: Vec<String>,
    configs: Vec<SeparatorConfig>,
    by_name: FxHashMap<String, usize>,
}

impl ConfigRegistry {
    /// Build a registry over the given toggle universe.
    ///
    /// Two entries with the same name must carry the same toggle map;
    /// anything else is a compatibility error.
    pub fn new(separators: Vec<String>, configs: Vec<SeparatorConfig>) -> Result<Self> {
        let mut by_name = FxHashMap::default();
        let mut kept: Vec<SeparatorConfig> = Vec::new();
        for config in configs {
            match by_name.get(&config.name) {
                None => {
                    by_name.insert(config.name.clone(), kept.len());
                    kept.push(config);
                }
                Some(&idx) => {
                    let existing: &SeparatorConfig = &kept[idx];
                    if existing.sepa_freq != config.sepa_freq {
                        return Err(Error::Compatibility(format!(
                            "configuration '{}' appears twice with different toggle maps",
                            config.name
                        )));
                    }
                }
            }
        }
        if kept.is_empty() {
            return Err(Error::coverage(
                "registry load",
                "no configurations defined",
            ));
        }
        Ok(Self {
            separators,
            configs: kept,
            by_name,
        })
    }

    /// Load from a `configs.json` artifact (a list of configurations).
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let configs: Vec<SeparatorConfig> =
            serde_json::from_str(&content).map_err(|e| Error::parse(path, e))?;
        debug!(n = configs.len(), "loaded configuration registry");
        Self::new(default_universe(), configs)
    }

    /// Recover a registry from a results JSONL whose rows embed
    /// `config_name` and `sepa_freq`. Rows without both are skipped.
    pub fn from_results_jsonl(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut configs = Vec::new();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(row) = serde_json::from_str::<JsonlConfigRow>(line) else {
                continue;
            };
            let (Some(name), Some(sepa_freq)) = (row.config_name, row.sepa_freq) else {
                continue;
            };
            if seen.insert(name.clone()) {
                configs.push(SeparatorConfig {
                    config_id: row.config_id.unwrap_or(configs.len() as u32),
                    name,
                    sepa_freq,
                });
            }
        }
        if configs.is_empty() {
            return Err(Error::coverage(
                "registry load",
                format!(
                    "{} has no rows carrying both config_name and sepa_freq",
                    path.display()
                ),
            ));
        }
        Self::new(default_universe(), configs)
    }

    /// Load dispatching on extension: `.jsonl` → results scan, otherwise
    /// a plain `configs.json` list.
    pub fn load(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") => Self::from_results_jsonl(path),
            _ => Self::from_json_file(path),
        }
    }

    /// Toggle universe, in vector order.
    pub fn separators(&self) -> &[String] {
        &self.separators
    }

    /// Look up a configuration by name.
    pub fn get(&self, name: &str) -> Option<&SeparatorConfig> {
        self.by_name.get(name).map(|&i| &self.configs[i])
    }

    /// Look up a configuration, failing with a compatibility error that
    /// lists what the registry does contain.
    pub fn require(&self, name: &str) -> Result<&SeparatorConfig> {
        self.get(name).ok_or_else(|| {
            let mut known: Vec<&str> = self.configs.iter().map(|c| c.name.as_str()).collect();
            known.sort_unstable();
            Error::Compatibility(format!(
                "configuration '{}' not in registry; registry has {:?}",
                name, known
            ))
        })
    }

    /// Encode a configuration's toggle map as a 0/1 vector in universe order.
    pub fn toggle_vector(&self, name: &str) -> Result<Vec<u8>> {
        let config = self.require(name)?;
        Ok(self
            .separators
            .iter()
            .map(|s| u8::from(config.is_on(s)))
            .collect())
    }

    /// Decode a 0/1 vector back into a toggle map in universe order.
    pub fn decode_toggles(&self, vector: &[u8]) -> Result<BTreeMap<String, i64>> {
        if vector.len() != self.separators.len() {
            return Err(Error::Compatibility(format!(
                "toggle vector has {} entries, universe has {}",
                vector.len(),
                self.separators.len()
            )));
        }
        Ok(self
            .separators
            .iter()
            .zip(vector)
            .map(|(s, &v)| (s.clone(), i64::from(v > 0)))
            .collect())
    }

    /// Configuration names in registry order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.iter().map(|c| c.name.as_str())
    }

    /// Number of configurations.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Whether the registry is empty (never true after construction).
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

fn default_universe() -> Vec<String> {
    SEPARATORS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: u32, name: &str, on: &[&str]) -> SeparatorConfig {
        let sepa_freq = SEPARATORS
            .iter()
            .map(|s| (s.to_string(), i64::from(on.contains(s))))
            .collect();
        SeparatorConfig {
            config_id: id,
            name: name.to_string(),
            sepa_freq,
        }
    }

    fn registry() -> ConfigRegistry {
        ConfigRegistry::new(
            default_universe(),
            vec![
                config(0, "all_on", SEPARATORS),
                config(1, "all_off", &[]),
                config(2, "gomory_cmir", &["gomory", "cmir"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_require_unknown_is_compatibility_error() {
        let reg = registry();
        let err = reg.require("no_such_config").unwrap_err();
        assert!(matches!(err, Error::Compatibility(_)));
        assert!(err.to_string().contains("all_off"));
    }

    #[test]
    fn test_toggle_vector_universe_order() {
        let reg = registry();
        let vec = reg.toggle_vector("gomory_cmir").unwrap();
        assert_eq!(vec, vec![1, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_toggle_roundtrip_all_off_all_on() {
        let reg = registry();
        for name in ["all_on", "all_off"] {
            let vec = reg.toggle_vector(name).unwrap();
            let decoded = reg.decode_toggles(&vec).unwrap();
            assert_eq!(decoded, reg.get(name).unwrap().sepa_freq);
        }
    }

    #[test]
    fn test_duplicate_name_same_map_is_deduplicated() {
        let reg = ConfigRegistry::new(
            default_universe(),
            vec![config(0, "all_off", &[]), config(0, "all_off", &[])],
        )
        .unwrap();
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_duplicate_name_conflicting_map_rejected() {
        let result = ConfigRegistry::new(
            default_universe(),
            vec![config(0, "x", &[]), config(1, "x", &["gomory"])],
        );
        assert!(matches!(result, Err(Error::Compatibility(_))));
    }

    #[test]
    fn test_from_results_jsonl_skips_rows_without_toggles() {
        let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        use std::io::Write;
        writeln!(
            file,
            r#"{{"instance_name":"uc_1","config_name":"clique_only","solve_time_sec":1.0,"sepa_freq":{{"clique":1}}}}"#
        )
        .unwrap();
        writeln!(file, r#"{{"instance_name":"uc_1","solve_time_sec":2.0}}"#).unwrap();
        file.flush().unwrap();

        let reg = ConfigRegistry::from_results_jsonl(file.path()).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(
            reg.toggle_vector("clique_only").unwrap(),
            vec![0, 0, 1, 0, 0, 0, 0, 0]
        );
    }
}
