//! `eval-online` stage: live policy evaluation.
//!
//! For each sampled instance: standardize features, predict an action,
//! resolve both toggle vectors from the registry, then run the solver
//! once under the baseline and once under the prediction. Rows are
//! flushed as they complete so an interrupted run leaves a valid prefix.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{info, warn};

use sepsel_core::{ConfigRegistry, FeatureStore, normalize_instance_name};
use sepsel_ml::Policy;

use crate::solver::ScipRunner;

#[derive(Debug, Args)]
pub struct EvalOnlineArgs {
    /// Instance manifest (manifest.json)
    #[arg(long)]
    pub manifest: PathBuf,

    /// Feature store artifact (features.json)
    #[arg(long)]
    pub features: PathBuf,

    /// Trained policy artifact (policy.json)
    #[arg(long)]
    pub policy: PathBuf,

    /// Configuration registry (configs.json or results.jsonl)
    #[arg(long)]
    pub registry: PathBuf,

    /// Baseline configuration name
    #[arg(long)]
    pub baseline: String,

    /// Override the class list (comma-separated, training order)
    #[arg(long, value_delimiter = ',')]
    pub classes: Option<Vec<String>>,

    /// Number of instances to sample
    #[arg(long, default_value_t = 20)]
    pub n: usize,

    /// Time limit per solve, in seconds
    #[arg(long, default_value_t = 300.0)]
    pub time_limit: f64,

    /// Random seed for pool sampling
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Output directory
    #[arg(long)]
    pub out_dir: PathBuf,

    /// Explicit path to the SCIP binary
    #[arg(long)]
    pub scip_bin: Option<PathBuf>,
}

/// One instance drawn from the manifest.
#[derive(Debug, Clone)]
struct PoolEntry {
    instance: String,
    lp_path: PathBuf,
}

/// Per-instance evaluation row, appended and flushed as it completes.
#[derive(Debug, Serialize)]
struct OnlineEvalRow {
    instance_name: String,
    lp_path: String,
    baseline_config: String,
    pred_config: String,
    pred_conf: f64,
    baseline_time_sec: f64,
    pred_time_sec: f64,
    delta: f64,
    baseline_status: String,
    pred_status: String,
    baseline_nodes: Option<i64>,
    pred_nodes: Option<i64>,
}

#[derive(Debug, Serialize)]
struct OnlineEvalSummary {
    n: usize,
    baseline_config: String,
    classes: Vec<String>,
    time_limit: f64,
    mean_delta: Option<f64>,
    median_delta: Option<f64>,
    positive_delta_fraction: Option<f64>,
}

/// Parse manifest.json: either a list of entries or `{"instances": [...]}`.
/// Each entry names an LP file and, optionally, an instance identifier;
/// entries without an LP path are skipped.
fn load_manifest(path: &Path) -> Result<Vec<PoolEntry>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    let entries = match &value {
        serde_json::Value::Array(list) => list.as_slice(),
        serde_json::Value::Object(map) => match map.get("instances") {
            Some(serde_json::Value::Array(list)) => list.as_slice(),
            _ => bail!(
                "{} must be a list or an object with an 'instances' list",
                path.display()
            ),
        },
        _ => bail!(
            "{} must be a list or an object with an 'instances' list",
            path.display()
        ),
    };

    let str_field = |entry: &serde_json::Value, keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| entry.get(k).and_then(|v| v.as_str()).map(|s| s.to_string()))
    };

    let mut pool = Vec::new();
    for entry in entries {
        let Some(lp) = str_field(entry, &["lp", "lp_path", "path", "file"]) else {
            continue;
        };
        let raw_name = str_field(entry, &["instance_name", "name", "case"]).unwrap_or_else(|| lp.clone());
        pool.push(PoolEntry {
            instance: normalize_instance_name(&raw_name),
            lp_path: PathBuf::from(lp),
        });
    }
    if pool.is_empty() {
        bail!("{} contains no usable instance entries", path.display());
    }
    Ok(pool)
}

/// Predict an action for standardized features and resolve it against
/// the registry. An unknown predicted class fails here, before any
/// solver call.
fn predict_action(
    policy: &Policy,
    registry: &ConfigRegistry,
    features_std: &[f64],
) -> Result<(String, f64)> {
    let pred = policy.predict(features_std)?;
    registry.require(&pred.value)?;
    Ok((pred.value, pred.confidence))
}

pub fn run(args: EvalOnlineArgs) -> Result<()> {
    let store = FeatureStore::from_json_file(&args.features)?;
    let mut policy = Policy::load(&args.policy)?;
    if let Some(classes) = &args.classes {
        if classes.len() != policy.model.n_classes() {
            bail!(
                "{} classes supplied but the loaded weights have {} output units",
                classes.len(),
                policy.model.n_classes()
            );
        }
        policy.classes = classes.clone();
    }
    let registry = ConfigRegistry::load(&args.registry)?;
    registry.require(&args.baseline)?;

    // Training-time stats win; fall back to the loaded store.
    let stats = match policy.stats.clone() {
        Some(stats) => stats,
        None => {
            warn!("policy carries no normalization stats, recomputing from the feature store");
            store.stats()
        }
    };

    let mut pool: Vec<PoolEntry> = load_manifest(&args.manifest)?
        .into_iter()
        .filter(|e| store.get(&e.instance).is_some())
        .collect();
    if pool.is_empty() {
        bail!("no manifest entry matched the feature store after normalization");
    }
    let mut rng = StdRng::seed_from_u64(args.seed);
    pool.shuffle(&mut rng);
    pool.truncate(args.n.min(pool.len()));
    info!(pool = pool.len(), "sampled evaluation pool");

    let runner = ScipRunner::locate(args.scip_bin.clone())?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let rows_path = args.out_dir.join("online_eval_rows.csv");
    let mut writer = csv::Writer::from_path(&rows_path)
        .with_context(|| format!("creating {}", rows_path.display()))?;

    let mut deltas = Vec::with_capacity(pool.len());
    for entry in &pool {
        let features = store
            .get(&entry.instance)
            .expect("pool was filtered against the store");
        let features_std = stats.apply(features);
        let (pred_config, pred_conf) = predict_action(&policy, &registry, &features_std)?;

        let base = runner.solve(&entry.lp_path, &registry, &args.baseline, args.time_limit)?;
        let pred = runner.solve(&entry.lp_path, &registry, &pred_config, args.time_limit)?;

        let delta = (base.solve_time_sec - pred.solve_time_sec) / base.solve_time_sec.max(1e-9);
        deltas.push(delta);

        info!(
            instance = %entry.instance,
            pred = %pred_config,
            conf = pred_conf,
            t_base = base.solve_time_sec,
            t_pred = pred.solve_time_sec,
            delta,
            "evaluated instance"
        );
        writer.serialize(OnlineEvalRow {
            instance_name: entry.instance.clone(),
            lp_path: entry.lp_path.display().to_string(),
            baseline_config: args.baseline.clone(),
            pred_config,
            pred_conf,
            baseline_time_sec: base.solve_time_sec,
            pred_time_sec: pred.solve_time_sec,
            delta,
            baseline_status: base.status,
            pred_status: pred.status,
            baseline_nodes: base.nodes,
            pred_nodes: pred.nodes,
        })?;
        writer.flush()?;
    }

    deltas.sort_by(|a, b| a.partial_cmp(b).expect("deltas are finite"));
    let summary = OnlineEvalSummary {
        n: deltas.len(),
        baseline_config: args.baseline.clone(),
        classes: policy.classes.clone(),
        time_limit: args.time_limit,
        mean_delta: (!deltas.is_empty())
            .then(|| deltas.iter().sum::<f64>() / deltas.len() as f64),
        median_delta: match deltas.len() {
            0 => None,
            n if n % 2 == 1 => Some(deltas[n / 2]),
            n => Some((deltas[n / 2 - 1] + deltas[n / 2]) / 2.0),
        },
        positive_delta_fraction: (!deltas.is_empty())
            .then(|| deltas.iter().filter(|&&d| d > 0.0).count() as f64 / deltas.len() as f64),
    };
    let summary_path = args.out_dir.join("online_eval_summary.json");
    let summary_json = serde_json::to_string_pretty(&summary)?;
    fs::write(&summary_path, &summary_json)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    println!("Wrote:");
    println!("  {}", rows_path.display());
    println!("  {}", summary_path.display());
    println!("\n{summary_json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sepsel_core::SeparatorConfig;
    use sepsel_ml::{MlpClassifier, MlpConfig};
    use std::collections::BTreeMap;
    use std::io::Write;

    fn tiny_policy(classes: &[&str]) -> Policy {
        let mut rng = StdRng::seed_from_u64(0);
        let model = MlpClassifier::new(
            MlpConfig {
                input_dim: 2,
                hidden: 4,
                depth: 1,
                n_classes: classes.len(),
                learning_rate: 0.01,
            },
            &mut rng,
        )
        .unwrap();
        Policy {
            model,
            classes: classes.iter().map(|s| s.to_string()).collect(),
            stats: None,
        }
    }

    fn registry_of(names: &[&str]) -> ConfigRegistry {
        let configs = names
            .iter()
            .enumerate()
            .map(|(i, name)| SeparatorConfig {
                config_id: i as u32,
                name: name.to_string(),
                sepa_freq: BTreeMap::new(),
            })
            .collect();
        ConfigRegistry::new(vec!["gomory".to_string()], configs).unwrap()
    }

    #[test]
    fn test_predicted_class_missing_from_registry_fails_before_solving() {
        let policy = tiny_policy(&["cfg_a", "cfg_b"]);
        // Registry knows neither class, so whatever the net predicts
        // must fail at resolution time.
        let registry = registry_of(&["all_off"]);
        let err = predict_action(&policy, &registry, &[0.1, 0.2]).unwrap_err();
        assert!(err.to_string().contains("not in registry"));
    }

    #[test]
    fn test_predict_action_resolves_known_class() {
        let policy = tiny_policy(&["cfg_a", "cfg_b"]);
        let registry = registry_of(&["cfg_a", "cfg_b"]);
        let (name, conf) = predict_action(&policy, &registry, &[0.1, 0.2]).unwrap();
        assert!(policy.classes.contains(&name));
        assert!(conf > 0.0);
    }

    #[test]
    fn test_load_manifest_list_and_wrapped_forms() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"[{{"lp": "inst/uc_1.lp", "sidecar": "inst/uc_1.minud.json"}},
                {{"path": "inst/uc_2.lp", "name": "uc_2"}},
                {{"sidecar": "orphan.json"}}]"#
        )
        .unwrap();
        file.flush().unwrap();
        let pool = load_manifest(file.path()).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[0].instance, "uc_1");
        assert_eq!(pool[1].instance, "uc_2");

        let mut wrapped = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(wrapped, r#"{{"instances": [{{"lp": "a/uc_9.lp"}}]}}"#).unwrap();
        wrapped.flush().unwrap();
        let pool = load_manifest(wrapped.path()).unwrap();
        assert_eq!(pool[0].instance, "uc_9");
    }

    #[test]
    fn test_load_manifest_rejects_non_list() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"not_instances": []}}"#).unwrap();
        file.flush().unwrap();
        assert!(load_manifest(file.path()).is_err());
    }
}
