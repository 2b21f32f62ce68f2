//! Runtime configuration.
//!
//! Layered the usual way: built-in defaults, then an optional JSON file
//! deep-merged on top, then `STRAND_*` environment overrides. Unknown file
//! keys are ignored rather than rejected so older configs keep loading.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, RuntimeError};

/// Compaction tuning carried in the config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompactionSettings {
    /// Fraction of the context limit that triggers a recommendation.
    pub threshold: f64,
    /// Recent turns preserved verbatim through compaction.
    pub preserve_recent_turns: usize,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            threshold: 0.70,
            preserve_recent_turns: 3,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Default model for new sessions.
    pub model: String,
    /// Context window size of that model, in tokens.
    pub context_limit: u64,
    /// Hard bound on turns per run.
    pub max_turns: u64,
    /// Database file path; `None` means in-memory.
    pub database_path: Option<String>,
    /// Compaction tuning.
    pub compaction: CompactionSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4".into(),
            context_limit: 200_000,
            max_turns: 50,
            database_path: None,
            compaction: CompactionSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration: defaults ← optional file ← `STRAND_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())
            .map_err(|e| RuntimeError::Config(e.to_string()))?;

        if let Some(path) = path {
            if path.exists() {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| RuntimeError::Config(format!("{}: {e}", path.display())))?;
                let overlay: Value = serde_json::from_str(&raw)
                    .map_err(|e| RuntimeError::Config(format!("{}: {e}", path.display())))?;
                deep_merge(&mut merged, overlay);
                debug!(path = %path.display(), "config file merged");
            }
        }

        apply_env_overrides(&mut merged, |key| std::env::var(key).ok());

        serde_json::from_value(merged).map_err(|e| RuntimeError::Config(e.to_string()))
    }
}

/// Recursively merge `overlay` into `base`. Objects merge key-by-key;
/// everything else replaces.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        let _ = base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply `STRAND_*` environment overrides onto a merged config value.
///
/// The lookup is injected so tests can override without touching process
/// environment.
fn apply_env_overrides(value: &mut Value, lookup: impl Fn(&str) -> Option<String>) {
    let Some(map) = value.as_object_mut() else {
        return;
    };

    if let Some(model) = lookup("STRAND_MODEL") {
        let _ = map.insert("model".into(), Value::String(model));
    }
    if let Some(path) = lookup("STRAND_DATABASE_PATH") {
        let _ = map.insert("databasePath".into(), Value::String(path));
    }
    if let Some(limit) = lookup("STRAND_CONTEXT_LIMIT").and_then(|v| v.parse::<u64>().ok()) {
        let _ = map.insert("contextLimit".into(), Value::from(limit));
    }
    if let Some(turns) = lookup("STRAND_MAX_TURNS").and_then(|v| v.parse::<u64>().ok()) {
        let _ = map.insert("maxTurns".into(), Value::from(turns));
    }
    if let Some(threshold) = lookup("STRAND_COMPACTION_THRESHOLD").and_then(|v| v.parse::<f64>().ok())
    {
        if let Some(compaction) = map.get_mut("compaction").and_then(Value::as_object_mut) {
            let _ = compaction.insert("threshold".into(), Value::from(threshold));
        }
    }
}
