//! Rule persistence
//!
//! JSON file storage for persistent rules and the default policy.
//! Flushes are atomic replaces: the full state is written to a sibling
//! temp file which is then renamed over the store, so a crash mid-flush
//! never corrupts previously stored rules.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::policy::PolicyConfig;
use crate::rules::{Rule, RuleSet};
use crate::PolicyError;

/// On-disk form of the persistent policy state. Temporary rules are
/// never written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredPolicy {
    #[serde(default)]
    pub config: PolicyConfig,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// File-backed rule store.
#[derive(Debug)]
pub struct RuleStore {
    path: PathBuf,
}

impl RuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the stored policy. A missing or unreadable file yields the
    /// empty default: the engine must stay decision-capable regardless
    /// of storage health.
    pub fn load(&self) -> StoredPolicy {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return StoredPolicy::default();
            }
            Err(err) => {
                tracing::warn!("could not read rule store {}: {err}", self.path.display());
                return StoredPolicy::default();
            }
        };

        match serde_json::from_str(&data) {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(
                    "corrupt rule store {}, starting empty: {err}",
                    self.path.display()
                );
                StoredPolicy::default()
            }
        }
    }

    /// Write the full persistent state, atomically replacing the store.
    pub fn flush(&self, config: &PolicyConfig, rules: &RuleSet) -> Result<(), PolicyError> {
        let stored = StoredPolicy { config: *config, rules: rules.to_rules() };
        let data = serde_json::to_string_pretty(&stored)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
