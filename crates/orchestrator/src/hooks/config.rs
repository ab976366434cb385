use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use super::HookPoint;
use crate::error::{OrchestratorError, Result};

/// Action names double as script file names, so they are kept to a
/// conservative alphabet.
fn action_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").expect("Invalid action name pattern")
    })
}

pub fn is_valid_action_name(name: &str) -> bool {
    action_name_pattern().is_match(name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ActionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }

    pub fn disabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMode {
    Replace,
    #[default]
    Append,
}

/// Project-level change to one point's action list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookOverride {
    pub point: String,
    #[serde(default)]
    pub mode: OverrideMode,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub remove: Vec<String>,
}

/// `[hooks]` section of the project config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Directory searched for `<name>.sh` when no action is registered
    /// under a name. Relative to the repository root.
    pub actions_dir: Option<PathBuf>,
    /// Per-action timeout overrides in seconds.
    pub timeouts: HashMap<String, u64>,
    pub overrides: Vec<HookOverride>,
}

impl HooksConfig {
    pub fn timeout_for(&self, action: &str) -> Duration {
        let secs = self
            .timeouts
            .get(action)
            .copied()
            .unwrap_or_else(|| default_timeout_secs(action));
        Duration::from_secs(secs)
    }

    pub fn bindings(&self) -> Result<HookBindings> {
        let mut bindings = HookBindings::defaults();
        for o in &self.overrides {
            bindings.apply(o)?;
        }
        Ok(bindings)
    }
}

pub fn default_timeout_secs(action: &str) -> u64 {
    match action {
        "test" => 120,
        "audit-gate" | "lint" => 60,
        "verify-clean" | "check-blockers" | "suggest-skills" | "detect-spike" => 10,
        "capture-knowledge" | "session-summary" => 15,
        _ => 30,
    }
}

/// Ordered action lists keyed by point name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookBindings {
    points: BTreeMap<String, Vec<ActionSpec>>,
}

impl HookBindings {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn defaults() -> Self {
        let table: [(HookPoint, &[&str]); 8] = [
            (HookPoint::PreSession, &["verify-clean"]),
            (HookPoint::PostSession, &["sync", "session-summary"]),
            (HookPoint::PreTask, &["check-blockers", "suggest-skills"]),
            (
                HookPoint::PostTask,
                &["sync", "commit", "detect-spike", "capture-knowledge"],
            ),
            (HookPoint::PostStory, &["test", "audit-gate"]),
            (HookPoint::PostEpic, &["audit-gate"]),
            (HookPoint::OnBlocker, &[]),
            (HookPoint::PreCommit, &["lint"]),
        ];

        let points = table
            .into_iter()
            .map(|(point, names)| {
                (
                    point.as_str().to_string(),
                    names.iter().map(|n| ActionSpec::new(*n)).collect(),
                )
            })
            .collect();
        Self { points }
    }

    pub fn set(&mut self, point: impl Into<String>, actions: Vec<ActionSpec>) {
        self.points.insert(point.into(), actions);
    }

    /// Configured actions for `point` in order, including disabled ones.
    pub fn actions(&self, point: &str) -> &[ActionSpec] {
        self.points.get(point).map_or(&[], Vec::as_slice)
    }

    pub fn points(&self) -> impl Iterator<Item = &str> {
        self.points.keys().map(String::as_str)
    }

    /// Apply one override. `append` updates an existing entry's `enabled`
    /// flag in place instead of adding a duplicate; only `remove` drops
    /// actions.
    pub fn apply(&mut self, o: &HookOverride) -> Result<()> {
        let named = o.actions.iter().map(|a| a.name.as_str());
        for name in named.chain(o.remove.iter().map(String::as_str)) {
            if !is_valid_action_name(name) {
                return Err(OrchestratorError::Config(format!(
                    "invalid hook action name '{}' for point {}",
                    name, o.point
                )));
            }
        }

        let list = self.points.entry(o.point.clone()).or_default();
        match o.mode {
            OverrideMode::Replace => *list = o.actions.clone(),
            OverrideMode::Append => {
                for spec in &o.actions {
                    match list.iter_mut().find(|a| a.name == spec.name) {
                        Some(existing) => existing.enabled = spec.enabled,
                        None => list.push(spec.clone()),
                    }
                }
            }
        }
        list.retain(|a| !o.remove.contains(&a.name));
        Ok(())
    }
}
