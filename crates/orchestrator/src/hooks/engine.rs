use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{
    ActionOutcome, ActionRegistry, ActionResult, HookAction, HookBindings, HookContext,
    HooksConfig, ScriptAction,
};
use crate::error::Result;

/// Results of one firing, in the order the actions ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FireReport {
    pub point: String,
    pub results: Vec<ActionResult>,
}

impl FireReport {
    /// The action that halted the firing, if any. It is always the last
    /// result.
    pub fn critical(&self) -> Option<&ActionResult> {
        self.results.last().filter(|r| r.outcome.is_critical())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ActionResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ActionOutcome::Warning(_)))
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub struct HookEngine {
    bindings: HookBindings,
    registry: ActionRegistry,
    config: HooksConfig,
    /// Resolved scripts directory.
    actions_dir: Option<PathBuf>,
}

impl HookEngine {
    pub fn new(bindings: HookBindings, registry: ActionRegistry) -> Self {
        Self {
            bindings,
            registry,
            config: HooksConfig::default(),
            actions_dir: None,
        }
    }

    /// Engine for a project: default bindings with the config's overrides
    /// applied, scripts resolved against `repo_root`.
    pub fn from_config(config: &HooksConfig, registry: ActionRegistry, repo_root: &Path) -> Result<Self> {
        let bindings = config.bindings()?;
        let actions_dir = config.actions_dir.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                repo_root.join(dir)
            }
        });

        Ok(Self {
            bindings,
            registry,
            config: config.clone(),
            actions_dir,
        })
    }

    /// A disabled engine: every point fires nothing.
    pub fn disabled() -> Self {
        Self::new(HookBindings::empty(), ActionRegistry::new())
    }

    pub fn bindings(&self) -> &HookBindings {
        &self.bindings
    }

    fn resolve(&self, name: &str) -> Option<Arc<dyn HookAction>> {
        if let Some(action) = self.registry.get(name) {
            return Some(action);
        }
        let script = self.actions_dir.as_ref()?.join(format!("{}.sh", name));
        if script.is_file() {
            return Some(Arc::new(ScriptAction::new(
                name,
                script,
                self.config.timeout_for(name),
            )));
        }
        None
    }

    /// Run every enabled action bound to `point`, in order.
    ///
    /// An unknown point, or a point with nothing bound, yields an empty
    /// report. Actions with no registered implementation and no script are
    /// skipped. A critical result stops the firing.
    pub async fn fire(&self, point: impl AsRef<str>, ctx: &HookContext) -> FireReport {
        let point = point.as_ref();
        let mut report = FireReport {
            point: point.to_string(),
            results: Vec::new(),
        };

        for spec in self.bindings.actions(point).iter().filter(|a| a.enabled) {
            let Some(action) = self.resolve(&spec.name) else {
                debug!(point, action = %spec.name, "No implementation for hook action, skipping");
                continue;
            };

            let outcome = action.run(ctx).await;
            match &outcome {
                ActionOutcome::Ok => debug!(point, action = %spec.name, "Hook action ok"),
                ActionOutcome::Warning(message) => {
                    warn!(point, action = %spec.name, %message, "Hook action warning")
                }
                ActionOutcome::Critical(message) => {
                    error!(point, action = %spec.name, %message, "Hook action critical")
                }
            }

            let critical = outcome.is_critical();
            report.results.push(ActionResult {
                action: spec.name.clone(),
                outcome,
            });
            if critical {
                info!(point, "Halting remaining hook actions after critical result");
                break;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::ActionSpec;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Fixed {
        name: &'static str,
        outcome: ActionOutcome,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl HookAction for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, _ctx: &HookContext) -> ActionOutcome {
            self.calls.lock().unwrap().push(self.name);
            self.outcome.clone()
        }
    }

    fn engine(
        point: &str,
        actions: &[(&'static str, ActionOutcome)],
    ) -> (HookEngine, Arc<Mutex<Vec<&'static str>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ActionRegistry::new();
        let mut specs = Vec::new();
        for (name, outcome) in actions.iter().cloned() {
            registry.register(Arc::new(Fixed {
                name,
                outcome,
                calls: calls.clone(),
            }));
            specs.push(ActionSpec::new(name));
        }
        let mut bindings = HookBindings::empty();
        bindings.set(point, specs);
        (HookEngine::new(bindings, registry), calls)
    }

    #[tokio::test]
    async fn test_unknown_point_is_empty() {
        let (engine, calls) = engine("post-task", &[("sync", ActionOutcome::Ok)]);
        let report = engine.fire("after-lunch", &HookContext::default()).await;
        assert!(report.is_empty());
        assert!(report.critical().is_none());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_warning_then_ok_continues() {
        let (engine, calls) = engine(
            "post-task",
            &[
                ("sync", ActionOutcome::Warning("remote unreachable".to_string())),
                ("commit", ActionOutcome::Ok),
            ],
        );
        let report = engine.fire("post-task", &HookContext::default()).await;
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.warnings().count(), 1);
        assert!(report.critical().is_none());
        assert_eq!(*calls.lock().unwrap(), vec!["sync", "commit"]);
    }

    #[tokio::test]
    async fn test_critical_halts_remaining() {
        let (engine, calls) = engine(
            "post-story",
            &[
                ("test", ActionOutcome::Critical("2 failing".to_string())),
                ("audit-gate", ActionOutcome::Ok),
            ],
        );
        let report = engine.fire("post-story", &HookContext::default()).await;
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.critical().unwrap().action, "test");
        assert_eq!(*calls.lock().unwrap(), vec!["test"]);
    }

    #[tokio::test]
    async fn test_disabled_and_unimplemented_actions_are_skipped() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let registry = ActionRegistry::new().with(Arc::new(Fixed {
            name: "lint",
            outcome: ActionOutcome::Ok,
            calls: calls.clone(),
        }));
        let mut bindings = HookBindings::empty();
        bindings.set(
            "pre-commit",
            vec![ActionSpec::new("unknown"), ActionSpec::disabled("lint")],
        );

        let engine = HookEngine::new(bindings, registry);
        let report = engine.fire("pre-commit", &HookContext::default()).await;
        assert!(report.is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_falls_back_to_actions_dir_script() {
        let repo = TempDir::new().unwrap();
        let hooks_dir = repo.path().join(".conductor/hooks");
        std::fs::create_dir_all(&hooks_dir).unwrap();
        std::fs::write(hooks_dir.join("lint.sh"), "exit 2\n").unwrap();

        let config = HooksConfig {
            actions_dir: Some(PathBuf::from(".conductor/hooks")),
            ..Default::default()
        };
        let engine = HookEngine::from_config(&config, ActionRegistry::new(), repo.path()).unwrap();
        let report = engine.fire("pre-commit", &HookContext::default()).await;

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.critical().unwrap().action, "lint");
    }
}
