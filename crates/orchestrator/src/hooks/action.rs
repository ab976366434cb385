use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{ActionOutcome, HookContext};

/// A named capability a hook point can run.
#[async_trait]
pub trait HookAction: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &HookContext) -> ActionOutcome;
}

/// Actions registered at runtime, looked up by name when a point fires.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn HookAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` under its own name, replacing any previous entry.
    pub fn register(&mut self, action: Arc<dyn HookAction>) {
        self.actions.insert(action.name().to_string(), action);
    }

    pub fn with(mut self, action: Arc<dyn HookAction>) -> Self {
        self.register(action);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn HookAction>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
