use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::trace;

use super::Context;
use crate::dispatcher::Flow;

pub const BEFORE: &str = "before";
pub const BEFORE_ROUTER: &str = "before.router";
pub const BEFORE_DISPATCH: &str = "before.dispatch";
pub const AFTER_DISPATCH: &str = "after.dispatch";
pub const AFTER_ROUTER: &str = "after.router";
pub const AFTER: &str = "after";

/// Hooks registered without an explicit priority.
pub const DEFAULT_PRIORITY: i32 = 10;

/// A hook listener.
pub type HookFn = dyn Fn(&mut Context<'_>) -> Flow + Send + Sync;

/// Named hooks with priority-ordered listeners.
///
/// Lower priorities run first; listeners sharing a priority run in registration order.
#[derive(Clone)]
pub struct HookRegistry {
    hooks: HashMap<String, BTreeMap<i32, Vec<Arc<HookFn>>>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        let hooks = [BEFORE, BEFORE_ROUTER, BEFORE_DISPATCH, AFTER_DISPATCH, AFTER_ROUTER, AFTER]
            .into_iter()
            .map(|name| (name.to_string(), BTreeMap::new()))
            .collect();
        Self { hooks }
    }
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener; unknown names create a new hook.
    pub fn hook<F>(&mut self, name: &str, priority: i32, f: F)
    where
        F: Fn(&mut Context<'_>) -> Flow + Send + Sync + 'static,
    {
        self.hooks
            .entry(name.to_string())
            .or_default()
            .entry(priority)
            .or_default()
            .push(Arc::new(f));
    }

    /// Run every listener of `name`. Missing hooks are a no-op.
    ///
    /// # Errors
    ///
    /// The first signal raised by a listener; the remaining listeners are skipped.
    pub fn apply(&self, name: &str, ctx: &mut Context<'_>) -> Flow {
        let Some(listeners) = self.hooks.get(name) else {
            return Ok(());
        };
        if listeners.is_empty() {
            return Ok(());
        }
        trace!(hook = name, "Applying hook");
        for listener in listeners.values().flatten() {
            listener(ctx)?;
        }
        Ok(())
    }

    /// Listeners of `name` in execution order.
    #[must_use]
    pub fn listeners(&self, name: &str) -> Vec<Arc<HookFn>> {
        self.hooks
            .get(name)
            .map(|l| l.values().flatten().map(Arc::clone).collect())
            .unwrap_or_default()
    }

    /// Drop the listeners of one hook, or of every hook. Hook names stay registered.
    pub fn clear(&mut self, name: Option<&str>) {
        match name {
            Some(name) => {
                if let Some(listeners) = self.hooks.get_mut(name) {
                    listeners.clear();
                }
            }
            None => self.hooks.values_mut().for_each(BTreeMap::clear),
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }
}
