use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use super::{Middleware, Next};
use crate::app::Context;
use crate::dispatcher::{Flow, Signal};

/// Session key holding messages for the next request.
pub const DEFAULT_FLASH_KEY: &str = "brisk.flash";

/// Messages carried from one request to the next through the session.
///
/// - `prev`: loaded from the session at the start of the request
/// - `now`: visible only to the current request
/// - `next`: saved to the session for the following request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashMessages {
    prev: BTreeMap<String, String>,
    now: BTreeMap<String, String>,
    next: BTreeMap<String, String>,
}

impl FlashMessages {
    #[must_use]
    pub fn with_previous(prev: BTreeMap<String, String>) -> Self {
        Self {
            prev,
            ..Self::default()
        }
    }

    /// Queue a message for the next request.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.next.insert(key.into(), value.into());
    }

    /// Make a message visible to this request only.
    pub fn now(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.now.insert(key.into(), value.into());
    }

    /// Carry every previous message over to the next request.
    pub fn keep(&mut self) {
        for (key, value) in &self.prev {
            self.next.insert(key.clone(), value.clone());
        }
    }

    /// Messages visible to this request: previous ones plus `now`, `now` winning.
    #[must_use]
    pub fn messages(&self) -> BTreeMap<String, String> {
        let mut all = self.prev.clone();
        all.extend(self.now.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.now
            .get(key)
            .or_else(|| self.prev.get(key))
            .map(String::as_str)
    }

    /// Drop a message from every set.
    pub fn remove(&mut self, key: &str) {
        self.prev.remove(key);
        self.now.remove(key);
        self.next.remove(key);
    }

    #[must_use]
    pub fn pending(&self) -> &BTreeMap<String, String> {
        &self.next
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prev.is_empty() && self.now.is_empty()
    }
}

/// Loads flash messages from the session before the rest of the chain runs and stores
/// the next request's messages afterwards.
pub struct FlashMiddleware {
    key: String,
}

impl Default for FlashMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_FLASH_KEY)
    }
}

impl FlashMiddleware {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    fn load(&self, ctx: &Context<'_>) -> BTreeMap<String, String> {
        match ctx.session().get(&self.key) {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
            Some(other) => {
                warn!(key = %self.key, value = %other, "Ignoring malformed flash data in session");
                BTreeMap::new()
            }
            None => BTreeMap::new(),
        }
    }

    fn save(&self, ctx: &mut Context<'_>) {
        let pending = ctx
            .flash_messages()
            .map(|f| f.pending().clone())
            .unwrap_or_default();
        if pending.is_empty() {
            ctx.session_mut().remove(&self.key);
        } else {
            let map = pending
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect::<serde_json::Map<_, _>>();
            ctx.session_mut().set(&self.key, Value::Object(map));
        }
    }
}

impl Middleware for FlashMiddleware {
    fn name(&self) -> &'static str {
        "Flash"
    }

    fn call(&self, ctx: &mut Context<'_>, next: Next<'_>) -> Flow {
        let previous = self.load(ctx);
        ctx.install_flash(FlashMessages::with_previous(previous));
        let result = next.run(ctx);
        if !matches!(result, Err(Signal::Fault(_))) {
            self.save(ctx);
        }
        result
    }
}
