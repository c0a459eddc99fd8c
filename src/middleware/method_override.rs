use tracing::debug;

use super::{Middleware, Next};
use crate::app::Context;
use crate::dispatcher::Flow;

/// Header consulted before the form field.
pub const OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";

/// Lets clients that can only send GET/POST ask for another method.
///
/// The `X-HTTP-Method-Override` header wins; otherwise a POST form field (default
/// `_METHOD`) is used. The original method stays available through
/// [`Environment::original_method`](crate::server::Environment::original_method).
pub struct MethodOverride {
    key: String,
}

impl Default for MethodOverride {
    fn default() -> Self {
        Self::new("_METHOD")
    }
}

impl MethodOverride {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Middleware for MethodOverride {
    fn name(&self) -> &'static str {
        "MethodOverride"
    }

    fn call(&self, ctx: &mut Context<'_>, next: Next<'_>) -> Flow {
        let env = ctx.env();
        let requested = match env.header(OVERRIDE_HEADER) {
            Some(header) => Some(header.to_string()),
            None if env.is_post() => env.post(&self.key),
            None => None,
        };
        if let Some(method) = requested.filter(|m| !m.trim().is_empty()) {
            debug!(from = %ctx.env().method(), to = %method, "Overriding request method");
            ctx.env_mut().override_method(&method);
        }
        next.run(ctx)
    }
}
