use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::app::Context;
use crate::error::FrameworkError;

/// Non-local exits of the request pipeline.
///
/// Signals travel as the `Err` side of [`Flow`] so `?` unwinds hooks, middleware and
/// actions up to the boundary that understands them.
#[derive(Debug)]
pub enum Signal {
    /// Abandon the current route attempt and try the next matched route.
    Pass,
    /// Stop processing and send the response as built so far.
    Stop,
    /// Application failure, turned into a 500 at the outermost boundary.
    Fault(anyhow::Error),
}

impl Signal {
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Signal::Pass)
    }

    #[must_use]
    pub fn is_stop(&self) -> bool {
        matches!(self, Signal::Stop)
    }

    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Signal::Fault(_))
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Pass => f.write_str("pass"),
            Signal::Stop => f.write_str("stop"),
            Signal::Fault(err) => write!(f, "fault: {err}"),
        }
    }
}

impl From<anyhow::Error> for Signal {
    fn from(err: anyhow::Error) -> Self {
        Signal::Fault(err)
    }
}

impl From<FrameworkError> for Signal {
    fn from(err: FrameworkError) -> Self {
        Signal::Fault(err.into())
    }
}

/// Result type threaded through hooks, middleware and actions.
pub type Flow<T = ()> = Result<T, Signal>;

/// Action return values that say whether the request was handled.
///
/// `()` and `true` mean handled; `false` declines so the next matched route is tried.
pub trait IntoHandled {
    fn into_handled(self) -> bool;
}

impl IntoHandled for () {
    #[inline]
    fn into_handled(self) -> bool {
        true
    }
}

impl IntoHandled for bool {
    #[inline]
    fn into_handled(self) -> bool {
        self
    }
}

/// Type-erased route action.
pub type ActionFn = dyn Fn(&mut Context<'_>) -> Flow<bool> + Send + Sync;

/// Type-erased route middleware; receives the route being dispatched.
pub type RouteMiddlewareFn = dyn Fn(&mut Context<'_>, &crate::router::Route) -> Flow + Send + Sync;

/// Erase an action closure.
pub fn action<F, R>(f: F) -> Arc<ActionFn>
where
    F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
    R: IntoHandled,
{
    Arc::new(move |ctx: &mut Context<'_>| f(ctx).map(IntoHandled::into_handled))
}

/// Erase a route middleware closure.
pub fn route_middleware<F>(f: F) -> Arc<RouteMiddlewareFn>
where
    F: Fn(&mut Context<'_>, &crate::router::Route) -> Flow + Send + Sync + 'static,
{
    Arc::new(f)
}

/// What a route runs once it matches.
#[derive(Clone)]
pub enum Target {
    /// A closure bound at registration.
    Callable(Arc<ActionFn>),
    /// A `Controller@action` reference resolved through the [`ActionRegistry`].
    Controller { controller: String, action: String },
}

impl Target {
    /// Parse `Controller@action`.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::InvalidActionReference`] when either side is missing.
    pub fn parse_reference(reference: &str) -> Result<Self, FrameworkError> {
        match reference.split_once('@') {
            Some((controller, action)) if !controller.is_empty() && !action.is_empty() => {
                Ok(Target::Controller {
                    controller: controller.to_string(),
                    action: action.to_string(),
                })
            }
            _ => Err(FrameworkError::InvalidActionReference(reference.to_string())),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Callable(_) => f.write_str("Callable(<closure>)"),
            Target::Controller { controller, action } => write!(f, "{controller}@{action}"),
        }
    }
}

/// Controller actions addressable by qualified name (`Admin\Users@show`).
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<ActionFn>>,
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Qualified lookup key for a controller action.
    ///
    /// An empty or root (`\`) namespace yields `Controller@action`.
    #[must_use]
    pub fn qualified_name(namespace: Option<&str>, controller: &str, action: &str) -> String {
        let controller = controller.trim_matches('\\');
        match namespace.map(|ns| ns.trim_matches('\\')).filter(|ns| !ns.is_empty()) {
            Some(ns) => format!("{ns}\\{controller}@{action}"),
            None => format!("{controller}@{action}"),
        }
    }

    /// Register an action under `reference` (`Controller@action`, optionally namespaced
    /// as `Admin\Controller@action`).
    ///
    /// # Errors
    ///
    /// [`FrameworkError::InvalidActionReference`] for references without `@`.
    pub fn register<F, R>(&mut self, reference: &str, f: F) -> Result<(), FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        let (path, action_name) = reference
            .rsplit_once('@')
            .filter(|(c, a)| !c.is_empty() && !a.is_empty())
            .ok_or_else(|| FrameworkError::InvalidActionReference(reference.to_string()))?;
        let (namespace, controller) = match path.trim_matches('\\').rsplit_once('\\') {
            Some((ns, c)) => (Some(ns), c),
            None => (None, path),
        };
        let key = Self::qualified_name(namespace, controller, action_name);
        debug!(action = %key, "Action registered");
        self.actions.insert(key, action(f));
        Ok(())
    }

    #[must_use]
    pub fn resolve(
        &self,
        namespace: Option<&str>,
        controller: &str,
        action: &str,
    ) -> Option<Arc<ActionFn>> {
        self.actions
            .get(&Self::qualified_name(namespace, controller, action))
            .map(Arc::clone)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        let target = Target::parse_reference("Users@show").unwrap();
        assert_eq!(format!("{target:?}"), "Users@show");
        assert!(Target::parse_reference("Users").is_err());
        assert!(Target::parse_reference("@show").is_err());
    }

    #[test]
    fn test_qualified_names() {
        assert_eq!(ActionRegistry::qualified_name(None, "Users", "show"), "Users@show");
        assert_eq!(
            ActionRegistry::qualified_name(Some("\\"), "Users", "show"),
            "Users@show"
        );
        assert_eq!(
            ActionRegistry::qualified_name(Some("\\Admin\\"), "Users", "show"),
            "Admin\\Users@show"
        );
    }

    #[test]
    fn test_register_and_resolve_namespaced() {
        let mut registry = ActionRegistry::new();
        registry
            .register("Admin\\Users@index", |_ctx: &mut Context<'_>| Ok(()))
            .unwrap();
        assert!(registry.resolve(Some("Admin"), "Users", "index").is_some());
        assert!(registry.resolve(None, "Users", "index").is_none());
        assert!(registry.register("nope", |_ctx: &mut Context<'_>| Ok(())).is_err());
    }

    #[test]
    fn test_into_handled() {
        assert!(().into_handled());
        assert!(!false.into_handled());
    }
}
