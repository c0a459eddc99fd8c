use std::sync::Arc;
use tracing::debug;

use crate::app::Context;
use crate::dispatcher::Flow;
use crate::error::FrameworkError;

/// Application middleware.
///
/// A middleware wraps everything after it in the chain: it may inspect or mutate the
/// request context, call `next.run(ctx)` to continue, and act on the result, or return
/// without calling `next` to short-circuit.
pub trait Middleware: Send + Sync {
    /// Shown in logs and configuration errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// # Errors
    ///
    /// Propagates any signal from the rest of the chain or raised here.
    fn call(&self, ctx: &mut Context<'_>, next: Next<'_>) -> Flow;
}

/// The innermost link of a chain, normally the application itself.
pub trait Endpoint {
    /// # Errors
    ///
    /// Propagates signals the endpoint does not handle itself.
    fn call(&self, ctx: &mut Context<'_>) -> Flow;
}

/// Identity of a middleware instance: the address of its shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MiddlewareId(usize);

impl MiddlewareId {
    #[must_use]
    pub fn of(middleware: &Arc<dyn Middleware>) -> Self {
        Self(Arc::as_ptr(middleware).cast::<()>() as usize)
    }
}

/// Cursor over the rest of the chain.
pub struct Next<'a> {
    layers: &'a [(MiddlewareId, Arc<dyn Middleware>)],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    /// Invoke the next link.
    ///
    /// # Errors
    ///
    /// Whatever the rest of the chain returns.
    pub fn run(self, ctx: &mut Context<'_>) -> Flow {
        match self.layers.split_first() {
            Some(((_, middleware), rest)) => middleware.call(
                ctx,
                Next {
                    layers: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => self.endpoint.call(ctx),
        }
    }

    /// Links left before the endpoint.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.layers.len()
    }
}

/// Ordered middleware, outermost first.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    layers: Vec<(MiddlewareId, Arc<dyn Middleware>)>,
}

impl MiddlewareStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the head so the newest middleware runs first.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::DuplicateMiddleware`] when this exact instance is already queued.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) -> Result<MiddlewareId, FrameworkError> {
        let id = MiddlewareId::of(&middleware);
        if self.contains(id) {
            return Err(FrameworkError::DuplicateMiddleware(
                middleware.name().to_string(),
            ));
        }
        debug!(middleware = middleware.name(), depth = self.layers.len() + 1, "Middleware added");
        self.layers.insert(0, (id, middleware));
        Ok(id)
    }

    #[must_use]
    pub fn contains(&self, id: MiddlewareId) -> bool {
        self.layers.iter().any(|(existing, _)| *existing == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Names from outermost to innermost.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|(_, m)| m.name()).collect()
    }

    /// Start of the chain ending in `endpoint`.
    #[must_use]
    pub fn head<'a>(&'a self, endpoint: &'a dyn Endpoint) -> Next<'a> {
        Next {
            layers: &self.layers,
            endpoint,
        }
    }
}
