use std::sync::Arc;

use crate::dispatcher::RouteMiddlewareFn;

/// Prefix, domain and namespace applied to every route registered inside a group.
///
/// A plain string converts into a prefix-only group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSpec {
    pub prefix: String,
    pub domain: Option<String>,
    pub namespace: Option<String>,
}

impl GroupSpec {
    #[must_use]
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

impl From<&str> for GroupSpec {
    fn from(prefix: &str) -> Self {
        Self::prefix(prefix)
    }
}

impl From<String> for GroupSpec {
    fn from(prefix: String) -> Self {
        Self::prefix(prefix)
    }
}

/// One entry on the router's group stack.
#[derive(Clone)]
pub(crate) struct RouteGroup {
    pub(crate) prefix: String,
    pub(crate) domain: Option<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) middleware: Vec<Arc<RouteMiddlewareFn>>,
}

impl RouteGroup {
    pub(crate) fn new(spec: GroupSpec, middleware: Vec<Arc<RouteMiddlewareFn>>) -> Self {
        Self {
            prefix: spec.prefix,
            domain: spec.domain.filter(|d| !d.is_empty()),
            namespace: spec.namespace.filter(|ns| !ns.is_empty()),
            middleware,
        }
    }
}
