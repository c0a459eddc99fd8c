use http::Method;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use super::group::{GroupSpec, RouteGroup};
use super::route::Route;
use crate::app::Context;
use crate::config::RouteSettings;
use crate::dispatcher::{action, route_middleware, Flow, IntoHandled, RouteMiddlewareFn, Target};
use crate::error::FrameworkError;

/// Ordered candidate list returned by [`Router::get_matched_routes`].
pub type MatchedRoutes = Arc<[Arc<Route>]>;

/// Last resolution, reused while the key stays the same.
struct MatchCache {
    method: Method,
    path: String,
    host: String,
    routes: MatchedRoutes,
}

/// Ordered route table.
///
/// Registration order is priority order. The router also owns the group stack used
/// while registering, the name index used by [`url_for`](Router::url_for), and a
/// single-entry cache of the last matched-route resolution.
pub struct Router {
    routes: Vec<Arc<Route>>,
    named: HashMap<String, usize>,
    groups: Vec<RouteGroup>,
    case_sensitive: bool,
    match_all: bool,
    cache: Mutex<Option<MatchCache>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouteSettings::default())
    }
}

impl Router {
    #[must_use]
    pub fn new(settings: RouteSettings) -> Self {
        Self {
            routes: Vec::new(),
            named: HashMap::new(),
            groups: Vec::new(),
            case_sensitive: settings.case_sensitive,
            match_all: settings.match_all,
            cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    #[must_use]
    pub fn match_all(&self) -> bool {
        self.match_all
    }

    /// Collect every matching route instead of stopping at the first.
    pub fn set_match_all(&mut self, match_all: bool) {
        self.match_all = match_all;
        self.invalidate();
    }

    fn invalidate(&mut self) {
        *self
            .cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Drop the cached resolution; the next lookup recomputes it.
    pub fn reload(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    // ----- registration -----

    /// Add a fully built route, applying the active groups.
    ///
    /// # Errors
    ///
    /// - [`FrameworkError::DuplicateRouteName`] when the route carries a name that is
    ///   already taken
    /// - [`FrameworkError::NoMethods`] when the route accepts no method
    /// - [`FrameworkError::InvalidPattern`] when its path or domain does not compile
    pub fn add_route(&mut self, route: Route) -> Result<RouteHandle<'_>, FrameworkError> {
        let name = route.name().map(str::to_string);
        if let Some(name) = &name {
            if self.named.contains_key(name) {
                return Err(FrameworkError::DuplicateRouteName(name.clone()));
            }
        }
        let index = self.push_route(route)?;
        if let Some(name) = name {
            self.named.insert(name, index);
        }
        Ok(RouteHandle {
            router: self,
            index,
        })
    }

    fn push_route(&mut self, mut route: Route) -> Result<usize, FrameworkError> {
        if !route.has_methods() {
            return Err(FrameworkError::NoMethods(route.pattern().to_string()));
        }
        if !self.groups.is_empty() {
            let prefix: String = self.groups.iter().map(|g| g.prefix.as_str()).collect();
            let pattern = format!("{prefix}{}", route.pattern());
            route.set_pattern(pattern);
            if let Some(domain) = self.groups.iter().rev().find_map(|g| g.domain.clone()) {
                route.set_domain(Some(domain));
            }
            if let Some(namespace) = self.groups.iter().rev().find_map(|g| g.namespace.clone()) {
                route.set_namespace(Some(namespace));
            }
            let group_middleware: Vec<Arc<RouteMiddlewareFn>> = self
                .groups
                .iter()
                .flat_map(|g| g.middleware.iter().map(Arc::clone))
                .collect();
            route.prepend_middleware(&group_middleware);
        }
        route.set_case_sensitive(self.case_sensitive);
        route.compile()?;

        debug!(
            pattern = %route.pattern(),
            methods = ?route.method_names(),
            domain = ?route.domain(),
            namespace = ?route.namespace(),
            "Route registered"
        );
        self.routes.push(Arc::new(route));
        self.invalidate();
        Ok(self.routes.len() - 1)
    }

    fn push_target(
        &mut self,
        pattern: &str,
        target: Target,
        methods: &[Method],
        any_method: bool,
    ) -> Result<RouteHandle<'_>, FrameworkError> {
        let mut route = Route::new(pattern, target);
        route.via(methods);
        if any_method {
            route.via_any();
        }
        let index = self.push_route(route)?;
        Ok(RouteHandle {
            router: self,
            index,
        })
    }

    /// Register a closure for the given methods.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::NoMethods`] for an empty method list and
    /// [`FrameworkError::InvalidPattern`] for a pattern that does not compile.
    pub fn map<F, R>(
        &mut self,
        methods: &[Method],
        pattern: &str,
        f: F,
    ) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.push_target(pattern, Target::Callable(action(f)), methods, false)
    }

    /// Register a `Controller@action` reference for the given methods.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::InvalidActionReference`] for malformed references, otherwise
    /// as [`map`](Self::map).
    pub fn map_to(
        &mut self,
        methods: &[Method],
        pattern: &str,
        reference: &str,
    ) -> Result<RouteHandle<'_>, FrameworkError> {
        let target = Target::parse_reference(reference)?;
        self.push_target(pattern, target, methods, false)
    }

    /// `GET` and `HEAD`.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn get<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.map(&[Method::GET, Method::HEAD], pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidActionReference`] for malformed references.
    pub fn get_to(
        &mut self,
        pattern: &str,
        reference: &str,
    ) -> Result<RouteHandle<'_>, FrameworkError> {
        self.map_to(&[Method::GET, Method::HEAD], pattern, reference)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn post<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.map(&[Method::POST], pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn put<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.map(&[Method::PUT], pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn patch<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.map(&[Method::PATCH], pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn delete<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.map(&[Method::DELETE], pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn options<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.map(&[Method::OPTIONS], pattern, f)
    }

    /// Every method.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn any<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.push_target(pattern, Target::Callable(action(f)), &[], true)
    }

    // ----- groups -----

    /// Open a group; routes registered until the matching [`pop_group`](Self::pop_group)
    /// inherit its prefix, domain, namespace and middleware.
    ///
    /// Returns the new stack depth.
    pub fn push_group(
        &mut self,
        spec: impl Into<GroupSpec>,
        middleware: Vec<Arc<RouteMiddlewareFn>>,
    ) -> usize {
        self.groups.push(RouteGroup::new(spec.into(), middleware));
        self.groups.len()
    }

    /// Close the innermost group. Returns `false` when no group was open.
    pub fn pop_group(&mut self) -> bool {
        self.groups.pop().is_some()
    }

    #[must_use]
    pub fn group_depth(&self) -> usize {
        self.groups.len()
    }

    /// Register routes inside a group.
    ///
    /// The group is closed again even when `routes` fails.
    ///
    /// # Errors
    ///
    /// Whatever `routes` returns.
    pub fn group<F>(
        &mut self,
        spec: impl Into<GroupSpec>,
        middleware: Vec<Arc<RouteMiddlewareFn>>,
        routes: F,
    ) -> Result<(), FrameworkError>
    where
        F: FnOnce(&mut Router) -> Result<(), FrameworkError>,
    {
        self.push_group(spec, middleware);
        let result = routes(self);
        self.pop_group();
        result
    }

    // ----- matching -----

    /// Routes that accept `method` on `host` and match `path`, in registration order.
    ///
    /// Stops at the first match unless `match_all` is on. The last resolution is cached;
    /// asking again with the same key returns the same list (pointer-equal) until a route
    /// changes or `reload` is set.
    pub fn get_matched_routes(
        &self,
        method: &Method,
        path: &str,
        host: &str,
        reload: bool,
    ) -> MatchedRoutes {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if !reload {
            if let Some(hit) = cache
                .as_ref()
                .filter(|c| c.method == *method && c.path == path && c.host == host)
            {
                return Arc::clone(&hit.routes);
            }
        }

        debug!(method = %method, path = %path, host = %host, "Route match attempt");
        let mut matched = Vec::new();
        for route in &self.routes {
            if !route.supports_domain(host) || !route.supports_http_method(method) {
                continue;
            }
            if route.matches(path) {
                matched.push(Arc::clone(route));
                if !self.match_all {
                    break;
                }
            }
        }

        if matched.is_empty() {
            info!(method = %method, path = %path, "No route matched");
        } else {
            debug!(
                method = %method,
                path = %path,
                matched = matched.len(),
                first = %matched[0].pattern(),
                "Route matched"
            );
        }

        let routes: MatchedRoutes = matched.into();
        *cache = Some(MatchCache {
            method: method.clone(),
            path: path.to_string(),
            host: host.to_string(),
            routes: Arc::clone(&routes),
        });
        routes
    }

    // ----- named routes -----

    fn register_name(&mut self, name: &str, index: usize) -> Result<(), FrameworkError> {
        match self.named.get(name) {
            Some(existing) if *existing != index => {
                Err(FrameworkError::DuplicateRouteName(name.to_string()))
            }
            _ => {
                self.named.retain(|_, i| *i != index);
                self.named.insert(name.to_string(), index);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn has_named_route(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    #[must_use]
    pub fn get_named_route(&self, name: &str) -> Option<&Arc<Route>> {
        self.named.get(name).and_then(|i| self.routes.get(*i))
    }

    /// Named routes in registration order.
    #[must_use]
    pub fn named_routes(&self) -> Vec<(&str, &Arc<Route>)> {
        let mut named: Vec<(&str, usize)> =
            self.named.iter().map(|(k, i)| (k.as_str(), *i)).collect();
        named.sort_by_key(|(_, i)| *i);
        named
            .into_iter()
            .filter_map(|(name, i)| self.routes.get(i).map(|r| (name, r)))
            .collect()
    }

    /// Build a path for a named route.
    ///
    /// Placeholders (`:name` and `:name+`) are replaced by the given values; optional
    /// groups still holding placeholders are dropped, and leftover parentheses are removed.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::UnknownRoute`] when no route has that name.
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, FrameworkError> {
        let route = self
            .get_named_route(name)
            .ok_or_else(|| FrameworkError::UnknownRoute(name.to_string()))?;

        let mut ordered: Vec<&(&str, &str)> = params.iter().collect();
        ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut pattern = route.pattern().to_string();
        for (key, value) in ordered {
            let placeholder = Regex::new(&format!(r":{}\+?(\W|$)", regex::escape(key))).map_err(
                |e| FrameworkError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                },
            )?;
            pattern = placeholder
                .replace_all(&pattern, |caps: &Captures<'_>| format!("{value}{}", &caps[1]))
                .into_owned();
        }
        Ok(strip_unfilled(&pattern))
    }

    /// One line per route: methods, pattern, name and target.
    #[must_use]
    pub fn route_table(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|route| {
                let mut line = format!("{:<20} {}", route.method_names().join("|"), route.pattern());
                if let Some(domain) = route.domain() {
                    line.push_str(&format!(" @{domain}"));
                }
                if let Some(name) = route.name() {
                    line.push_str(&format!(" [{name}]"));
                }
                line.push_str(&format!(" -> {:?}", route.target()));
                line
            })
            .collect()
    }
}

/// Remove optional groups that still contain a `:placeholder`, then any stray
/// parentheses and backslashes.
pub(crate) fn strip_unfilled(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut i = 0;
    while i < pattern.len() {
        let rest = &pattern[i..];
        let Some(c) = rest.chars().next() else { break };
        match c {
            '(' => {
                let inner = &rest[1..];
                let colon = if inner.starts_with("/:") {
                    Some(2)
                } else if inner.starts_with(':') {
                    Some(1)
                } else {
                    None
                };
                // greedy: up to the last `)` with at least one char after the colon
                match (colon, rest.rfind(')')) {
                    (Some(colon), Some(close)) if close > colon + 1 => i += close + 1,
                    _ => i += 1,
                }
            }
            ')' | '\\' => i += 1,
            _ => {
                out.push(c);
                i += c.len_utf8();
            }
        }
    }
    out
}

/// Handle to a freshly registered route for chained configuration.
pub struct RouteHandle<'r> {
    router: &'r mut Router,
    index: usize,
}

impl RouteHandle<'_> {
    fn route_mut(&mut self) -> &mut Route {
        self.router.invalidate();
        Arc::make_mut(&mut self.router.routes[self.index])
    }

    /// Apply a change that affects matching; the route is left untouched when the
    /// changed patterns do not compile.
    fn recompile<F>(&mut self, change: F) -> Result<(), FrameworkError>
    where
        F: FnOnce(&mut Route) -> Result<(), FrameworkError>,
    {
        let mut route = Route::clone(&self.router.routes[self.index]);
        change(&mut route)?;
        route.compile()?;
        self.router.routes[self.index] = Arc::new(route);
        self.router.invalidate();
        Ok(())
    }

    #[must_use]
    pub fn route(&self) -> &Route {
        &self.router.routes[self.index]
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name the route for `url_for`.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::DuplicateRouteName`] if another route already has the name.
    pub fn name(mut self, name: &str) -> Result<Self, FrameworkError> {
        self.router.register_name(name, self.index)?;
        self.route_mut().set_name(name);
        Ok(self)
    }

    #[must_use]
    pub fn via(mut self, methods: &[Method]) -> Self {
        self.route_mut().via(methods);
        self
    }

    #[must_use]
    pub fn via_any(mut self) -> Self {
        self.route_mut().via_any();
        self
    }

    /// Append route middleware; runs before the action, after group middleware.
    #[must_use]
    pub fn middleware<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &Route) -> Flow + Send + Sync + 'static,
    {
        self.route_mut().add_middleware(route_middleware(f));
        self
    }

    /// Constrain path parameters.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::InvalidCondition`] for a condition that is not a valid regex,
    /// [`FrameworkError::InvalidPattern`] when the pattern no longer compiles with it.
    pub fn conditions<K, V>(
        mut self,
        conditions: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, FrameworkError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.recompile(|route| route.set_conditions(conditions).map(|_| ()))?;
        Ok(self)
    }

    /// Constrain domain labels.
    ///
    /// # Errors
    ///
    /// As [`conditions`](Self::conditions), for the domain pattern.
    pub fn domain_conditions<K, V>(
        mut self,
        conditions: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, FrameworkError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.recompile(|route| route.set_domain_conditions(conditions).map(|_| ()))?;
        Ok(self)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`] when the domain pattern does not compile.
    pub fn domain(mut self, domain: &str) -> Result<Self, FrameworkError> {
        self.recompile(|route| {
            route.set_domain(Some(domain.to_string()));
            Ok(())
        })?;
        Ok(self)
    }

    /// Replace the path pattern.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`] when the new pattern does not compile.
    pub fn pattern(mut self, pattern: &str) -> Result<Self, FrameworkError> {
        self.recompile(|route| {
            route.set_pattern(pattern);
            Ok(())
        })?;
        Ok(self)
    }

    #[must_use]
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.route_mut().set_namespace(Some(namespace.to_string()));
        self
    }
}
