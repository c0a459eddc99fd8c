//! A single route: pattern, constraints and what to run when it matches.

use http::Method;
use regex::Regex;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error};

use crate::app::Context;
use crate::dispatcher::{Flow, RouteMiddlewareFn, Signal, Target};
use crate::error::FrameworkError;

/// Maximum number of captured parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Captured parameter storage; names are shared with the compiled pattern.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Wildcard method token.
pub const ANY_METHOD: &str = "ANY";

/// Default capture class for a `:name` path segment.
const PATH_SEGMENT: &str = "[^/]+";
/// Default capture class for a `:name` label in a domain pattern.
const DOMAIN_LABEL: &str = "[^.]+";

/// Parameters captured by a successful match, URL-decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: ParamVec,
}

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a parameter. When a name was captured twice the later capture wins.
    #[must_use]
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Segments of a greedy `:name+` capture (`a/b/c` → `["a", "b", "c"]`).
    #[must_use]
    pub fn segments(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .map(|v| v.split('/').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn insert(&mut self, name: impl Into<Arc<str>>, value: impl Into<String>) {
        self.values.push((name.into(), value.into()));
    }

    /// Append another set of captures; later values shadow earlier ones.
    pub fn extend(&mut self, other: Params) {
        self.values.extend(other.values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct ParamSpec {
    name: Arc<str>,
    /// Synthetic capture group name; user conditions may contain their own groups.
    group: String,
}

/// A route pattern compiled into an anchored regex.
#[derive(Debug, Clone)]
pub(crate) struct CompiledPattern {
    regex: Regex,
    params: Vec<ParamSpec>,
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl CompiledPattern {
    /// Translate a route pattern into a regex.
    ///
    /// - `:name` captures `segment` (or the condition registered for `name`)
    /// - `:name+` captures greedily across `/`
    /// - `( … )` is an optional group and may nest
    /// - every other character is matched literally
    /// - a trailing `/` is optional
    pub(crate) fn compile(
        pattern: &str,
        case_sensitive: bool,
        segment: &str,
        conditions: &BTreeMap<String, String>,
    ) -> Result<Self, FrameworkError> {
        let invalid = |reason: &str| FrameworkError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let chars: Vec<char> = pattern.chars().collect();
        let mut out = String::with_capacity(pattern.len() * 2 + 8);
        if !case_sensitive {
            out.push_str("(?i)");
        }
        out.push('^');

        let mut params = Vec::new();
        let mut depth = 0usize;
        let mut i = 0;
        let mut buf = [0u8; 4];
        while i < chars.len() {
            match chars[i] {
                ':' if chars.get(i + 1).copied().is_some_and(is_ident) => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && is_ident(chars[end]) {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    let greedy = chars.get(end) == Some(&'+');
                    i = if greedy { end + 1 } else { end };

                    let class = match conditions.get(&name) {
                        Some(condition) => condition.as_str(),
                        None if greedy => ".+",
                        None => segment,
                    };
                    let group = format!("p{}", params.len());
                    out.push_str("(?P<");
                    out.push_str(&group);
                    out.push_str(">(?:");
                    out.push_str(class);
                    out.push_str("))");
                    params.push(ParamSpec {
                        name: Arc::from(name),
                        group,
                    });
                    continue;
                }
                '(' => {
                    depth += 1;
                    out.push_str("(?:");
                }
                ')' => {
                    if depth == 0 {
                        return Err(invalid("unbalanced `)`"));
                    }
                    depth -= 1;
                    out.push_str(")?");
                }
                c => out.push_str(&regex::escape(c.encode_utf8(&mut buf))),
            }
            i += 1;
        }
        if depth != 0 {
            return Err(invalid("unclosed `(`"));
        }
        if pattern.ends_with('/') {
            out.push('?');
        }
        out.push('$');

        let regex = Regex::new(&out).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self { regex, params })
    }

    #[inline]
    pub(crate) fn is_match(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }

    pub(crate) fn captures(&self, subject: &str) -> Option<Params> {
        let caps = self.regex.captures(subject)?;
        let mut params = Params::new();
        for spec in &self.params {
            if let Some(m) = caps.name(&spec.group) {
                let value = urlencoding::decode(m.as_str())
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| m.as_str().to_string());
                params.insert(Arc::clone(&spec.name), value);
            }
        }
        Some(params)
    }
}

fn insert_conditions<K, V>(
    target: &mut BTreeMap<String, String>,
    conditions: impl IntoIterator<Item = (K, V)>,
) -> Result<(), FrameworkError>
where
    K: Into<String>,
    V: Into<String>,
{
    for (param, condition) in conditions {
        let param = param.into();
        let condition = condition.into();
        Regex::new(&condition).map_err(|e| FrameworkError::InvalidCondition {
            param: param.clone(),
            reason: e.to_string(),
        })?;
        target.insert(param, condition);
    }
    Ok(())
}

/// A registered route.
///
/// Routes are built and configured during application setup, then shared read-only
/// (behind `Arc`) while requests are served. The router compiles the patterns at
/// registration; a standalone route compiles them on first match. Captures are
/// returned to the caller rather than stored on the route, so one route can serve
/// concurrent requests.
#[derive(Clone)]
pub struct Route {
    pattern: String,
    methods: Vec<Method>,
    any_method: bool,
    domain: Option<String>,
    name: Option<String>,
    namespace: Option<String>,
    middleware: Vec<Arc<RouteMiddlewareFn>>,
    target: Target,
    case_sensitive: bool,
    conditions: BTreeMap<String, String>,
    domain_conditions: BTreeMap<String, String>,
    matcher: OnceLock<Option<CompiledPattern>>,
    domain_matcher: OnceLock<Option<CompiledPattern>>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("methods", &self.method_names())
            .field("domain", &self.domain)
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("middleware", &self.middleware.len())
            .field("target", &self.target)
            .field("case_sensitive", &self.case_sensitive)
            .field("conditions", &self.conditions)
            .field("domain_conditions", &self.domain_conditions)
            .finish()
    }
}

impl Route {
    /// A route with no methods yet; add them with [`via`](Self::via).
    #[must_use]
    pub fn new(pattern: impl Into<String>, target: Target) -> Self {
        Self {
            pattern: pattern.into(),
            methods: Vec::new(),
            any_method: false,
            domain: None,
            name: None,
            namespace: None,
            middleware: Vec::new(),
            target,
            case_sensitive: true,
            conditions: BTreeMap::new(),
            domain_conditions: BTreeMap::new(),
            matcher: OnceLock::new(),
            domain_matcher: OnceLock::new(),
        }
    }

    // ----- accessors -----

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    #[must_use]
    pub fn accepts_any_method(&self) -> bool {
        self.any_method
    }

    /// Upper-case method names, `ANY` included.
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.iter().map(ToString::to_string).collect();
        if self.any_method {
            names.push(ANY_METHOD.to_string());
        }
        names
    }

    #[must_use]
    pub fn middleware(&self) -> &[Arc<RouteMiddlewareFn>] {
        &self.middleware
    }

    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub fn conditions(&self) -> &BTreeMap<String, String> {
        &self.conditions
    }

    #[must_use]
    pub fn domain_conditions(&self) -> &BTreeMap<String, String> {
        &self.domain_conditions
    }

    /// True when at least one method (or `ANY`) is accepted.
    #[must_use]
    pub fn has_methods(&self) -> bool {
        self.any_method || !self.methods.is_empty()
    }

    #[must_use]
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    // ----- mutators (setup time only) -----

    /// Add methods; duplicates are ignored.
    pub fn via(&mut self, methods: &[Method]) -> &mut Self {
        for method in methods {
            if !self.methods.contains(method) {
                self.methods.push(method.clone());
            }
        }
        self
    }

    /// Add methods by name; `ANY` (any case) sets the wildcard.
    pub fn via_names(&mut self, methods: &[&str]) -> &mut Self {
        for raw in methods {
            let upper = raw.trim().to_ascii_uppercase();
            if upper == ANY_METHOD {
                self.any_method = true;
            } else if let Ok(method) = Method::from_bytes(upper.as_bytes()) {
                self.via(&[method]);
            }
        }
        self
    }

    /// Accept every method.
    pub fn via_any(&mut self) -> &mut Self {
        self.any_method = true;
        self
    }

    pub fn set_pattern(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.pattern = pattern.into();
        self.matcher = OnceLock::new();
        self
    }

    pub fn set_domain(&mut self, domain: Option<String>) -> &mut Self {
        self.domain = domain.filter(|d| !d.is_empty());
        self.domain_matcher = OnceLock::new();
        self
    }

    pub fn set_namespace(&mut self, namespace: Option<String>) -> &mut Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    pub fn set_case_sensitive(&mut self, case_sensitive: bool) -> &mut Self {
        self.case_sensitive = case_sensitive;
        self.matcher = OnceLock::new();
        self
    }

    /// Set the route name. Uniqueness is enforced by the router.
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Append route middleware; they run in the order added.
    pub fn add_middleware(&mut self, middleware: Arc<RouteMiddlewareFn>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Put middleware in front of the ones already attached (used for group middleware).
    pub fn prepend_middleware(&mut self, middleware: &[Arc<RouteMiddlewareFn>]) -> &mut Self {
        let mut merged = middleware.to_vec();
        merged.append(&mut self.middleware);
        self.middleware = merged;
        self
    }

    /// Constrain path parameters with regexes, e.g. `("id", r"\d+")`.
    ///
    /// Only the path pattern sees these; domain labels use
    /// [`set_domain_conditions`](Self::set_domain_conditions).
    ///
    /// # Errors
    ///
    /// [`FrameworkError::InvalidCondition`] if a condition is not a valid regex.
    pub fn set_conditions<K, V>(
        &mut self,
        conditions: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&mut Self, FrameworkError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        insert_conditions(&mut self.conditions, conditions)?;
        self.matcher = OnceLock::new();
        Ok(self)
    }

    /// Constrain `:name` labels of the domain pattern.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::InvalidCondition`] if a condition is not a valid regex.
    pub fn set_domain_conditions<K, V>(
        &mut self,
        conditions: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&mut Self, FrameworkError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        insert_conditions(&mut self.domain_conditions, conditions)?;
        self.domain_matcher = OnceLock::new();
        Ok(self)
    }

    /// Compile the path and domain patterns now instead of on first match.
    ///
    /// The router calls this at registration so a bad pattern fails setup.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`] when the path or domain pattern (combined
    /// with its conditions) does not compile.
    pub fn compile(&self) -> Result<(), FrameworkError> {
        if !matches!(self.matcher.get(), Some(Some(_))) {
            let path = CompiledPattern::compile(
                &self.pattern,
                self.case_sensitive,
                PATH_SEGMENT,
                &self.conditions,
            )?;
            let _ = self.matcher.set(Some(path));
        }
        if let Some(domain) = self.domain.as_deref() {
            if !matches!(self.domain_matcher.get(), Some(Some(_))) {
                let host =
                    CompiledPattern::compile(domain, false, DOMAIN_LABEL, &self.domain_conditions)?;
                let _ = self.domain_matcher.set(Some(host));
            }
        }
        Ok(())
    }

    // ----- matching -----

    fn path_matcher(&self) -> Option<&CompiledPattern> {
        self.matcher
            .get_or_init(|| {
                CompiledPattern::compile(
                    &self.pattern,
                    self.case_sensitive,
                    PATH_SEGMENT,
                    &self.conditions,
                )
                .map_err(|err| {
                    error!(pattern = %self.pattern, error = %err, "Route pattern failed to compile");
                })
                .ok()
            })
            .as_ref()
    }

    fn host_matcher(&self) -> Option<&CompiledPattern> {
        let domain = self.domain.as_deref()?;
        self.domain_matcher
            .get_or_init(|| {
                CompiledPattern::compile(domain, false, DOMAIN_LABEL, &self.domain_conditions)
                    .map_err(|err| {
                        error!(domain = %domain, error = %err, "Route domain failed to compile");
                    })
                    .ok()
            })
            .as_ref()
    }

    /// Check the pattern against a path, compiling it on first use.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.path_matcher().is_some_and(|m| m.is_match(path))
    }

    /// Captured path parameters, or `None` if the path does not match.
    #[must_use]
    pub fn captures(&self, path: &str) -> Option<Params> {
        self.path_matcher()?.captures(path)
    }

    /// Parameters from both the domain and the path.
    #[must_use]
    pub fn match_request(&self, path: &str, host: &str) -> Option<Params> {
        let mut params = match self.host_matcher() {
            Some(matcher) => matcher.captures(host)?,
            None if self.domain.is_some() => return None,
            None => Params::new(),
        };
        params.extend(self.captures(path)?);
        Some(params)
    }

    #[must_use]
    #[inline]
    pub fn supports_http_method(&self, method: &Method) -> bool {
        self.any_method || self.methods.contains(method)
    }

    /// Case-insensitive method name check.
    #[must_use]
    pub fn supports_method_name(&self, method: &str) -> bool {
        if self.any_method {
            return true;
        }
        self.methods
            .iter()
            .any(|m| m.as_str().eq_ignore_ascii_case(method))
    }

    /// True when the route has no domain constraint or `host` satisfies it.
    #[must_use]
    pub fn supports_domain(&self, host: &str) -> bool {
        match self.domain {
            None => true,
            Some(_) => self.host_matcher().is_some_and(|m| m.is_match(host)),
        }
    }

    // ----- dispatch -----

    /// Run the route's middleware in order, then its action.
    ///
    /// Returns whether the action handled the request. The request context must already
    /// carry this route's captured parameters.
    ///
    /// # Errors
    ///
    /// Propagates any [`Signal`] raised by middleware or the action, and faults when a
    /// controller reference cannot be resolved.
    pub fn dispatch(&self, ctx: &mut Context<'_>) -> Flow<bool> {
        for middleware in &self.middleware {
            middleware(ctx, self)?;
        }
        let action = match &self.target {
            Target::Callable(action) => Arc::clone(action),
            Target::Controller { controller, action } => {
                let resolved =
                    ctx.app()
                        .actions()
                        .resolve(self.namespace.as_deref(), controller, action);
                match resolved {
                    Some(found) => found,
                    None => {
                        let key = crate::dispatcher::ActionRegistry::qualified_name(
                            self.namespace.as_deref(),
                            controller,
                            action,
                        );
                        return Err(Signal::from(FrameworkError::UnresolvedAction(key)));
                    }
                }
            }
        };
        debug!(pattern = %self.pattern, target = ?self.target, "Dispatching route");
        action(ctx)
    }
}
