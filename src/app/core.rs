use http::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::handler::{self, FaultReport};
use super::hooks::{
    HookRegistry, AFTER, AFTER_DISPATCH, AFTER_ROUTER, BEFORE, BEFORE_DISPATCH, BEFORE_ROUTER,
    DEFAULT_PRIORITY,
};
use super::Context;
use crate::config::AppConfig;
use crate::dispatcher::{ActionRegistry, Flow, IntoHandled, RouteMiddlewareFn, Signal};
use crate::error::FrameworkError;
use crate::logger::{Log, Logger};
use crate::middleware::{Endpoint, FlashMiddleware, MethodOverride, Middleware, MiddlewareStack};
use crate::router::{GroupSpec, Route, RouteHandle, Router};
use crate::server::{Environment, FinalizedResponse, Interface};
use crate::session::{MemorySessionStore, SessionStore};
use crate::view::{MinijinjaRenderer, ViewData, ViewRenderer};

/// Custom 404 handler; writes the body through the context.
pub type NotFoundFn = dyn Fn(&mut Context<'_>) -> Flow + Send + Sync;

/// Custom 500 handler; returns the page body.
pub type ErrorHandlerFn = dyn Fn(&mut Context<'_>, &FaultReport) -> String + Send + Sync;

/// The application: configuration, routes, middleware, hooks and collaborators.
///
/// Everything is configured through `&mut self` before serving; [`run`](Self::run) only
/// needs `&self`, so one application can serve requests from several threads.
pub struct Application {
    config: AppConfig,
    router: Router,
    middleware: MiddlewareStack,
    hooks: HookRegistry,
    actions: ActionRegistry,
    not_found: Option<Arc<NotFoundFn>>,
    error_handler: Option<Arc<ErrorHandlerFn>>,
    view: Arc<dyn ViewRenderer>,
    view_data: ViewData,
    sessions: Arc<dyn SessionStore>,
    log: Log,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("mode", &self.config.mode)
            .field("routes", &self.router.len())
            .field("middleware", &self.middleware.names())
            .finish_non_exhaustive()
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl Application {
    /// Build an application with the default middleware stack
    /// (Flash outside MethodOverride), in-memory sessions and file-backed views.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let mut middleware = MiddlewareStack::new();
        let defaults: [Arc<dyn Middleware>; 2] = [
            Arc::new(MethodOverride::default()),
            Arc::new(FlashMiddleware::default()),
        ];
        for layer in defaults {
            if let Err(err) = middleware.push(layer) {
                warn!(error = %err, "Skipping default middleware");
            }
        }
        let view = Arc::new(MinijinjaRenderer::new(
            config.view.path.clone(),
            &config.view.extension,
        ));
        Self {
            router: Router::new(config.routes),
            middleware,
            hooks: HookRegistry::new(),
            actions: ActionRegistry::new(),
            not_found: None,
            error_handler: None,
            view,
            view_data: ViewData::new(),
            sessions: Arc::new(MemorySessionStore::new()),
            log: Log::from_settings(&config.log),
            config,
        }
    }

    #[must_use]
    pub fn with_view(mut self, view: impl ViewRenderer + 'static) -> Self {
        self.view = Arc::new(view);
        self
    }

    #[must_use]
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = store;
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.log = Log::new(logger);
        self
    }

    // ----- configuration -----

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn mode(&self) -> &str {
        &self.config.mode
    }

    /// Run `configure` only when the application runs in `mode`.
    pub fn configure_mode<F>(&mut self, mode: &str, configure: F)
    where
        F: FnOnce(&mut Self),
    {
        if self.config.mode == mode {
            configure(self);
        }
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    #[must_use]
    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Register a controller action for `Controller@action` routes.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::InvalidActionReference`] for references without `@`.
    pub fn register_action<F, R>(&mut self, reference: &str, f: F) -> Result<(), FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.actions.register(reference, f)
    }

    #[must_use]
    pub fn view(&self) -> &dyn ViewRenderer {
        self.view.as_ref()
    }

    #[must_use]
    pub fn view_data(&self) -> &ViewData {
        &self.view_data
    }

    /// Data shared with every template rendered by every request.
    pub fn view_data_mut(&mut self) -> &mut ViewData {
        &mut self.view_data
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn log(&self) -> &Log {
        &self.log
    }

    /// Path of a named route, without the mount point.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::UnknownRoute`].
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, FrameworkError> {
        self.router.url_for(name, params)
    }

    // ----- routes -----

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
        self.router.map(methods, pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidActionReference`] for malformed references.
    pub fn map_to(
        &mut self,
        methods: &[Method],
        pattern: &str,
        reference: &str,
    ) -> Result<RouteHandle<'_>, FrameworkError> {
        self.router.map_to(methods, pattern, reference)
    }

    /// # Errors
    ///
    /// As [`Router::add_route`].
    pub fn add_route(&mut self, route: Route) -> Result<RouteHandle<'_>, FrameworkError> {
        self.router.add_route(route)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn get<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.router.get(pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn post<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.router.post(pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn put<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.router.put(pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn patch<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.router.patch(pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn delete<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.router.delete(pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn options<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.router.options(pattern, f)
    }

    /// # Errors
    ///
    /// [`FrameworkError::InvalidPattern`].
    pub fn any<F, R>(&mut self, pattern: &str, f: F) -> Result<RouteHandle<'_>, FrameworkError>
    where
        F: Fn(&mut Context<'_>) -> Flow<R> + Send + Sync + 'static,
        R: IntoHandled,
    {
        self.router.any(pattern, f)
    }

    /// Register routes sharing a prefix, domain, namespace and middleware.
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
        self.router.group(spec, middleware, routes)
    }

    // ----- middleware, hooks, handlers -----

    /// Wrap the application in another middleware layer; it becomes the outermost one.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::DuplicateMiddleware`] when this instance was already added.
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) -> Result<(), FrameworkError> {
        self.middleware.push(middleware).map(|_| ())
    }

    /// Middleware names, outermost first.
    #[must_use]
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middleware.names()
    }

    pub fn hook<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Context<'_>) -> Flow + Send + Sync + 'static,
    {
        self.hooks.hook(name, DEFAULT_PRIORITY, f);
    }

    /// Lower priorities run first.
    pub fn hook_with_priority<F>(&mut self, name: &str, priority: i32, f: F)
    where
        F: Fn(&mut Context<'_>) -> Flow + Send + Sync + 'static,
    {
        self.hooks.hook(name, priority, f);
    }

    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    /// Replace the default 404 page.
    pub fn not_found<F>(&mut self, f: F)
    where
        F: Fn(&mut Context<'_>) -> Flow + Send + Sync + 'static,
    {
        self.not_found = Some(Arc::new(f));
    }

    /// Replace the generic 500 page shown outside debug mode.
    pub fn error<F>(&mut self, f: F)
    where
        F: Fn(&mut Context<'_>, &FaultReport) -> String + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(f));
    }

    pub(crate) fn error_handler(&self) -> Option<&Arc<ErrorHandlerFn>> {
        self.error_handler.as_ref()
    }

    // ----- lifecycle -----

    /// Serve one request.
    ///
    /// Runs the `before` hook, starts the session (HTTP only), invokes the middleware
    /// chain, flushes session and cookies, finalizes the response and runs the `after`
    /// hook. Faults and panics become a 500 response; nothing escapes this call.
    pub fn run(&self, env: Environment) -> FinalizedResponse {
        handler::install_panic_hook();
        let started = Instant::now();
        let mut ctx = Context::new(self, env);

        let outcome = handler::catch(|| self.process(&mut ctx));
        let fault = match outcome {
            Ok(Ok(()) | Err(Signal::Stop)) => None,
            Ok(Err(Signal::Pass)) => Some(FaultReport::from_error(&anyhow::anyhow!(
                "pass signal raised outside route dispatch"
            ))),
            Ok(Err(Signal::Fault(err))) => Some(FaultReport::from_error(&err)),
            Err(report) => Some(report),
        };
        if let Some(report) = fault {
            handler::respond_with_fault(&mut ctx, &report);
        }

        if let Err(err) = ctx.flush_session() {
            error!(request_id = %ctx.request_id(), error = %err, "Failed to save session");
        }
        let response = ctx.finalize();

        match handler::catch(|| self.hooks.apply(AFTER, &mut ctx)) {
            Ok(Ok(()) | Err(Signal::Stop | Signal::Pass)) => {}
            Ok(Err(Signal::Fault(err))) => {
                error!(request_id = %ctx.request_id(), error = %err, "After hook failed");
            }
            Err(report) => {
                error!(request_id = %ctx.request_id(), message = %report.message, "After hook panicked");
            }
        }

        info!(
            request_id = %ctx.request_id(),
            method = %ctx.env().method(),
            path = %ctx.env().resource_uri(),
            status = response.status,
            latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Request served"
        );
        response
    }

    fn process(&self, ctx: &mut Context<'_>) -> Flow {
        self.hooks.apply(BEFORE, ctx)?;
        if ctx.env().interface() == Interface::Http {
            ctx.start_session()?;
        }
        self.middleware.head(self).run(ctx)
    }

    /// Route the request: hooks, matched-route iteration with pass semantics, and the
    /// 404 fallback.
    fn dispatch_routes(&self, ctx: &mut Context<'_>) -> Flow {
        if let Some(flash) = ctx.flash_messages() {
            let messages: serde_json::Map<String, Value> = flash
                .messages()
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            ctx.view_data_mut().set("flash", Value::Object(messages));
        }

        self.hooks.apply(BEFORE_ROUTER, ctx)?;

        let method = Method::from_bytes(ctx.env().method().to_ascii_uppercase().as_bytes()).ok();
        let matched = match &method {
            Some(method) => {
                self.router
                    .get_matched_routes(method, ctx.env().resource_uri(), ctx.env().host(), false)
            }
            None => Arc::from(Vec::new()),
        };

        let mut dispatched = false;
        for route in matched.iter() {
            let params = route
                .match_request(ctx.env().resource_uri(), ctx.env().host())
                .unwrap_or_default();
            ctx.enter_route(Arc::clone(route), params);
            match self.attempt(route, ctx) {
                Ok(true) => {
                    dispatched = true;
                    break;
                }
                Ok(false) => debug!(pattern = %route.pattern(), "Route declined"),
                Err(Signal::Pass) => debug!(pattern = %route.pattern(), "Route passed"),
                Err(signal) => return Err(signal),
            }
        }

        self.hooks.apply(AFTER_ROUTER, ctx)?;

        if !dispatched {
            return self.respond_not_found(ctx);
        }
        Ok(())
    }

    fn attempt(&self, route: &Route, ctx: &mut Context<'_>) -> Flow<bool> {
        self.hooks.apply(BEFORE_DISPATCH, ctx)?;
        let handled = route.dispatch(ctx)?;
        self.hooks.apply(AFTER_DISPATCH, ctx)?;
        Ok(handled)
    }

    fn respond_not_found(&self, ctx: &mut Context<'_>) -> Flow {
        ctx.response_mut().set_body("");
        match &self.not_found {
            Some(custom) => match custom(ctx) {
                Ok(()) | Err(Signal::Stop) => {}
                Err(signal) => return Err(signal),
            },
            None => {
                let page = handler::not_found_page(ctx.env().root_uri());
                ctx.response_mut().set_body(page);
            }
        }
        ctx.status(404);
        Err(Signal::Stop)
    }
}

impl Endpoint for Application {
    /// Innermost link of the middleware chain; `Stop` raised while routing ends here.
    fn call(&self, ctx: &mut Context<'_>) -> Flow {
        match self.dispatch_routes(ctx) {
            Err(Signal::Stop) => Ok(()),
            other => other,
        }
    }
}
