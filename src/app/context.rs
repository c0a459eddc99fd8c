use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::Application;
use crate::dispatcher::{Flow, Signal, Target};
use crate::error::FrameworkError;
use crate::ids::RequestId;
use crate::logger::Level;
use crate::middleware::FlashMessages;
use crate::router::{Params, Route};
use crate::server::{http_date, CookieJar, Environment, FinalizedResponse, Response};
use crate::session::Session;
use crate::view::ViewData;

/// Header carrying a caller-supplied request id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Strong or weak entity tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EtagKind {
    #[default]
    Strong,
    Weak,
}

impl FromStr for EtagKind {
    type Err = FrameworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strong" => Ok(EtagKind::Strong),
            "weak" => Ok(EtagKind::Weak),
            _ => Err(FrameworkError::InvalidEtagType(s.to_string())),
        }
    }
}

/// The route being dispatched and the parameters it captured.
#[derive(Debug, Clone)]
pub struct CurrentRoute {
    pub route: Arc<Route>,
    pub params: Params,
}

/// Per-request state threaded through hooks, middleware and actions.
///
/// Owns the request [`Environment`], the [`Response`] under construction, the cookie
/// jar, the session, flash messages, view data and the matched route. The application
/// is borrowed read-only for the lifetime of the request.
pub struct Context<'a> {
    app: &'a Application,
    env: Environment,
    response: Response,
    cookies: CookieJar,
    session: Session,
    flash: Option<FlashMessages>,
    view_data: ViewData,
    route: Option<CurrentRoute>,
    request_id: RequestId,
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("method", &self.env.method())
            .field("path", &self.env.resource_uri())
            .field("status", &self.response.status())
            .finish_non_exhaustive()
    }
}

impl<'a> Context<'a> {
    #[must_use]
    pub fn new(app: &'a Application, env: Environment) -> Self {
        let config = app.config();
        let cookies = CookieJar::from_header(env.header("Cookie"), config.cookies.clone());
        let request_id = RequestId::from_header_or_new(env.header(REQUEST_ID_HEADER));
        Self {
            app,
            response: Response::new(),
            cookies,
            session: Session::new(config.session.clone()),
            flash: None,
            view_data: app.view_data().clone(),
            route: None,
            request_id,
            env,
        }
    }

    /// The application serving this request.
    #[must_use]
    pub fn app(&self) -> &'a Application {
        self.app
    }

    #[must_use]
    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    #[must_use]
    pub fn view_data(&self) -> &ViewData {
        &self.view_data
    }

    pub fn view_data_mut(&mut self) -> &mut ViewData {
        &mut self.view_data
    }

    // ----- route -----

    /// The route currently being dispatched.
    #[must_use]
    pub fn current_route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref().map(|c| &c.route)
    }

    /// Parameters captured by the current route; empty outside dispatch.
    #[must_use]
    pub fn params(&self) -> Params {
        self.route
            .as_ref()
            .map(|c| c.params.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.route.as_ref().and_then(|c| c.params.get(name))
    }

    /// A `:name+` parameter split on `/`.
    #[must_use]
    pub fn param_segments(&self, name: &str) -> Vec<&str> {
        self.route
            .as_ref()
            .map(|c| c.params.segments(name))
            .unwrap_or_default()
    }

    pub(crate) fn enter_route(&mut self, route: Arc<Route>, params: Params) {
        self.route = Some(CurrentRoute { route, params });
    }

    // ----- flash -----

    pub(crate) fn install_flash(&mut self, flash: FlashMessages) {
        self.flash = Some(flash);
    }

    #[must_use]
    pub fn flash_messages(&self) -> Option<&FlashMessages> {
        self.flash.as_ref()
    }

    fn flash_mut(&mut self) -> &mut FlashMessages {
        self.flash.get_or_insert_with(FlashMessages::default)
    }

    /// Queue a message for the next request.
    pub fn flash(&mut self, key: &str, value: impl Into<String>) {
        self.flash_mut().set(key, value);
    }

    /// Show a message on this request only.
    pub fn flash_now(&mut self, key: &str, value: impl Into<String>) {
        self.flash_mut().now(key, value);
    }

    /// Carry this request's messages over to the next one.
    pub fn flash_keep(&mut self) {
        self.flash_mut().keep();
    }

    /// Messages visible to this request.
    #[must_use]
    pub fn flash_data(&self) -> BTreeMap<String, String> {
        self.flash
            .as_ref()
            .map(FlashMessages::messages)
            .unwrap_or_default()
    }

    // ----- control flow -----

    /// Replace status and body, then stop.
    ///
    /// # Errors
    ///
    /// Always [`Signal::Stop`].
    pub fn halt<T>(&mut self, status: u16, body: impl Into<String>) -> Flow<T> {
        self.response.set_status(status);
        self.response.set_body(body);
        Err(Signal::Stop)
    }

    /// Send the response as built so far.
    ///
    /// # Errors
    ///
    /// Always [`Signal::Stop`].
    pub fn stop<T>(&self) -> Flow<T> {
        Err(Signal::Stop)
    }

    /// Give up on the current route and try the next matched one.
    ///
    /// # Errors
    ///
    /// Always [`Signal::Pass`].
    pub fn pass<T>(&self) -> Flow<T> {
        Err(Signal::Pass)
    }

    /// Redirect and stop.
    ///
    /// # Errors
    ///
    /// Always [`Signal::Stop`].
    pub fn redirect<T>(&mut self, url: &str, status: u16) -> Flow<T> {
        self.response.redirect(url, status);
        Err(Signal::Stop)
    }

    /// Redirect to a named route and stop.
    ///
    /// # Errors
    ///
    /// [`Signal::Stop`], or a fault when the route name is unknown.
    pub fn redirect_to<T>(&mut self, name: &str, params: &[(&str, &str)], status: u16) -> Flow<T> {
        let url = self.url_for(name, params)?;
        self.redirect(&url, status)
    }

    /// Raise an application fault.
    ///
    /// # Errors
    ///
    /// Always [`Signal::Fault`].
    pub fn error<T>(&self, err: impl Into<anyhow::Error>) -> Flow<T> {
        Err(Signal::Fault(err.into()))
    }

    // ----- response helpers -----

    pub fn content_type(&mut self, content_type: &str) {
        self.response.set_header("Content-Type", content_type);
    }

    pub fn status(&mut self, status: u16) {
        self.response.set_status(status);
    }

    /// Path of a named route, prefixed with the application root.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::UnknownRoute`].
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, FrameworkError> {
        let path = self.app.router().url_for(name, params)?;
        Ok(format!("{}{path}", self.env.root_uri()))
    }

    /// Set `ETag` and stop with 304 when the client already has this version.
    ///
    /// # Errors
    ///
    /// [`Signal::Stop`] on a matching `If-None-Match`.
    pub fn etag(&mut self, value: &str, kind: EtagKind) -> Flow {
        let tag = match kind {
            EtagKind::Strong => format!("\"{value}\""),
            EtagKind::Weak => format!("W/\"{value}\""),
        };
        self.response.set_header("ETag", tag.as_str());
        let matched = self.env.header("If-None-Match").is_some_and(|header| {
            header
                .split(',')
                .map(str::trim)
                .any(|candidate| candidate == tag || candidate == "*")
        });
        if matched {
            return self.halt(304, "");
        }
        Ok(())
    }

    /// Set `Last-Modified` and stop with 304 when `If-Modified-Since` names the same time.
    ///
    /// # Errors
    ///
    /// [`Signal::Stop`] on a matching `If-Modified-Since`.
    pub fn last_modified(&mut self, unix: i64) -> Flow {
        self.response.set_header("Last-Modified", http_date(unix));
        let since = self
            .env
            .header("If-Modified-Since")
            .and_then(|h| chrono::DateTime::parse_from_rfc2822(h.trim()).ok())
            .map(|t| t.timestamp());
        if since == Some(unix) {
            return self.halt(304, "");
        }
        Ok(())
    }

    pub fn expires(&mut self, unix: i64) {
        self.response.set_header("Expires", http_date(unix));
    }

    // ----- views -----

    /// Render a template and append it to the response body.
    ///
    /// # Errors
    ///
    /// A fault when the template cannot be rendered.
    pub fn render(&mut self, template: &str, data: Value) -> Flow {
        let body = self.fetch(template, data)?;
        self.response.write(&body);
        Ok(())
    }

    /// Render a template to a string.
    ///
    /// # Errors
    ///
    /// Missing templates and template errors.
    pub fn fetch(&self, template: &str, data: Value) -> anyhow::Result<String> {
        let merged = self.view_data.merged(data);
        self.app.view().render(template, &merged)
    }

    /// `controller.action` for controller routes, lowercased.
    #[must_use]
    pub fn default_template(&self) -> Option<String> {
        match self.current_route()?.target() {
            Target::Controller { controller, action } => Some(format!(
                "{}.{}",
                controller.to_lowercase(),
                action.to_lowercase()
            )),
            Target::Callable(_) => None,
        }
    }

    /// Write to the framework log, prefixed with time, client address and URI.
    pub fn log(&self, level: Level, message: &str) {
        let line = format!(
            "[{}] {} {}\r\n{message}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.env.ip().unwrap_or("-"),
            self.env.path(),
        );
        self.app.log().write(&line, level, None);
    }

    // ----- lifecycle -----

    pub(crate) fn start_session(&mut self) -> anyhow::Result<()> {
        self.session.start(self.app.sessions(), &self.cookies)
    }

    pub(crate) fn flush_session(&mut self) -> anyhow::Result<()> {
        self.session.flush(self.app.sessions(), &mut self.cookies)
    }

    /// Freeze the response: add cookies and drop the body of HEAD requests.
    pub(crate) fn finalize(&mut self) -> FinalizedResponse {
        for cookie in self.cookies.set_cookie_headers() {
            self.response.append_header("Set-Cookie", cookie);
        }
        let mut finalized = self.response.finalize();
        let head = self
            .env
            .original_method()
            .unwrap_or(self.env.method())
            .eq_ignore_ascii_case("HEAD");
        if head {
            finalized.body.clear();
        }
        finalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_kind_parse() {
        assert_eq!("weak".parse::<EtagKind>().unwrap(), EtagKind::Weak);
        assert_eq!("Strong".parse::<EtagKind>().unwrap(), EtagKind::Strong);
        assert_eq!(
            "medium".parse::<EtagKind>(),
            Err(FrameworkError::InvalidEtagType("medium".into()))
        );
    }

    #[test]
    fn test_etag_not_modified() {
        let app = Application::default();
        let env = Environment::mock("GET", "/").with_header("If-None-Match", "\"abc\"");
        let mut ctx = Context::new(&app, env);
        assert!(matches!(ctx.etag("abc", EtagKind::Strong), Err(Signal::Stop)));
        assert_eq!(ctx.response().status(), 304);

        let mut ctx = Context::new(&app, Environment::mock("GET", "/"));
        assert!(ctx.etag("abc", EtagKind::Weak).is_ok());
        assert_eq!(ctx.response().header("ETag"), Some("W/\"abc\""));
    }

    #[test]
    fn test_last_modified_not_modified() {
        let app = Application::default();
        let stamp = 784_111_777;
        let env = Environment::mock("GET", "/").with_header("If-Modified-Since", http_date(stamp));
        let mut ctx = Context::new(&app, env);
        assert!(matches!(ctx.last_modified(stamp), Err(Signal::Stop)));
        assert_eq!(ctx.response().status(), 304);
    }

    #[test]
    fn test_flash_without_middleware() {
        let app = Application::default();
        let mut ctx = Context::new(&app, Environment::mock("GET", "/"));
        ctx.flash_now("info", "hi");
        assert_eq!(ctx.flash_data().get("info").map(String::as_str), Some("hi"));
    }

    #[test]
    fn test_halt_sets_status_and_body() {
        let app = Application::default();
        let mut ctx = Context::new(&app, Environment::mock("GET", "/"));
        let flow: Flow = ctx.halt(403, "nope");
        assert!(matches!(flow, Err(Signal::Stop)));
        assert_eq!(ctx.response().status(), 403);
        assert_eq!(ctx.response().body(), "nope");
    }
}
