//! Fault capture and the built-in pages.
//!
//! Faults reach the outermost boundary either as [`Signal::Fault`](crate::dispatcher::Signal)
//! or as a panic. Both are turned into a [`FaultReport`], logged once, and rendered as a
//! 500 page: the debug page in debug mode, otherwise the custom error handler or the
//! generic page.

use askama::Template;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use tracing::{error, warn};

use super::Context;
use crate::error::FrameworkError;
use crate::logger::Level;

/// Everything known about a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultReport {
    /// `Error`, `FrameworkError`, `Panic`, ...
    pub kind: String,
    pub code: Option<String>,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    /// Cause chain followed by backtrace frames when one was captured.
    pub trace: Vec<String>,
}

impl FaultReport {
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        let (kind, code) = match err.downcast_ref::<FrameworkError>() {
            Some(framework) => ("FrameworkError", Some(variant_name(framework))),
            None => ("Error", None),
        };
        let mut trace: Vec<String> = err
            .chain()
            .skip(1)
            .map(|cause| format!("caused by: {cause}"))
            .collect();
        trace.extend(backtrace_lines(err.backtrace()));
        Self {
            kind: kind.to_string(),
            code,
            message: err.to_string(),
            file: None,
            line: None,
            trace,
        }
    }

    fn from_panic(payload: &(dyn Any + Send), site: Option<PanicSite>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_string());
        let (file, line, trace) = match site {
            Some(site) => (Some(site.file), Some(site.line), site.trace),
            None => (None, None, Vec::new()),
        };
        Self {
            kind: "Panic".to_string(),
            code: None,
            message,
            file,
            line,
            trace,
        }
    }

    /// One log record: kind, code, message, location, then the trace.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = self.kind.clone();
        if let Some(code) = &self.code {
            out.push_str(&format!(" [{code}]"));
        }
        out.push_str(&format!(": {}", self.message));
        if let Some(file) = &self.file {
            out.push_str(&format!(" at {file}:{}", self.line.unwrap_or(0)));
        }
        for frame in &self.trace {
            out.push_str("\r\n");
            out.push_str(frame);
        }
        out
    }
}

fn variant_name(err: &FrameworkError) -> String {
    let debug = format!("{err:?}");
    debug
        .split(|c: char| c == '(' || c == '{' || c == ' ')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn backtrace_lines(backtrace: &Backtrace) -> Vec<String> {
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    backtrace
        .to_string()
        .lines()
        .map(|l| l.trim_end().to_string())
        .collect()
}

// ----- panics -----

struct PanicSite {
    file: String,
    line: u32,
    trace: Vec<String>,
}

thread_local! {
    static CATCHING: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Record panic locations while inside [`catch`]; defer to the previous hook elsewhere.
pub(crate) fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CATCHING.with(Cell::get) {
                let site = PanicSite {
                    file: info.location().map(|l| l.file().to_string()).unwrap_or_default(),
                    line: info.location().map_or(0, |l| l.line()),
                    trace: backtrace_lines(&Backtrace::capture()),
                };
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(site));
            } else {
                previous(info);
            }
        }));
    });
}

/// Run `f`, turning a panic into a [`FaultReport`].
pub(crate) fn catch<T>(f: impl FnOnce() -> T) -> Result<T, FaultReport> {
    let outer = CATCHING.with(|c| c.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CATCHING.with(|c| c.set(outer));
    result.map_err(|payload| {
        let site = LAST_PANIC.with(|slot| slot.borrow_mut().take());
        FaultReport::from_panic(&*payload, site)
    })
}

// ----- pages -----

#[derive(Template)]
#[template(path = "not_found.html")]
struct NotFoundPage<'a> {
    home: &'a str,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorPage<'a> {
    title: &'a str,
}

#[derive(Template)]
#[template(path = "debug.html")]
struct DebugPage<'a> {
    title: &'a str,
    kind: &'a str,
    code: &'a str,
    message: &'a str,
    file: &'a str,
    line: String,
    trace: &'a [String],
}

const ERROR_TITLE: &str = "Application Error";

/// Default 404 body linking back to the application root.
#[must_use]
pub fn not_found_page(root_uri: &str) -> String {
    NotFoundPage { home: root_uri }.render().unwrap_or_else(|err| {
        warn!(error = %err, "Failed to render 404 page");
        "404 Page Not Found".to_string()
    })
}

/// Generic 500 body without fault details.
#[must_use]
pub fn error_page() -> String {
    ErrorPage { title: ERROR_TITLE }.render().unwrap_or_else(|err| {
        warn!(error = %err, "Failed to render error page");
        ERROR_TITLE.to_string()
    })
}

/// 500 body with type, code, message, location and trace.
#[must_use]
pub fn debug_page(report: &FaultReport) -> String {
    let page = DebugPage {
        title: ERROR_TITLE,
        kind: &report.kind,
        code: report.code.as_deref().unwrap_or_default(),
        message: &report.message,
        file: report.file.as_deref().unwrap_or_default(),
        line: report.line.map(|l| l.to_string()).unwrap_or_default(),
        trace: &report.trace,
    };
    page.render().unwrap_or_else(|err| {
        warn!(error = %err, "Failed to render debug page");
        report.summary()
    })
}

/// Log `report` and replace the response with a 500 page.
pub(crate) fn respond_with_fault(ctx: &mut Context<'_>, report: &FaultReport) {
    ctx.log(Level::Error, &report.summary());
    error!(
        request_id = %ctx.request_id(),
        kind = %report.kind,
        code = ?report.code,
        message = %report.message,
        file = ?report.file,
        line = ?report.line,
        "Request fault"
    );

    let app = ctx.app();
    let body = if app.config().debug {
        debug_page(report)
    } else if let Some(handler) = app.error_handler() {
        match catch(|| handler(ctx, report)) {
            Ok(body) => body,
            Err(nested) => {
                error!(message = %nested.message, "Error handler panicked");
                error_page()
            }
        }
    } else {
        error_page()
    };

    let response = ctx.response_mut();
    response.set_status(500);
    response.set_header("Content-Type", "text/html");
    response.set_body(body);
}
