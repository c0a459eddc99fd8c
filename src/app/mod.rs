//! # Application Module
//!
//! The request lifecycle: hooks, the middleware chain, route dispatch with `Pass`/`Stop`
//! semantics, the 404 fallback and fault handling.
//!
//! ## Lifecycle
//!
//! ```text
//! run(env)
//!   ├─ hook "before"
//!   ├─ session start (HTTP only)
//!   ├─ middleware chain ─▶ Application::call
//!   │     ├─ flash → view data
//!   │     ├─ hook "before.router"
//!   │     ├─ for each matched route:
//!   │     │     hook "before.dispatch" → route.dispatch() → hook "after.dispatch"
//!   │     │     (Pass or a declining action moves on to the next route)
//!   │     ├─ hook "after.router"
//!   │     └─ nothing dispatched → 404
//!   ├─ session and cookie flush
//!   ├─ finalize
//!   └─ hook "after"
//! ```
//!
//! `Stop` unwinds to the end of the middleware chain and the response is sent as built.
//! Faults and panics are caught once in [`Application::run`] and rendered as a 500 page.
//!
//! ## Example
//!
//! ```rust
//! use brisk::app::{Application, Context};
//! use brisk::server::Environment;
//!
//! let mut app = Application::default();
//! app.get("/hello/:name", |ctx: &mut Context<'_>| {
//!     let greeting = format!("Hello, {}!", ctx.param("name").unwrap_or("world"));
//!     ctx.response_mut().write(&greeting);
//!     Ok(())
//! })
//! .unwrap();
//!
//! let response = app.run(Environment::mock("GET", "/hello/ada"));
//! assert_eq!(response.status, 200);
//! assert_eq!(response.body, "Hello, ada!");
//! ```

mod context;
mod core;
pub mod handler;
pub mod hooks;

pub use context::{Context, CurrentRoute, EtagKind, REQUEST_ID_HEADER};
pub use core::{Application, ErrorHandlerFn, NotFoundFn};
pub use handler::FaultReport;
pub use hooks::{HookFn, HookRegistry};
