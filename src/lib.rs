//! # brisk
//!
//! **brisk** is a small synchronous web framework: pattern routing with named and
//! optional segments, an onion of application middleware, lifecycle hooks, sessions,
//! signed cookies, flash messages and templated views.
//!
//! ## Architecture
//!
//! - **[`router`]** - routes, groups, named routes and matched-route resolution
//! - **[`dispatcher`]** - control-flow signals (`Pass`, `Stop`, faults) and action targets
//! - **[`middleware`]** - the application middleware chain and built-in layers
//! - **[`app`]** - the [`Application`](app::Application), per-request
//!   [`Context`](app::Context), hooks and fault pages
//! - **[`server`]** - request environment, response, cookies and the `tiny_http` transport
//! - **[`session`]** - session stores and the per-request session
//! - **[`view`]** - template rendering through `minijinja`
//! - **[`config`]** - YAML/TOML configuration with environment overrides
//! - **[`logger`]** / **[`logging`]** - framework log files and the `tracing` subscriber
//!
//! ## Request Flow
//!
//! ```text
//! HttpServer ─▶ Application::run ─▶ hook "before" ─▶ session start
//!            ─▶ middleware (outermost first) ─▶ Application::call
//!            ─▶ Router::get_matched_routes ─▶ Route::dispatch (Pass tries the next)
//!            ─▶ 404 if nothing handled ─▶ session/cookie flush ─▶ hook "after"
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brisk::app::{Application, Context};
//! use brisk::server::Environment;
//!
//! let mut app = Application::default();
//! app.get("/posts(/:id)", |ctx: &mut Context<'_>| {
//!     let body = match ctx.param("id") {
//!         Some(id) => format!("post {id}"),
//!         None => "all posts".to_string(),
//!     };
//!     ctx.response_mut().write(&body);
//!     Ok(())
//! })
//! .unwrap();
//!
//! assert_eq!(app.run(Environment::mock("GET", "/posts/7")).body, "post 7");
//! assert_eq!(app.run(Environment::mock("GET", "/posts")).body, "all posts");
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod logger;
pub mod logging;
pub mod middleware;
pub mod router;
pub mod server;
pub mod session;
pub mod view;

pub use app::{Application, Context};
pub use dispatcher::{Flow, Signal};
pub use error::FrameworkError;
