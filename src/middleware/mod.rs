//! # Middleware Module
//!
//! Application-wide middleware arranged as an onion around the application core.
//!
//! ## Overview
//!
//! The [`MiddlewareStack`] is an ordered list whose head is the outermost layer. Adding
//! a middleware puts it at the head, so the most recently added one runs first. The
//! application is the permanent tail, reached when the last layer calls
//! [`Next::run`].
//!
//! ```text
//!   B (added last) ─▶ A ─▶ Flash ─▶ MethodOverride ─▶ Application::call
//! ```
//!
//! Each layer may:
//! - inspect or change the request context before delegating
//! - skip `next` entirely and answer the request itself
//! - look at the response after the inner layers have run
//!
//! The same instance may not be queued twice; two instances of one type are fine.
//!
//! ## Built-in Middleware
//!
//! - [`FlashMiddleware`] - flash messages carried across requests in the session
//! - [`MethodOverride`] - `X-HTTP-Method-Override` header or `_METHOD` form field
//! - [`TracingMiddleware`] - request span with status and latency
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use brisk::app::{Application, Context};
//! use brisk::dispatcher::Flow;
//! use brisk::middleware::{Middleware, Next};
//!
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn call(&self, ctx: &mut Context<'_>, next: Next<'_>) -> Flow {
//!         let result = next.run(ctx);
//!         ctx.response_mut().set_header("X-Powered-By", "my-app");
//!         result
//!     }
//! }
//!
//! let mut app = Application::default();
//! app.add_middleware(Arc::new(PoweredBy)).unwrap();
//! ```

mod core;
mod flash;
mod method_override;
mod tracing;

pub use core::{Endpoint, Middleware, MiddlewareId, MiddlewareStack, Next};
pub use flash::{FlashMessages, FlashMiddleware, DEFAULT_FLASH_KEY};
pub use method_override::{MethodOverride, OVERRIDE_HEADER};
pub use tracing::TracingMiddleware;
