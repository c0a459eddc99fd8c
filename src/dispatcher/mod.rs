//! # Dispatcher Module
//!
//! Control-flow values and action plumbing shared by routes, middleware and the
//! application lifecycle.
//!
//! ## Overview
//!
//! Every piece of user code in the pipeline returns a [`Flow`]. The `Err` side is a
//! [`Signal`]:
//!
//! - [`Signal::Pass`] abandons the current route attempt; the application moves on to the
//!   next matched route.
//! - [`Signal::Stop`] ends processing; the response built so far is sent.
//! - [`Signal::Fault`] carries an application error up to the exception boundary.
//!
//! Actions are either closures ([`Target::Callable`]) or `Controller@action` references
//! ([`Target::Controller`]) resolved through an [`ActionRegistry`].
//!
//! ## Example
//!
//! ```rust
//! use brisk::app::Context;
//! use brisk::dispatcher::{ActionRegistry, Flow};
//!
//! let mut actions = ActionRegistry::new();
//! actions
//!     .register("Users@show", |ctx: &mut Context<'_>| -> Flow {
//!         let id = ctx.param("id").unwrap_or("unknown").to_string();
//!         ctx.response_mut().write(&format!("user {id}"));
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(actions.len(), 1);
//! ```

mod core;

pub use core::{
    action, route_middleware, ActionFn, ActionRegistry, Flow, IntoHandled, RouteMiddlewareFn,
    Signal, Target,
};
