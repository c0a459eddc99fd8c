//! # Router Module
//!
//! The router keeps the ordered route table and resolves a request's
//! `(method, path, host)` to the list of routes that should be tried.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Registering routes, directly or through groups that share a prefix, domain,
//!   namespace and middleware
//! - Compiling route patterns into matchers on first use
//! - Resolving candidate routes for a request, first match or all matches
//! - Building URLs for named routes
//!
//! ## Pattern Syntax
//!
//! | pattern | matches | params |
//! |---------|---------|--------|
//! | `/posts/:id` | `/posts/42` | `id = "42"` |
//! | `/posts(/:id)` | `/posts`, `/posts/42` | `id` only when present |
//! | `/archive(/:year(/:month))` | `/archive`, `/archive/2024`, `/archive/2024/05` | nested optionals |
//! | `/files/:path+` | `/files/a/b/c` | `path = "a/b/c"`, segments `["a", "b", "c"]` |
//! | `/users/` | `/users`, `/users/` | trailing slash is optional |
//!
//! Other characters are literal, so `/report.json` does not match `/reportxjson`.
//! Parameters can be constrained with regex conditions (`id` → `\d+`).
//!
//! ## Example
//!
//! ```rust
//! use brisk::app::Context;
//! use brisk::dispatcher::Flow;
//! use brisk::router::Router;
//! use http::Method;
//!
//! let mut router = Router::default();
//! router
//!     .get("/posts(/:id)", |_ctx: &mut Context<'_>| -> Flow { Ok(()) })
//!     .unwrap()
//!     .name("post")
//!     .unwrap();
//!
//! let matched = router.get_matched_routes(&Method::GET, "/posts/7", "localhost", false);
//! assert_eq!(matched.len(), 1);
//! assert_eq!(router.url_for("post", &[("id", "7")]).unwrap(), "/posts/7");
//! assert_eq!(router.url_for("post", &[]).unwrap(), "/posts");
//! ```

mod core;
mod group;
mod route;
#[cfg(test)]
mod tests;

pub use core::{MatchedRoutes, RouteHandle, Router};
pub use group::GroupSpec;
pub use route::{Params, ParamVec, Route, ANY_METHOD, MAX_INLINE_PARAMS};
