//! Configuration-time errors raised by the framework itself.
//!
//! Request-time failures from application code travel as [`anyhow::Error`] inside
//! [`Signal::Fault`](crate::dispatcher::Signal::Fault); the variants here describe
//! mistakes in how the application was wired up (duplicate names, circular
//! middleware, bad patterns) and are returned at registration time.

use thiserror::Error;

/// Errors returned while configuring an application or resolving routes by name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameworkError {
    /// A second route tried to claim a name that is already indexed.
    #[error("named route already exists with name: {0}")]
    DuplicateRouteName(String),

    /// `url_for` / `redirect_to` was asked for a name nobody registered.
    #[error("named route not found for name: {0}")]
    UnknownRoute(String),

    /// The same middleware instance was queued twice.
    #[error(
        "circular middleware setup detected: tried to queue the same middleware instance ({0}) twice"
    )]
    DuplicateMiddleware(String),

    /// `etag` was called with something other than `strong` or `weak`.
    #[error("invalid etag type `{0}`, expected \"strong\" or \"weak\"")]
    InvalidEtagType(String),

    /// A route pattern (or domain pattern) could not be compiled into a matcher.
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A route was registered without any method (and without `ANY`).
    #[error("route `{0}` accepts no HTTP method")]
    NoMethods(String),

    /// A per-parameter condition is not a valid regular expression.
    #[error("invalid condition for route parameter `{param}`: {reason}")]
    InvalidCondition { param: String, reason: String },

    /// A controller reference did not have the `Controller@action` shape.
    #[error("invalid action reference `{0}`, expected `Controller@action`")]
    InvalidActionReference(String),

    /// A route points at a controller action that was never registered.
    #[error("no action registered for `{0}`")]
    UnresolvedAction(String),

    /// Configuration files must be YAML or TOML.
    #[error("unsupported configuration format: {0}")]
    UnsupportedConfigFormat(String),
}
