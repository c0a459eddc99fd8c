use std::time::Instant;

use tracing::{field, info, info_span, warn};

use super::{Middleware, Next};
use crate::app::Context;
use crate::dispatcher::{Flow, Signal};

/// Wraps the rest of the chain in a `request` span and logs status and latency.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn name(&self) -> &'static str {
        "Tracing"
    }

    fn call(&self, ctx: &mut Context<'_>, next: Next<'_>) -> Flow {
        let span = info_span!(
            "request",
            request_id = %ctx.request_id(),
            method = %ctx.env().method(),
            path = %ctx.env().resource_uri(),
            status = field::Empty,
            latency_ms = field::Empty,
        );
        let started = Instant::now();
        let result = span.in_scope(|| next.run(ctx));
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = ctx.response().status();
        span.record("status", status);
        span.record("latency_ms", latency_ms);

        let _entered = span.enter();
        match &result {
            Err(Signal::Fault(err)) => warn!(error = %err, latency_ms, "Request failed"),
            _ => info!(status, latency_ms, "Request completed"),
        }
        result
    }
}
