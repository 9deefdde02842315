// Toolgate - Dispatcher
//
// The admission-control state machine. One call walks
// RECEIVED -> AUTHORIZED -> ADMITTED -> EXECUTING -> SUCCEEDED/FAILED,
// and exactly one result or error comes out. Ordering is fixed:
// the RequestEvent is recorded unconditionally and first, then the
// allow-list, then the rate limit, then registry lookup and timed
// execution. Rejected calls never reach a handler; handler errors
// never escape the dispatcher.

use crate::metrics::MetricsRecorder;
use crate::ratelimit::RateLimiter;
use crate::registry::{ToolError, ToolRegistry};
use crate::security::AccessPolicy;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// JSON-RPC error codes used on the wire
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
pub const CODE_INTERNAL_ERROR: i64 = -32603;

/// Terminal outcomes of the admission pipeline
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Tool '{0}' is not allowed")]
    Unauthorized(String),

    #[error("Rate limit exceeded for tool '{0}'")]
    RateLimited(String),

    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("{0}")]
    Handler(#[from] ToolError),
}

impl DispatchError {
    /// Wire code: unknown tool maps to method-not-found, everything
    /// else is funneled through internal-error on the minimal
    /// transport.
    pub fn code(&self) -> i64 {
        match self {
            DispatchError::NotFound(_) => CODE_METHOD_NOT_FOUND,
            _ => CODE_INTERNAL_ERROR,
        }
    }
}

/// Stateless, re-entrant request dispatcher. The policy, limiter,
/// recorder and registry are shared across all connections.
pub struct Dispatcher {
    policy: Arc<AccessPolicy>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsRecorder>,
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(
        policy: Arc<AccessPolicy>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<MetricsRecorder>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            policy,
            limiter,
            metrics,
            registry,
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// tools/list: record the request and return the catalog
    pub fn list_tools(&self) -> Vec<Value> {
        self.metrics.record_request("list_tools", None);
        self.registry.catalog().iter().map(|d| d.to_json()).collect()
    }

    /// tools/call: run one tool through the full pipeline
    pub fn call_tool(&self, name: &str, args: &Value) -> Result<Value, DispatchError> {
        let start = Instant::now();

        // Request recording happens unconditionally and first
        self.metrics.record_request("call_tool", Some(name));

        // RECEIVED -> AUTHORIZED. A name nobody has ever heard of is
        // method-not-found; a registered tool taken off the allow-list
        // is unauthorized.
        if !self.policy.is_tool_allowed(name) {
            let err = if self.registry.resolve(name).is_none() {
                DispatchError::NotFound(name.to_string())
            } else {
                DispatchError::Unauthorized(name.to_string())
            };
            self.record_rejection(name, &err, start);
            return Err(err);
        }

        // AUTHORIZED -> ADMITTED
        if !self.limiter.check(name) {
            let err = DispatchError::RateLimited(name.to_string());
            self.record_rejection(name, &err, start);
            return Err(err);
        }

        // ADMITTED -> EXECUTING
        let handler = match self.registry.resolve(name) {
            Some(h) => h,
            None => {
                let err = DispatchError::NotFound(name.to_string());
                self.record_rejection(name, &err, start);
                return Err(err);
            }
        };

        match handler.call(name, args) {
            Ok(result) => {
                let elapsed = start.elapsed().as_secs_f64();
                self.metrics.record_success("call_tool", Some(name), elapsed);
                log::debug!("tool {} succeeded in {:.3}s", name, elapsed);
                Ok(result)
            }
            Err(err) => {
                let elapsed = start.elapsed().as_secs_f64();
                self.metrics
                    .record_error("call_tool", Some(name), &err.to_string(), elapsed);
                log::warn!("tool {} failed after {:.3}s: {}", name, elapsed, err);
                Err(DispatchError::Handler(err))
            }
        }
    }

    fn record_rejection(&self, name: &str, err: &DispatchError, start: Instant) {
        let elapsed = start.elapsed().as_secs_f64();
        self.metrics
            .record_error("call_tool", Some(name), &err.to_string(), elapsed);
        log::warn!("tool {} rejected: {}", name, err);
    }
}

// ============================================================================
// TESTS
// ============================================================================
