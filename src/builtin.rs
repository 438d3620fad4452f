//! Built-in guard and interceptor.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::McpError;
use crate::pipeline::{ExecutionContext, Guard, Interceptor, Next};

/// Fixed-window rate limiter keyed by operation (`tool:search`, ...).
///
/// Windows are reset lazily on the first call after they expire.
pub struct RateLimitGuard {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

struct Window {
    count: u32,
    reset_at: Instant,
}

impl RateLimitGuard {
    pub fn new(limit: u32, window: Duration) -> Self {
        RateLimitGuard {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one call for `key`, failing once the window is exhausted.
    pub fn check(&self, key: &str) -> Result<(), McpError> {
        let now = Instant::now();
        let mut windows = self.windows.lock();

        let window = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });
        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window;
        }

        if window.count >= self.limit {
            let remaining = window.reset_at.saturating_duration_since(now);
            let retry_after = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            tracing::debug!(key, limit = self.limit, retry_after, "rate limit exceeded");
            return Err(McpError::RateLimit {
                message: format!(
                    "Rate limit exceeded: {} requests per {}s",
                    self.limit,
                    self.window.as_secs()
                ),
                retry_after: retry_after.max(1),
                limit: self.limit,
            });
        }

        window.count += 1;
        Ok(())
    }
}

#[async_trait]
impl Guard for RateLimitGuard {
    async fn can_activate(&self, ctx: &ExecutionContext) -> Result<bool, McpError> {
        self.check(&ctx.operation_key())?;
        Ok(true)
    }
}

/// Fails the invocation with a Timeout error if the rest of the chain does
/// not finish within `duration`. The pending handler future is dropped.
pub struct TimeoutInterceptor {
    duration: Duration,
}

impl TimeoutInterceptor {
    pub fn new(duration: Duration) -> Self {
        TimeoutInterceptor { duration }
    }
}

#[async_trait]
impl Interceptor for TimeoutInterceptor {
    async fn intercept(&self, ctx: &ExecutionContext, next: Next) -> Result<Value, McpError> {
        match tokio::time::timeout(self.duration, next.run(ctx)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    op = %ctx.operation_key(),
                    timeout = ?self.duration,
                    "operation timed out"
                );
                Err(McpError::Timeout(format!(
                    "Operation timed out after {}ms",
                    self.duration.as_millis()
                )))
            }
        }
    }
}
