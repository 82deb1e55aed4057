//! Request context for correlation and tracing.
//!
//! A [`RequestContext`] is created by whatever front end handles an inbound
//! request (HTTP middleware, a CLI command) and carries the facts the audit
//! log records about that request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request context for correlation across operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// Session identifier, if the caller has one.
    pub session_id: Option<String>,
    /// Authenticated user, if any.
    pub user_id: Option<String>,
    /// Client address.
    pub ip_address: Option<String>,
    /// Client `User-Agent`.
    pub user_agent: Option<String>,
    /// Full request URL.
    pub url: Option<String>,
    /// Matched route name or pattern.
    pub route: Option<String>,
    /// HTTP method.
    pub method: Option<String>,
    /// When the request started.
    pub started_at: DateTime<Utc>,
    /// Component that created this context (`"http"`, `"console"`).
    pub source: String,
}

impl RequestContext {
    /// Create a new request context.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            session_id: None,
            user_id: None,
            ip_address: None,
            user_agent: None,
            url: None,
            route: None,
            method: None,
            started_at: Utc::now(),
            source: source.into(),
        }
    }

    /// Set the session ID.
    #[must_use]
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Set the user ID.
    #[must_use]
    pub fn with_user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    /// Set the client address and user agent.
    #[must_use]
    pub fn with_client(mut self, ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set method, URL and matched route.
    #[must_use]
    pub fn with_http(
        mut self,
        method: impl Into<String>,
        url: impl Into<String>,
        route: Option<String>,
    ) -> Self {
        self.method = Some(method.into());
        self.url = Some(url.into());
        self.route = route;
        self
    }

    /// Milliseconds since the request started. Clock skew yields 0.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        u64::try_from(elapsed.num_milliseconds()).unwrap_or(0)
    }

    /// Create a tracing span with this context.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            source = %self.source,
            method = self.method.as_deref(),
            route = self.route.as_deref(),
        )
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_context_creation() {
        let ctx = RequestContext::new("http");
        assert_eq!(ctx.source, "http");
        assert!(ctx.session_id.is_none());
    }

    #[test]
    fn test_request_context_builder() {
        let ctx = RequestContext::new("http")
            .with_session_id("sess-1")
            .with_user_id("42")
            .with_client("10.0.0.1", "curl/8.0")
            .with_http("PATCH", "https://admin.example/users/7", Some("users.update".into()));

        assert_eq!(ctx.session_id.as_deref(), Some("sess-1"));
        assert_eq!(ctx.user_id.as_deref(), Some("42"));
        assert_eq!(ctx.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(ctx.method.as_deref(), Some("PATCH"));
        assert_eq!(ctx.route.as_deref(), Some("users.update"));
        assert_eq!(ctx.url.as_deref(), Some("https://admin.example/users/7"));
    }

    #[test]
    fn test_elapsed() {
        let ctx = RequestContext::new("test");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(ctx.elapsed_ms() >= 10);
    }

    #[test]
    fn test_elapsed_future_start_is_zero() {
        let mut ctx = RequestContext::new("test");
        ctx.started_at = Utc::now()
            .checked_add_signed(chrono::Duration::seconds(60))
            .unwrap();
        assert_eq!(ctx.elapsed_ms(), 0);
    }

    #[test]
    fn test_serialization() {
        let ctx = RequestContext::new("http").with_user_id("42");
        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"source\":\"http\""));

        let parsed: RequestContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request_id, ctx.request_id);
    }
}
