//! Rate/Retry Governor
//!
//! Gates every remote call of one sync session: a hard request ceiling,
//! minimum spacing between requests, bounded retries with backoff, and a
//! session-wide block once the token has been rejected.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::client::{ApiError, ApiRequest, TesoteClient};
use crate::domain::SyncContext;
use crate::sync::SyncError;

/// Retries after a server error, timeout or connection failure
pub const MAX_RETRIES: u32 = 2;

/// Limits applied to one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernorPolicy {
    /// Requests allowed per session, retries included
    pub max_requests: u32,
    pub min_spacing: Duration,
    pub max_retries: u32,
    /// First backoff delay, doubled per retry
    pub backoff_base: Duration,
    pub max_rate_limit_retries: u32,
    /// Delay after a 429 without `Retry-After`
    pub rate_limit_backoff: Duration,
    /// Upper bound on an honored `Retry-After`
    pub max_retry_after: Duration,
}

impl Default for GovernorPolicy {
    fn default() -> Self {
        Self {
            max_requests: 20,
            min_spacing: Duration::from_secs(1),
            max_retries: MAX_RETRIES,
            backoff_base: Duration::from_secs(2),
            max_rate_limit_retries: 2,
            rate_limit_backoff: Duration::from_secs(5),
            max_retry_after: Duration::from_secs(30),
        }
    }
}

/// Ephemeral per-invocation counters. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct SyncSession {
    pub request_count: u32,
    pub last_request_at: Option<Instant>,
    pub auth_failed: bool,
}

/// Where the governor is in its call cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernorState {
    Idle,
    Throttling,
    InFlight,
    Success,
    Retryable,
    Fatal,
}

/// Per-session gate in front of the client
pub struct RateGovernor {
    client: Arc<TesoteClient>,
    policy: GovernorPolicy,
    session: SyncSession,
    state: GovernorState,
}

impl RateGovernor {
    pub fn new(client: Arc<TesoteClient>, policy: GovernorPolicy) -> Self {
        Self {
            client,
            policy,
            session: SyncSession::default(),
            state: GovernorState::Idle,
        }
    }

    pub fn state(&self) -> GovernorState {
        self.state
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    pub fn policy(&self) -> &GovernorPolicy {
        &self.policy
    }

    /// Start a fresh session, clearing counters and the auth block
    pub fn reset_session(&mut self) {
        self.session = SyncSession::default();
        self.state = GovernorState::Idle;
    }

    /// Execute one logical call, retrying within policy.
    pub async fn execute(
        &mut self,
        request: &ApiRequest,
        ctx: &SyncContext,
    ) -> Result<Value, SyncError> {
        if self.session.auth_failed {
            self.state = GovernorState::Fatal;
            return Err(SyncError::PermanentAuth);
        }

        let mut retries = 0u32;
        let mut rate_limit_retries = 0u32;

        loop {
            if self.session.request_count >= self.policy.max_requests {
                self.state = GovernorState::Fatal;
                tracing::error!(
                    limit = self.policy.max_requests,
                    endpoint = %request.path,
                    correlation_id = %ctx.correlation_id,
                    "Request limit reached, aborting session"
                );
                return Err(SyncError::LoopGuard {
                    limit: self.policy.max_requests,
                });
            }

            self.throttle().await;

            self.state = GovernorState::InFlight;
            self.session.request_count += 1;
            self.session.last_request_at = Some(Instant::now());

            let error = match self.client.call(request, Some(ctx.correlation_id)).await {
                Ok(body) => {
                    self.state = GovernorState::Success;
                    return Ok(body);
                }
                Err(e) => e,
            };

            let delay = match &error {
                ApiError::Auth => {
                    self.session.auth_failed = true;
                    None
                }
                ApiError::RateLimited { retry_after } => {
                    if rate_limit_retries < self.policy.max_rate_limit_retries {
                        rate_limit_retries += 1;
                        Some(
                            retry_after
                                .map(|d| d.min(self.policy.max_retry_after))
                                .unwrap_or(self.policy.rate_limit_backoff),
                        )
                    } else {
                        None
                    }
                }
                e if e.is_retryable() && retries < self.policy.max_retries => {
                    let delay = self.policy.backoff_base * 2u32.pow(retries);
                    retries += 1;
                    Some(delay)
                }
                _ => None,
            };

            match delay {
                Some(delay) => {
                    self.state = GovernorState::Retryable;
                    tracing::warn!(
                        endpoint = %request.path,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        correlation_id = %ctx.correlation_id,
                        "Retrying Tesote API call"
                    );
                    sleep(delay).await;
                }
                None => {
                    self.state = GovernorState::Fatal;
                    return Err(SyncError::from(error));
                }
            }
        }
    }

    async fn throttle(&mut self) {
        if let Some(last) = self.session.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < self.policy.min_spacing {
                self.state = GovernorState::Throttling;
                sleep(self.policy.min_spacing - elapsed).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TracingLogSink;
    use crate::client::testing::ScriptedTransport;
    use serde_json::json;
    use uuid::Uuid;

    fn governor(transport: Arc<ScriptedTransport>) -> RateGovernor {
        let client = Arc::new(TesoteClient::new(transport, Arc::new(TracingLogSink)));
        RateGovernor::new(client, GovernorPolicy::default())
    }

    fn ctx() -> SyncContext {
        SyncContext::manual(Uuid::nil())
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_guard_blocks_extra_call() {
        let transport = Arc::new(ScriptedTransport::new(Ok(json!({"data": []}))));
        let mut gov = governor(transport.clone());
        let request = ApiRequest::list_accounts(1, 50);

        for _ in 0..20 {
            gov.execute(&request, &ctx()).await.unwrap();
        }
        let result = gov.execute(&request, &ctx()).await;

        assert!(matches!(result, Err(SyncError::LoopGuard { limit: 20 })));
        assert_eq!(transport.calls(), 20);
        assert_eq!(gov.state(), GovernorState::Fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_retry_ceiling() {
        let transport = Arc::new(ScriptedTransport::new(Err(ApiError::Server(500))));
        let mut gov = governor(transport.clone());

        let started = Instant::now();
        let result = gov.execute(&ApiRequest::balance("A1"), &ctx()).await;

        assert!(matches!(result, Err(SyncError::Transient(_))));
        assert_eq!(transport.calls(), (MAX_RETRIES + 1) as usize);
        // 2 s + 4 s of backoff
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_timeout() {
        let transport = Arc::new(ScriptedTransport::new(Ok(json!({"balance_cents": 5}))));
        transport.push(Err(ApiError::Timeout));
        let mut gov = governor(transport.clone());

        let body = gov.execute(&ApiRequest::balance("A1"), &ctx()).await.unwrap();

        assert_eq!(body["balance_cents"], 5);
        assert_eq!(transport.calls(), 2);
        assert_eq!(gov.state(), GovernorState::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_honors_capped_retry_after() {
        let transport = Arc::new(ScriptedTransport::new(Ok(json!([]))));
        transport.push(Err(ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(120)),
        }));
        let mut gov = governor(transport.clone());

        let started = Instant::now();
        gov.execute(&ApiRequest::balance("A1"), &ctx()).await.unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_gives_up_after_two_retries() {
        let transport = Arc::new(ScriptedTransport::new(Err(ApiError::RateLimited {
            retry_after: None,
        })));
        let mut gov = governor(transport.clone());

        let result = gov.execute(&ApiRequest::balance("A1"), &ctx()).await;

        assert!(matches!(result, Err(SyncError::Transient(_))));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_blocks_session() {
        let transport = Arc::new(ScriptedTransport::new(Ok(json!([]))));
        transport.push(Err(ApiError::Auth));
        let mut gov = governor(transport.clone());

        let first = gov.execute(&ApiRequest::balance("A1"), &ctx()).await;
        let second = gov.execute(&ApiRequest::balance("A1"), &ctx()).await;

        assert!(matches!(first, Err(SyncError::PermanentAuth)));
        assert!(matches!(second, Err(SyncError::PermanentAuth)));
        assert_eq!(transport.calls(), 1);

        gov.reset_session();
        assert!(gov.execute(&ApiRequest::balance("A1"), &ctx()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(Err(ApiError::NotFound)));
        let mut gov = governor(transport.clone());

        let result = gov.execute(&ApiRequest::balance("A1"), &ctx()).await;

        assert!(matches!(result, Err(SyncError::PermanentClient(_))));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_spaced() {
        let transport = Arc::new(ScriptedTransport::new(Ok(json!([]))));
        let mut gov = governor(transport.clone());

        let started = Instant::now();
        for _ in 0..3 {
            gov.execute(&ApiRequest::balance("A1"), &ctx()).await.unwrap();
        }

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(gov.session().request_count, 3);
    }
}
