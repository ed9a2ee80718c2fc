//! Tesote API client
//!
//! One authenticated call per `TesoteClient::call`, classified into an
//! `ApiError` on failure and recorded in the audit sink either way. The
//! transport sits behind a trait so everything above it runs without a
//! network.

mod error;
mod http;
mod request;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::audit::{ApiCallLogBuilder, ApiLogSink};

pub use error::{classify_status, ApiError};
pub use http::HttpTransport;
pub use request::{ApiRequest, CallClass, TransactionPage};

/// Successful response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

/// Sends one request and classifies the outcome
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// Audited client over a transport
#[derive(Clone)]
pub struct TesoteClient {
    transport: Arc<dyn Transport>,
    audit: Arc<dyn ApiLogSink>,
}

impl TesoteClient {
    pub fn new(transport: Arc<dyn Transport>, audit: Arc<dyn ApiLogSink>) -> Self {
        Self { transport, audit }
    }

    /// Perform one call. No retries happen here.
    pub async fn call(
        &self,
        request: &ApiRequest,
        correlation_id: Option<Uuid>,
    ) -> Result<Value, ApiError> {
        let builder = ApiCallLogBuilder::new(request.method.as_str(), &request.path)
            .account_id(request.account_id)
            .correlation_id(correlation_id);
        let started = Instant::now();

        let outcome = self.transport.send(request).await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        let entry = match &outcome {
            Ok(response) => {
                tracing::debug!(
                    method = %request.method,
                    endpoint = %request.path,
                    status = response.status,
                    elapsed_ms = elapsed_ms,
                    "Tesote API call succeeded"
                );
                builder.status_code(response.status).finish(elapsed_ms)
            }
            Err(e) => {
                tracing::warn!(
                    method = %request.method,
                    endpoint = %request.path,
                    status = ?e.status_code(),
                    elapsed_ms = elapsed_ms,
                    error = %e,
                    "Tesote API call failed"
                );
                let builder = match e.status_code() {
                    Some(status) => builder.status_code(status),
                    None => builder,
                };
                builder.error_message(&e.to_string()).finish(elapsed_ms)
            }
        };

        if let Err(e) = self.audit.record(&entry).await {
            tracing::error!(error = %e, endpoint = %request.path, "Failed to write API call log");
        }

        outcome.map(|response| response.body)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_records_success_and_failure() {
        let transport = Arc::new(ScriptedTransport::new(Err(ApiError::Server(502))));
        transport.push(Ok(json!({"data": []})));
        let store = Arc::new(InMemoryStore::new());
        let client = TesoteClient::new(transport.clone(), store.clone());

        let account = Uuid::new_v4();
        let ok = client
            .call(&ApiRequest::balance("A1").for_account(account), None)
            .await;
        assert_eq!(ok.unwrap(), json!({"data": []}));

        let failed = client.call(&ApiRequest::balance("A1"), None).await;
        assert_eq!(failed, Err(ApiError::Server(502)));

        let logs = store.api_logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].status_code, Some(200));
        assert_eq!(logs[0].account_id, Some(account));
        assert_eq!(logs[0].endpoint, "/accounts/A1/balance");
        assert_eq!(logs[1].status_code, Some(502));
        assert!(logs[1].error_message.is_some());
    }

    #[tokio::test]
    async fn test_timeout_logged_without_status() {
        let transport = Arc::new(ScriptedTransport::new(Err(ApiError::Timeout)));
        let store = Arc::new(InMemoryStore::new());
        let client = TesoteClient::new(transport, store.clone());

        let _ = client.call(&ApiRequest::connection_test(), None).await;

        let logs = store.api_logs();
        assert_eq!(logs[0].status_code, None);
        assert_eq!(logs[0].error_message.as_deref(), Some("Request timed out"));
    }
}
