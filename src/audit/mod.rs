//! API Call Audit Log
//!
//! Every outbound call to the bank aggregator, successful or not, is
//! recorded with endpoint, method, status and latency.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::StoreError;

/// Audit record for one outbound API call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallLog {
    pub id: Uuid,
    pub endpoint: String,
    pub method: String,
    pub request_time: DateTime<Utc>,
    /// Latency in milliseconds
    pub response_time_ms: i64,
    /// Absent when no response was received (timeout, connection failure)
    pub status_code: Option<i32>,
    pub error_message: Option<String>,
    pub account_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
}

/// Builder for creating API call log entries
#[derive(Debug, Clone)]
pub struct ApiCallLogBuilder {
    endpoint: String,
    method: String,
    request_time: DateTime<Utc>,
    status_code: Option<i32>,
    error_message: Option<String>,
    account_id: Option<Uuid>,
    correlation_id: Option<Uuid>,
}

impl ApiCallLogBuilder {
    pub fn new(method: &str, endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            request_time: Utc::now(),
            status_code: None,
            error_message: None,
            account_id: None,
            correlation_id: None,
        }
    }

    pub fn status_code(mut self, status: u16) -> Self {
        self.status_code = Some(i32::from(status));
        self
    }

    /// Error text is truncated to 500 characters
    pub fn error_message(mut self, message: &str) -> Self {
        self.error_message = Some(message.chars().take(500).collect());
        self
    }

    pub fn account_id(mut self, account_id: Option<Uuid>) -> Self {
        self.account_id = account_id;
        self
    }

    pub fn correlation_id(mut self, correlation_id: Option<Uuid>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn finish(self, response_time_ms: i64) -> ApiCallLog {
        ApiCallLog {
            id: Uuid::new_v4(),
            endpoint: self.endpoint,
            method: self.method,
            request_time: self.request_time,
            response_time_ms,
            status_code: self.status_code,
            error_message: self.error_message,
            account_id: self.account_id,
            correlation_id: self.correlation_id,
        }
    }
}

/// Consumer of API call records
#[async_trait]
pub trait ApiLogSink: Send + Sync {
    async fn record(&self, entry: &ApiCallLog) -> Result<(), StoreError>;
}

/// Sink that only emits the tracing record
#[derive(Debug, Clone, Default)]
pub struct TracingLogSink;

#[async_trait]
impl ApiLogSink for TracingLogSink {
    async fn record(&self, entry: &ApiCallLog) -> Result<(), StoreError> {
        tracing::debug!(
            audit_id = %entry.id,
            endpoint = %entry.endpoint,
            method = %entry.method,
            "API call audit entry"
        );
        Ok(())
    }
}

/// PostgreSQL-backed API call log
#[derive(Debug, Clone)]
pub struct PgApiLogSink {
    pool: PgPool,
}

impl PgApiLogSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent entries first
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<ApiCallLog>, StoreError> {
        let rows: Vec<(
            Uuid,
            String,
            String,
            DateTime<Utc>,
            i64,
            Option<i32>,
            Option<String>,
            Option<Uuid>,
            Option<Uuid>,
        )> = sqlx::query_as(
            r#"
            SELECT id, endpoint, method, request_time, response_time_ms,
                   status_code, error_message, account_id, correlation_id
            FROM tesote_api_logs
            ORDER BY request_time DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    id,
                    endpoint,
                    method,
                    request_time,
                    response_time_ms,
                    status_code,
                    error_message,
                    account_id,
                    correlation_id,
                )| ApiCallLog {
                    id,
                    endpoint,
                    method,
                    request_time,
                    response_time_ms,
                    status_code,
                    error_message,
                    account_id,
                    correlation_id,
                },
            )
            .collect())
    }
}

#[async_trait]
impl ApiLogSink for PgApiLogSink {
    async fn record(&self, entry: &ApiCallLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tesote_api_logs (
                id, endpoint, method, request_time, response_time_ms,
                status_code, error_message, account_id, correlation_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.endpoint)
        .bind(&entry.method)
        .bind(entry.request_time)
        .bind(entry.response_time_ms)
        .bind(entry.status_code)
        .bind(&entry.error_message)
        .bind(entry.account_id)
        .bind(entry.correlation_id)
        .execute(&self.pool)
        .await?;

        tracing::debug!(audit_id = %entry.id, endpoint = %entry.endpoint, "API call logged");
        Ok(())
    }
}
