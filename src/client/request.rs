//! Remote API requests
//!
//! Each outbound endpoint has a constructor here so the governor and the
//! fetch engine deal in values, not URLs.

use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

/// Call class, decides the request timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallClass {
    ConnectionTest,
    Data,
    WebhookManagement,
}

impl CallClass {
    pub fn timeout(&self) -> Duration {
        match self {
            CallClass::ConnectionTest => Duration::from_secs(5),
            CallClass::Data => Duration::from_secs(10),
            CallClass::WebhookManagement => Duration::from_secs(10),
        }
    }
}

/// One outbound call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub class: CallClass,
    /// Local account the call is made for, recorded in the audit log
    pub account_id: Option<Uuid>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>, class: CallClass) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            class,
            account_id: None,
        }
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn for_account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Cheapest authenticated call: one account
    pub fn connection_test() -> Self {
        Self::new(Method::GET, "/accounts", CallClass::ConnectionTest).with_query("per_page", 1)
    }

    pub fn list_accounts(page: u32, per_page: u32) -> Self {
        Self::new(Method::GET, "/accounts", CallClass::Data)
            .with_query("page", page)
            .with_query("per_page", per_page)
    }

    pub fn transactions(external_id: &str, page: &TransactionPage) -> Self {
        let mut request = Self::new(
            Method::GET,
            format!("/accounts/{}/transactions", external_id),
            CallClass::Data,
        );
        if let Some((start, end)) = page.range {
            request = request
                .with_query("start_date", start.format("%Y-%m-%d"))
                .with_query("end_date", end.format("%Y-%m-%d"));
        }
        if let Some(after_id) = &page.after_id {
            request = request.with_query("after_id", after_id);
        }
        request.with_query("per_page", page.per_page)
    }

    pub fn balance(external_id: &str) -> Self {
        Self::new(
            Method::GET,
            format!("/accounts/{}/balance", external_id),
            CallClass::Data,
        )
    }

    pub fn register_webhook(url: &str, events: &[&str], secret: &str) -> Self {
        let mut request = Self::new(Method::POST, "/webhooks", CallClass::WebhookManagement);
        request.body = Some(json!({
            "url": url,
            "events": events,
            "secret": secret,
        }));
        request
    }

    pub fn delete_webhook(remote_id: &str) -> Self {
        Self::new(
            Method::DELETE,
            format!("/webhooks/{}", remote_id),
            CallClass::WebhookManagement,
        )
    }
}

/// Parameters of one transactions page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPage {
    pub range: Option<(NaiveDate, NaiveDate)>,
    pub after_id: Option<String>,
    pub per_page: u32,
}
