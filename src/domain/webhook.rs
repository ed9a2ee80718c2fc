//! Webhook endpoint configuration

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Event kinds sent by the remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventKind {
    TransactionCreated,
    AccountUpdated,
    BalanceUpdated,
    Other(String),
}

impl WebhookEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            WebhookEventKind::TransactionCreated => "transaction.created",
            WebhookEventKind::AccountUpdated => "account.updated",
            WebhookEventKind::BalanceUpdated => "balance.updated",
            WebhookEventKind::Other(kind) => kind.as_str(),
        }
    }
}

impl From<&str> for WebhookEventKind {
    fn from(s: &str) -> Self {
        match s.trim() {
            "transaction.created" => WebhookEventKind::TransactionCreated,
            "account.updated" => WebhookEventKind::AccountUpdated,
            "balance.updated" => WebhookEventKind::BalanceUpdated,
            other => WebhookEventKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for WebhookEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which event kinds an endpoint acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSubscriptions {
    pub account_updates: bool,
    pub new_transactions: bool,
    pub balance_updates: bool,
}

impl Default for WebhookSubscriptions {
    fn default() -> Self {
        Self {
            account_updates: true,
            new_transactions: true,
            balance_updates: true,
        }
    }
}

impl WebhookSubscriptions {
    pub fn accepts(&self, kind: &WebhookEventKind) -> bool {
        match kind {
            WebhookEventKind::TransactionCreated => self.new_transactions,
            WebhookEventKind::AccountUpdated => self.account_updates,
            WebhookEventKind::BalanceUpdated => self.balance_updates,
            WebhookEventKind::Other(_) => false,
        }
    }

    /// Event names to register upstream
    pub fn event_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.new_transactions {
            names.push("transaction.created");
        }
        if self.account_updates {
            names.push("account.updated");
        }
        if self.balance_updates {
            names.push("balance.updated");
        }
        names
    }
}

/// Receiver endpoint for signed remote events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub active: bool,
    #[serde(skip_serializing)]
    pub secret: String,
    /// Registration id returned by the remote API
    pub remote_id: Option<String>,
    pub subscriptions: WebhookSubscriptions,
    pub events_received: i64,
    pub last_received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    /// New active endpoint with a freshly generated secret
    pub fn new(subscriptions: WebhookSubscriptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            active: true,
            secret: generate_secret(),
            remote_id: None,
            subscriptions,
            events_received: 0,
            last_received_at: None,
            created_at: Utc::now(),
        }
    }
}

/// 32 random bytes, hex encoded
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_from_str() {
        assert_eq!(
            WebhookEventKind::from("transaction.created"),
            WebhookEventKind::TransactionCreated
        );
        assert_eq!(
            WebhookEventKind::from("balance.updated"),
            WebhookEventKind::BalanceUpdated
        );
        assert_eq!(
            WebhookEventKind::from("card.issued"),
            WebhookEventKind::Other("card.issued".to_string())
        );
    }

    #[test]
    fn test_subscriptions_filter_kinds() {
        let subs = WebhookSubscriptions {
            account_updates: false,
            new_transactions: true,
            balance_updates: true,
        };
        assert!(subs.accepts(&WebhookEventKind::TransactionCreated));
        assert!(!subs.accepts(&WebhookEventKind::AccountUpdated));
        assert!(!subs.accepts(&WebhookEventKind::Other("x".to_string())));
        assert_eq!(subs.event_names(), vec!["transaction.created", "balance.updated"]);
    }

    #[test]
    fn test_generated_secrets_are_unique() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_secret_not_serialized() {
        let endpoint = WebhookEndpoint::new(WebhookSubscriptions::default());
        let json = serde_json::to_value(&endpoint).unwrap();
        assert!(json.get("secret").is_none());
    }
}
