//! Common test utilities

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http_body_util::BodyExt;
use serde_json::Value;
use uuid::Uuid;

use tesote_sync::client::{ApiError, ApiRequest, ApiResponse, TesoteClient, Transport};
use tesote_sync::domain::{Journal, MappedAccount, MinorUnits, RemoteAccount};
use tesote_sync::store::{AccountRepository, InMemoryStore, Repositories};
use tesote_sync::{build_router, ApiSettings, AppState, SyncService, SyncSettings};

pub const ADMIN_KEY: &str = "test_key_123";

/// Transport answering by request path, falling back to a fixed outcome
pub struct RoutedTransport {
    routes: Mutex<HashMap<String, VecDeque<Result<Value, ApiError>>>>,
    fallback: Result<Value, ApiError>,
    sent: Mutex<Vec<ApiRequest>>,
}

impl RoutedTransport {
    pub fn new(fallback: Result<Value, ApiError>) -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            fallback,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Queue an outcome for the next request to `path`
    pub fn on(&self, path: &str, outcome: Result<Value, ApiError>) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RoutedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.sent.lock().unwrap().push(request.clone());
        let outcome = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone());
        outcome.map(|body| ApiResponse { status: 200, body })
    }
}

/// Service wired over an in-memory store and a routed transport
pub struct TestHarness {
    pub store: Arc<InMemoryStore>,
    pub transport: Arc<RoutedTransport>,
    pub sync: Arc<SyncService>,
}

impl TestHarness {
    pub fn new(fallback: Result<Value, ApiError>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let transport = Arc::new(RoutedTransport::new(fallback));
        let client = TesoteClient::new(transport.clone(), store.clone());
        let sync = Arc::new(SyncService::new(
            Some(Arc::new(client)),
            Repositories::from_store(store.clone()),
            SyncSettings::default(),
        ));
        Self {
            store,
            transport,
            sync,
        }
    }

    pub fn journal(&self, currency: &str) -> Journal {
        let journal = Journal {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            name: format!("Bank {}", currency),
            currency: currency.to_string(),
        };
        self.store.add_journal(journal.clone());
        journal
    }

    /// Account `external_id` mapped to a fresh journal in `currency`
    pub async fn mapped_account(&self, external_id: &str, currency: &str) -> MappedAccount {
        let journal = self.journal(currency);
        let mut account = MappedAccount::discovered(Uuid::nil(), remote_account(external_id, currency));
        account.journal_id = Some(journal.id);
        AccountRepository::create(self.store.as_ref(), &account)
            .await
            .unwrap();
        account
    }

    pub async fn account(&self, id: Uuid) -> MappedAccount {
        AccountRepository::get(self.store.as_ref(), id)
            .await
            .unwrap()
            .unwrap()
    }

    pub fn app(&self, webhook_enabled: bool) -> axum::Router {
        build_router(AppState::new(
            self.sync.clone(),
            ApiSettings {
                admin_api_key: Some(ADMIN_KEY.to_string()),
                webhook_enabled,
            },
        ))
    }
}

pub fn remote_account(external_id: &str, currency: &str) -> RemoteAccount {
    RemoteAccount {
        external_id: external_id.to_string(),
        name: None,
        bank_name: "Banesco".to_string(),
        masked_account: "0134XXXX5678".to_string(),
        currency: currency.to_string(),
        legal_entity_id: None,
        legal_entity_name: "ACME C.A.".to_string(),
        balance: MinorUnits::zero(),
    }
}

/// Read a response body as JSON
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}
