//! Remote record parsing
//!
//! Field-level validation and clamping of account and transaction records.
//! A record that fails here is dropped by the caller, never the batch.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

use crate::domain::{
    currency_scale, DomainError, MinorUnits, RemoteAccount, RemoteTransaction, TransactionKind,
};

const MAX_ID_LEN: usize = 50;
const MAX_DESCRIPTION_LEN: usize = 200;
const MAX_REFERENCE_LEN: usize = 50;
const MAX_BANK_NAME_LEN: usize = 50;
const MAX_MASKED_ACCOUNT_LEN: usize = 20;
const MAX_CURRENCY_LEN: usize = 3;
const MAX_LEGAL_ENTITY_LEN: usize = 100;

/// One page of records
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    /// Reported by `meta` or `pagination`, when present
    pub total_pages: Option<u32>,
}

/// Accepts a bare array or `{data|transactions|accounts, meta|pagination}`
pub fn parse_page(body: &Value) -> Result<Page, DomainError> {
    if let Some(records) = body.as_array() {
        return Ok(Page {
            records: records.clone(),
            total_pages: None,
        });
    }

    let object = body
        .as_object()
        .ok_or_else(|| DomainError::invalid_record("response is neither a list nor an object"))?;

    let records = ["data", "transactions", "accounts"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default();

    let total_pages = ["meta", "pagination"]
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(|meta| meta.get("total_pages"))
        .and_then(Value::as_u64)
        .map(|n| n as u32);

    Ok(Page {
        records,
        total_pages,
    })
}

fn clamp(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// String or number field as text
fn text(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_or(record: &Value, key: &str, default: &str, max: usize) -> String {
    clamp(&text(record, key).unwrap_or_else(|| default.to_string()), max)
}

/// Decimal from a JSON number or numeric string, without a float round trip
fn decimal(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    raw.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(&raw).ok())
}

/// Integer cents field, else a major-unit amount converted at the currency scale
fn minor_units(record: &Value, cents_key: &str, major_key: &str, currency: &str) -> Option<MinorUnits> {
    if let Some(cents) = record.get(cents_key).and_then(Value::as_i64) {
        return Some(MinorUnits::new(cents));
    }
    let major = decimal(record.get(major_key)?)?;
    let factor = Decimal::from(10i64.pow(currency_scale(currency)));
    let scaled = major
        .checked_mul(factor)
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_i64());

    if scaled.is_none() {
        tracing::warn!(
            amount = %major,
            currency = %currency,
            "Amount does not fit in minor units"
        );
    }
    scaled.map(MinorUnits::new)
}

pub fn parse_account(record: &Value) -> Result<RemoteAccount, DomainError> {
    let external_id = text(record, "id")
        .ok_or_else(|| DomainError::invalid_record("account without id"))?;
    let currency = text_or(record, "currency", "VES", MAX_CURRENCY_LEN).to_uppercase();
    let balance = minor_units(record, "balance_cents", "balance", &currency)
        .unwrap_or_else(MinorUnits::zero);

    Ok(RemoteAccount {
        external_id: clamp(&external_id, MAX_ID_LEN),
        name: text(record, "name"),
        bank_name: text_or(record, "bank_name", "Unknown", MAX_BANK_NAME_LEN),
        masked_account: text_or(record, "masked_account", "XXXX", MAX_MASKED_ACCOUNT_LEN),
        currency,
        legal_entity_id: text(record, "legal_entity_id"),
        legal_entity_name: text_or(record, "legal_entity_name", "", MAX_LEGAL_ENTITY_LEN),
        balance,
    })
}

/// Balance from `{balance_cents}`, `{balance}` or either inside `data`
pub fn parse_balance(body: &Value, currency: &str) -> Option<MinorUnits> {
    minor_units(body, "balance_cents", "balance", currency).or_else(|| {
        body.get("data")
            .and_then(|data| minor_units(data, "balance_cents", "balance", currency))
    })
}

/// Parse a transaction of an account held in `currency`
pub fn parse_transaction(record: &Value, currency: &str) -> Result<RemoteTransaction, DomainError> {
    let id = text(record, "id")
        .ok_or_else(|| DomainError::invalid_record("transaction without id"))?;
    let external_id = clamp(&id, MAX_ID_LEN);

    let raw_date = text(record, "date").ok_or_else(|| {
        DomainError::invalid_record(format!("transaction {} without date", external_id))
    })?;
    let date_part: String = raw_date.chars().take(10).collect();
    let date = NaiveDate::parse_from_str(&date_part, "%Y-%m-%d").map_err(|_| {
        DomainError::invalid_record(format!(
            "transaction {} has unparseable date {:?}",
            external_id, raw_date
        ))
    })?;

    let amount = minor_units(record, "amount_cents", "amount", currency).ok_or_else(|| {
        DomainError::invalid_record(format!("transaction {} without amount", external_id))
    })?;

    let kind = text(record, "type")
        .map(|t| TransactionKind::from(t.as_str()))
        .unwrap_or(TransactionKind::Other);

    Ok(RemoteTransaction {
        date,
        amount,
        kind,
        description: text_or(record, "description", "", MAX_DESCRIPTION_LEN),
        reference: text_or(record, "reference", &external_id, MAX_REFERENCE_LEN),
        counterpart_name: text(record, "counterpart_name"),
        counterpart_document: text(record, "counterpart_document"),
        external_id,
    })
}
