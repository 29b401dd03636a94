//! Parsing oracle replies into fiscal records.
//!
//! The reply is untrusted: every field is coerced individually and falls back
//! to its default, and only the enabled taxes are read from it.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::amounts::parse_brl_amount;
use crate::error::ExtractionError;
use crate::models::record::{
    DocumentMetadata, FiscalRecord, Issuer, LineItem, Recipient, RecordSource, Totals,
};
use crate::models::tax::TaxDefinition;
use crate::oracle::strip_code_fences;
use crate::validation::rules::normalize_access_key;

type Node = Map<String, Value>;

/// Parse a raw oracle reply into a record bound to `taxes`.
pub fn parse_reply(reply: &str, taxes: &[TaxDefinition]) -> Result<FiscalRecord, ExtractionError> {
    let body = strip_code_fences(reply);
    let value: Value = serde_json::from_str(body).map_err(|e| ExtractionError::UnparseableReply {
        reason: e.to_string(),
        raw: reply.to_string(),
    })?;
    let Value::Object(root) = value else {
        return Err(ExtractionError::UnparseableReply {
            reason: "expected a JSON object".to_string(),
            raw: reply.to_string(),
        });
    };

    let empty = Node::new();
    let section = |key: &str| root.get(key).and_then(Value::as_object).unwrap_or(&empty);

    let issuer = section("issuer");
    let recipient = section("recipient");
    let totals = section("totals");
    let reported_taxes = section("taxes");
    let metadata = section("metadata");

    let mut record = FiscalRecord::empty(RecordSource::Visual, taxes.iter().map(|t| t.id.as_str()));

    record.issuer = Issuer {
        tax_id: opt_string(issuer, "tax_id"),
        legal_name: string(issuer, "legal_name"),
        trade_name: opt_string(issuer, "trade_name"),
        address: string(issuer, "address"),
        state_registration: opt_string(issuer, "state_registration"),
        municipal_registration: opt_string(issuer, "municipal_registration"),
    };
    record.recipient = Recipient {
        tax_id: opt_string(recipient, "tax_id"),
        personal_id: opt_string(recipient, "personal_id"),
        name: string(recipient, "name"),
        address: string(recipient, "address"),
        state_registration: opt_string(recipient, "state_registration"),
    };

    record.line_items = match root.get("items") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .map(|item| line_item(item, taxes))
            .collect(),
        _ => Vec::new(),
    };

    for tax in taxes {
        if let Some(v) = reported_taxes.get(&tax.id) {
            record.taxes.insert(tax.id.clone(), decimal(v));
        }
    }
    let ignored: Vec<&String> = reported_taxes
        .keys()
        .filter(|k| !record.taxes.contains_key(k.as_str()))
        .collect();
    if !ignored.is_empty() {
        warn!("Ignoring taxes not enabled in the registry: {:?}", ignored);
    }

    let tax_total = record
        .taxes_sum()
        .ok_or_else(|| ExtractionError::Overflow("taxes".to_string()))?;
    record.totals = Totals {
        products_total: field_decimal(totals, "products_total"),
        freight: field_decimal(totals, "freight"),
        insurance: field_decimal(totals, "insurance"),
        discount: field_decimal(totals, "discount"),
        tax_total,
        grand_total: field_decimal(totals, "grand_total"),
    };

    record.metadata = DocumentMetadata {
        number: string(metadata, "number"),
        series: string(metadata, "series"),
        issue_date: string(metadata, "issue_date"),
        access_key: opt_string(metadata, "access_key")
            .map(|k| normalize_access_key(&k))
            .filter(|k| !k.is_empty()),
    };

    debug!("Parsed oracle reply with {} items", record.line_items.len());
    Ok(record)
}

fn line_item(item: &Node, taxes: &[TaxDefinition]) -> LineItem {
    let codes = item.get("tax_codes").and_then(Value::as_object);
    LineItem {
        code: string(item, "code"),
        description: string(item, "description"),
        ncm: opt_string(item, "ncm"),
        cfop: opt_string(item, "cfop"),
        tax_codes: taxes
            .iter()
            .filter_map(|t| {
                let code = codes.map(|c| string(c, &t.id)).unwrap_or_default();
                (!code.is_empty()).then(|| (t.id.clone(), code))
            })
            .collect(),
        unit: string(item, "unit"),
        quantity: field_decimal(item, "quantity"),
        unit_price: field_decimal(item, "unit_price"),
        line_total: field_decimal(item, "line_total"),
    }
}

fn string(node: &Node, key: &str) -> String {
    match node.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn opt_string(node: &Node, key: &str) -> Option<String> {
    Some(string(node, key)).filter(|s| !s.is_empty())
}

fn field_decimal(node: &Node, key: &str) -> Decimal {
    node.get(key).map(decimal).unwrap_or_default()
}

/// Numbers, plain numeric strings and "R$ 1.234,56" all coerce; anything else is zero.
fn decimal(value: &Value) -> Decimal {
    match value {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .unwrap_or_default()
        }
        Value::String(s) => parse_brl_amount(s).unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}
