//! Business-rule validation of fiscal records.
//!
//! Every rule group runs on every record; a failing rule never suppresses
//! another. Errors make the record invalid, warnings are advisory.

pub mod rules;

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::record::{FiscalRecord, LineItem, Totals};
use crate::models::validation::{CheckValue, ValidationResult};

pub use rules::{validate_access_key, validate_cnpj, validate_cpf};

/// Relative tolerance for `quantity * unit_price` against the line total.
const LINE_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

#[derive(Default)]
struct Findings {
    errors: Vec<String>,
    warnings: Vec<String>,
    checks: BTreeMap<String, CheckValue>,
}

impl Findings {
    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn check(&mut self, name: &str, value: impl Into<CheckValue>) {
        self.checks.insert(name.to_string(), value.into());
    }
}

/// Validate a record. Pure and total.
pub fn validate(record: &FiscalRecord) -> ValidationResult {
    let mut findings = Findings::default();

    check_issuer(record, &mut findings);
    check_recipient(record, &mut findings);
    check_access_key(record, &mut findings);
    check_totals(&record.totals, &mut findings);
    check_items(&record.line_items, &mut findings);

    debug!(
        "Validation finished: {} errors, {} warnings",
        findings.errors.len(),
        findings.warnings.len()
    );

    ValidationResult::from_parts(findings.errors, findings.warnings, findings.checks)
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn check_issuer(record: &FiscalRecord, findings: &mut Findings) {
    match present(&record.issuer.tax_id) {
        Some(cnpj) => {
            let valid = validate_cnpj(cnpj);
            findings.check("issuer_cnpj", valid);
            if !valid {
                findings.error("Invalid issuer CNPJ");
            }
        }
        None => findings.warning("Issuer CNPJ not found"),
    }
}

fn check_recipient(record: &FiscalRecord, findings: &mut Findings) {
    let recipient = &record.recipient;
    if let Some(cnpj) = present(&recipient.tax_id) {
        let valid = validate_cnpj(cnpj);
        findings.check("recipient_cnpj", valid);
        if !valid {
            findings.error("Invalid recipient CNPJ");
        }
    } else if let Some(cpf) = present(&recipient.personal_id) {
        let valid = validate_cpf(cpf);
        findings.check("recipient_cpf", valid);
        if !valid {
            findings.error("Invalid recipient CPF");
        }
    } else {
        findings.warning("Recipient CNPJ/CPF not found");
    }
}

fn check_access_key(record: &FiscalRecord, findings: &mut Findings) {
    match present(&record.metadata.access_key) {
        Some(key) => {
            let valid = validate_access_key(key);
            findings.check("access_key", valid);
            if !valid {
                findings.error("Invalid access key");
            }
        }
        None => findings.warning("Access key not found"),
    }
}

fn check_totals(totals: &Totals, findings: &mut Findings) {
    if totals.grand_total <= Decimal::ZERO {
        findings.warning("Document total is zero or negative");
    }
    if totals.products_total <= Decimal::ZERO {
        findings.warning("Products total is zero or negative");
    }
}

fn check_items(items: &[LineItem], findings: &mut Findings) {
    if items.is_empty() {
        findings.warning("No line items found");
        return;
    }
    findings.check("item_count", items.len());

    for (i, item) in items.iter().enumerate() {
        let n = i + 1;
        if item.quantity <= Decimal::ZERO {
            findings.warning(format!("Item {}: invalid quantity", n));
        }
        if item.unit_price < Decimal::ZERO {
            findings.warning(format!("Item {}: negative unit price", n));
        }
        if item.quantity > Decimal::ZERO && item.unit_price > Decimal::ZERO {
            let Some((expected, diff)) = item
                .quantity
                .checked_mul(item.unit_price)
                .and_then(|expected| Some((expected, expected.checked_sub(item.line_total)?.abs())))
            else {
                findings.warning(format!(
                    "Item {}: calculation out of range (quantity: {}, unit price: {})",
                    n, item.quantity, item.unit_price
                ));
                continue;
            };
            if diff > item.line_total * LINE_TOLERANCE {
                findings.warning(format!(
                    "Item {}: calculation mismatch (expected: {:.2}, found: {:.2})",
                    n, expected, item.line_total
                ));
            }
        }
    }
}
