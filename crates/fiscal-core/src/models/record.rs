//! Canonical fiscal record produced by extraction.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::document::InputFormat;

/// Which extraction path produced a record.
pub type RecordSource = InputFormat;

/// A complete fiscal record, independent of the input format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalRecord {
    /// Issuer (emitente).
    pub issuer: Issuer,

    /// Recipient (destinatário).
    pub recipient: Recipient,

    /// Line items in document order.
    pub line_items: Vec<LineItem>,

    /// Document totals.
    pub totals: Totals,

    /// Tax amounts keyed by tax id; exactly the enabled ids at extraction time.
    pub taxes: BTreeMap<String, Decimal>,

    /// Number, series, dates and access key.
    pub metadata: DocumentMetadata,

    /// Extraction path.
    pub source: RecordSource,
}

impl FiscalRecord {
    /// Empty record whose tax map holds every given id at zero.
    pub fn empty<'a>(source: RecordSource, tax_ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            issuer: Issuer::default(),
            recipient: Recipient::default(),
            line_items: Vec::new(),
            totals: Totals::default(),
            taxes: tax_ids
                .into_iter()
                .map(|id| (id.to_string(), Decimal::ZERO))
                .collect(),
            metadata: DocumentMetadata::default(),
            source,
        }
    }

    /// Sum of all tax amounts, `None` when it leaves the `Decimal` range.
    pub fn taxes_sum(&self) -> Option<Decimal> {
        checked_sum(self.taxes.values().copied())
    }

    /// Tax total as a percentage of the products total (0 when there are no products).
    pub fn tax_burden_percent(&self) -> Decimal {
        percent_of(self.totals.tax_total, self.totals.products_total)
    }

    /// Amount of a single tax, zero when absent.
    pub fn tax(&self, id: &str) -> Decimal {
        self.taxes.get(id).copied().unwrap_or_default()
    }
}

/// Issuer of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issuer {
    /// Business registry number (CNPJ), digits as found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,

    /// Legal name (razão social).
    pub legal_name: String,

    /// Trade name (nome fantasia).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_name: Option<String>,

    /// Single-line display address.
    pub address: String,

    /// State registration (IE).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_registration: Option<String>,

    /// Municipal registration (IM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipal_registration: Option<String>,
}

/// Recipient of the document. Either a business (CNPJ) or a person (CPF).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    /// Business registry number (CNPJ).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,

    /// Personal registry number (CPF).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_id: Option<String>,

    pub name: String,

    pub address: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_registration: Option<String>,
}

/// A single product or service line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product code (cProd).
    pub code: String,

    pub description: String,

    /// Mercosur nomenclature code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ncm: Option<String>,

    /// Fiscal operation code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfop: Option<String>,

    /// Tax situation code (CST or CSOSN) keyed by tax id.
    #[serde(default)]
    pub tax_codes: BTreeMap<String, String>,

    /// Commercial unit.
    pub unit: String,

    pub quantity: Decimal,

    pub unit_price: Decimal,

    pub line_total: Decimal,
}

/// Document-level totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub products_total: Decimal,
    pub freight: Decimal,
    pub insurance: Decimal,
    pub discount: Decimal,
    /// Sum of the record's tax map.
    pub tax_total: Decimal,
    pub grand_total: Decimal,
}

/// Identification of the document itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub number: String,
    pub series: String,

    /// Issue date as printed (ISO 8601 for structured input).
    pub issue_date: String,

    /// 44-digit access key (chave de acesso).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
}

/// Join address components with `", "`, skipping blank ones.
pub fn join_address<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `part / whole * 100`, defined as zero when `whole` is zero.
///
/// Saturates at `Decimal::MAX` / `Decimal::MIN` when the ratio is out of range.
pub fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(if part.is_sign_negative() == whole.is_sign_negative() {
            Decimal::MAX
        } else {
            Decimal::MIN
        })
}

/// Sum that reports overflow instead of panicking.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

/// Sum clamped to the `Decimal` range.
pub fn saturating_sum(values: impl IntoIterator<Item = Decimal>) -> Decimal {
    values
        .into_iter()
        .fold(Decimal::ZERO, |acc, v| acc.saturating_add(v))
}
