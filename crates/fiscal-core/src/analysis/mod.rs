//! Statistics and heuristic recommendations over processed documents.
//!
//! Everything here is a pure function of already-validated output; nothing
//! touches the pipeline or the registry.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::record::{percent_of, saturating_sum, FiscalRecord, LineItem};
use crate::models::tax::TaxDefinition;
use crate::models::validation::ValidationResult;
use crate::pipeline::ProcessedDocument;

/// Tax burden above which a review is suggested.
const HIGH_BURDEN: Decimal = Decimal::from_parts(30, 0, 0, false, 0);
/// Tax burden above which consultancy is suggested.
const VERY_HIGH_BURDEN: Decimal = Decimal::from_parts(40, 0, 0, false, 0);
/// Discount share of the products total considered significant.
const DISCOUNT_SHARE: Decimal = Decimal::from_parts(15, 0, 0, false, 2);
/// Item count above which a document is considered large.
const MANY_ITEMS: usize = 50;
/// Number of issuers listed in the aggregate report.
const TOP_ISSUERS: usize = 5;

/// The slice of a processed document the aggregate report needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_type: Option<String>,
    pub issuer_name: Option<String>,
    pub total_value: Decimal,
    pub tax_total: Decimal,
    pub is_valid: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&ProcessedDocument> for DocumentSummary {
    fn from(doc: &ProcessedDocument) -> Self {
        let issuer = doc.record.issuer.legal_name.trim();
        Self {
            document_type: Some(doc.classification.document_type.label()),
            issuer_name: (!issuer.is_empty()).then(|| issuer.to_string()),
            total_value: doc.record.totals.grand_total,
            tax_total: doc.record.totals.tax_total,
            is_valid: doc.validation.is_valid,
            created_at: Some(doc.processed_at),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub total_documents: usize,
    pub total_value: Decimal,
    pub total_taxes: Decimal,
    pub average_value: Decimal,
    pub tax_burden_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub count: usize,
    pub total_value: Decimal,
    pub total_taxes: Decimal,
}

/// Aggregate statistics over many documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub overview: Overview,
    pub by_type: BTreeMap<String, usize>,
    pub top_issuers: Vec<IssuerCount>,
    /// Keyed by `YYYY-MM`, ascending.
    pub monthly_trend: BTreeMap<String, MonthlyBucket>,
    pub insights: Vec<String>,
}

/// Analyze a collection of processed documents.
pub fn analyze(documents: &[DocumentSummary]) -> AggregateReport {
    if documents.is_empty() {
        return AggregateReport {
            insights: vec!["No documents processed".to_string()],
            ..Default::default()
        };
    }

    let total_documents = documents.len();
    let total_value = saturating_sum(documents.iter().map(|d| d.total_value));
    let total_taxes = saturating_sum(documents.iter().map(|d| d.tax_total));
    let burden = percent_of(total_taxes, total_value);

    let overview = Overview {
        total_documents,
        total_value,
        total_taxes,
        average_value: (total_value / Decimal::from(total_documents)).round_dp(2),
        tax_burden_percent: burden.round_dp(2),
    };

    let by_type: BTreeMap<String, usize> = documents
        .iter()
        .filter_map(|d| d.document_type.as_deref())
        .fold(BTreeMap::new(), |mut acc, t| {
            *acc.entry(t.to_string()).or_insert(0) += 1;
            acc
        });

    let top_issuers = most_common(documents.iter().filter_map(|d| d.issuer_name.as_deref()), TOP_ISSUERS)
        .into_iter()
        .map(|(name, count)| IssuerCount { name, count })
        .collect();

    let mut monthly_trend: BTreeMap<String, MonthlyBucket> = BTreeMap::new();
    for doc in documents {
        if let Some(created_at) = doc.created_at {
            let bucket = monthly_trend
                .entry(created_at.format("%Y-%m").to_string())
                .or_default();
            bucket.count += 1;
            bucket.total_value = bucket.total_value.saturating_add(doc.total_value);
            bucket.total_taxes = bucket.total_taxes.saturating_add(doc.tax_total);
        }
    }

    let insights = aggregate_insights(documents, total_value, burden, &by_type);
    debug!("Analyzed {} documents, {} insights", total_documents, insights.len());

    AggregateReport {
        overview,
        by_type,
        top_issuers,
        monthly_trend,
        insights,
    }
}

fn aggregate_insights(
    documents: &[DocumentSummary],
    total_value: Decimal,
    burden: Decimal,
    by_type: &BTreeMap<String, usize>,
) -> Vec<String> {
    let mut insights = Vec::new();

    if burden > HIGH_BURDEN {
        insights.push(format!(
            "Tax burden above 30% ({:.1}%): consider reviewing the tax regime",
            burden
        ));
    }
    if burden > VERY_HIGH_BURDEN {
        insights.push(format!(
            "Very high tax burden (>40%, {:.1}%): fiscal consultancy recommended",
            burden
        ));
    }

    let invalid = documents.iter().filter(|d| !d.is_valid).count();
    if invalid > 0 {
        let rate = percent_of(Decimal::from(invalid), Decimal::from(documents.len()));
        insights.push(format!("Documents with errors: {:.1}%", rate));
    }

    if insights.is_empty() {
        insights.push("No issues found".to_string());
    }

    if total_value > Decimal::ZERO {
        insights.push(format!("Average tax burden: {:.1}%", burden));
    }

    // Ties go to the type seen first in name order.
    let most_common_type = by_type.iter().fold(None, |best: Option<(&String, usize)>, (t, &n)| match best {
        Some((_, m)) if m >= n => best,
        _ => Some((t, n)),
    });
    if let Some((doc_type, count)) = most_common_type {
        insights.push(format!("Most common type: {} ({} documents)", doc_type, count));
    }

    insights
}

/// Frequency ranking, ties kept in first-seen order.
fn most_common<'a>(values: impl Iterator<Item = &'a str>, limit: usize) -> Vec<(String, usize)> {
    let mut order: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for value in values {
        match index.get(value) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(value, order.len());
                order.push((value.to_string(), 1));
            }
        }
    }
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order.truncate(limit);
    order
}

/// Value of one tax and its share of the products total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxShare {
    pub value: Decimal,
    pub percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub issuer: String,
    pub recipient: String,
    pub item_count: usize,
    pub grand_total: Decimal,
    pub tax_total: Decimal,
    /// Taxes as a percentage of the grand total.
    pub tax_margin_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxAnalysis {
    pub breakdown: BTreeMap<String, TaxShare>,
    pub total: Decimal,
    pub burden_percent: Decimal,
    pub largest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRef {
    pub description: String,
    pub value: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemStats {
    pub count: usize,
    pub mean_line_total: Decimal,
    pub total_quantity: Decimal,
    pub most_expensive: Option<ItemRef>,
    pub largest_quantity: Option<ItemRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub gross: Decimal,
    pub discounts: Decimal,
    pub additions: Decimal,
    pub taxes: Decimal,
    pub net: Decimal,
    pub net_margin_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compliance {
    pub is_compliant: bool,
    pub issue_count: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Analysis of a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub summary: RecordSummary,
    pub taxes: TaxAnalysis,
    pub items: ItemStats,
    pub financial: FinancialSummary,
    pub compliance: Compliance,
    pub recommendations: Vec<String>,
}

/// Analyze one record together with its validation verdict.
pub fn analyze_document(record: &FiscalRecord, validation: &ValidationResult) -> DocumentAnalysis {
    let totals = &record.totals;

    let summary = RecordSummary {
        issuer: or_na(&record.issuer.legal_name),
        recipient: or_na(&record.recipient.name),
        item_count: record.line_items.len(),
        grand_total: totals.grand_total,
        tax_total: totals.tax_total,
        tax_margin_percent: percent_of(totals.tax_total, totals.grand_total).round_dp(2),
    };

    let breakdown: BTreeMap<String, TaxShare> = record
        .taxes
        .iter()
        .map(|(id, &value)| {
            let share = TaxShare {
                value,
                percent: percent_of(value, totals.products_total).round_dp(2),
            };
            (id.clone(), share)
        })
        .collect();
    let largest = record
        .taxes
        .iter()
        .fold(None, |best: Option<(&String, Decimal)>, (id, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((id, v)),
        })
        .map(|(id, _)| id.clone());
    let tax_sum = saturating_sum(record.taxes.values().copied());
    let taxes = TaxAnalysis {
        breakdown,
        total: tax_sum,
        burden_percent: percent_of(tax_sum, totals.products_total).round_dp(2),
        largest,
    };

    let net = totals.grand_total.saturating_sub(totals.tax_total);
    let financial = FinancialSummary {
        gross: totals.products_total,
        discounts: totals.discount,
        additions: totals.freight.saturating_add(totals.insurance),
        taxes: totals.tax_total,
        net,
        net_margin_percent: if totals.grand_total > Decimal::ZERO {
            percent_of(net, totals.grand_total).round_dp(2)
        } else {
            Decimal::ZERO
        },
    };

    let compliance = Compliance {
        is_compliant: validation.is_valid,
        issue_count: validation.issue_count(),
        errors: validation.errors.clone(),
        warnings: validation.warnings.clone(),
    };

    DocumentAnalysis {
        summary,
        taxes,
        items: item_stats(&record.line_items),
        financial,
        compliance,
        recommendations: recommendations(record),
    }
}

fn or_na(value: &str) -> String {
    if value.trim().is_empty() {
        "N/A".to_string()
    } else {
        value.to_string()
    }
}

fn item_stats(items: &[LineItem]) -> ItemStats {
    if items.is_empty() {
        return ItemStats::default();
    }

    let total = saturating_sum(items.iter().map(|i| i.line_total));
    // First item wins ties, so iterate in reverse for max_by_key.
    let most_expensive = items.iter().rev().max_by_key(|i| i.line_total).map(|i| ItemRef {
        description: or_na(&i.description),
        value: i.line_total,
    });
    let largest_quantity = items.iter().rev().max_by_key(|i| i.quantity).map(|i| ItemRef {
        description: or_na(&i.description),
        value: i.quantity,
    });

    ItemStats {
        count: items.len(),
        mean_line_total: (total / Decimal::from(items.len())).round_dp(2),
        total_quantity: saturating_sum(items.iter().map(|i| i.quantity)),
        most_expensive,
        largest_quantity,
    }
}

fn recommendations(record: &FiscalRecord) -> Vec<String> {
    let mut out = Vec::new();
    let products = record.totals.products_total;

    if products > Decimal::ZERO {
        let burden = percent_of(saturating_sum(record.taxes.values().copied()), products);
        if burden > HIGH_BURDEN {
            out.push("Tax burden above 30%: consider reviewing the tax regime".to_string());
        }
        if burden > VERY_HIGH_BURDEN {
            out.push("Very high tax burden (>40%): fiscal consultancy recommended".to_string());
        }
    }

    if record.totals.discount > products * DISCOUNT_SHARE {
        out.push("Significant discount applied (>15%): check the profit margin".to_string());
    }

    if record.line_items.len() > MANY_ITEMS {
        out.push("Invoice with many items: consider an ERP system to manage them".to_string());
    }

    if out.is_empty() {
        out.push("Document within normal parameters".to_string());
    }
    out
}

/// Sum of each tax across records; every given tax gets a key.
pub fn tax_totals(records: &[FiscalRecord], taxes: &[TaxDefinition]) -> BTreeMap<String, Decimal> {
    taxes
        .iter()
        .map(|t| (t.id.clone(), saturating_sum(records.iter().map(|r| r.tax(&t.id)))))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCount {
    pub description: String,
    pub count: usize,
}

/// Most frequent item descriptions across records.
pub fn top_products(records: &[FiscalRecord], limit: usize) -> Vec<ProductCount> {
    let descriptions = records
        .iter()
        .flat_map(|r| r.line_items.iter())
        .map(|i| i.description.trim())
        .filter(|d| !d.is_empty());
    most_common(descriptions, limit)
        .into_iter()
        .map(|(description, count)| ProductCount { description, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::RecordSource;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn summary(doc_type: &str, issuer: &str, total: &str, taxes: &str, month: u32) -> DocumentSummary {
        DocumentSummary {
            document_type: Some(doc_type.to_string()),
            issuer_name: Some(issuer.to_string()),
            total_value: dec(total),
            tax_total: dec(taxes),
            is_valid: true,
            created_at: Some(Utc.with_ymd_and_hms(2024, month, 10, 12, 0, 0).unwrap()),
        }
    }

    fn burden_report(taxes: &str) -> AggregateReport {
        analyze(&[summary("NFe", "A", "100", taxes, 1)])
    }

    #[test]
    fn test_burden_thresholds() {
        let at_30 = burden_report("30.00");
        assert!(!at_30.insights.iter().any(|i| i.contains("above 30%")));
        assert_eq!(at_30.insights[0], "No issues found");

        let above_30 = burden_report("30.01");
        assert!(above_30.insights[0].starts_with("Tax burden above 30%"));
        assert!(!above_30.insights.iter().any(|i| i.contains(">40%")));

        let above_40 = burden_report("40.01");
        assert!(above_40.insights[0].starts_with("Tax burden above 30%"));
        assert!(above_40.insights[1].starts_with("Very high tax burden (>40%"));
        assert!(!above_40.insights.contains(&"No issues found".to_string()));
    }

    #[test]
    fn test_overview_and_buckets() {
        let docs = vec![
            summary("NFe", "Alpha", "100.00", "10.00", 3),
            summary("NFCe", "Beta", "50.00", "5.00", 1),
            summary("NFe", "Alpha", "150.00", "15.00", 3),
        ];
        let report = analyze(&docs);

        assert_eq!(report.overview.total_documents, 3);
        assert_eq!(report.overview.total_value, dec("300.00"));
        assert_eq!(report.overview.average_value, dec("100.00"));
        assert_eq!(report.overview.tax_burden_percent, dec("10.00"));

        let expected: BTreeMap<String, usize> = [("NFCe".to_string(), 1), ("NFe".to_string(), 2)].into();
        assert_eq!(report.by_type, expected);
        assert_eq!(
            report.top_issuers,
            vec![
                IssuerCount { name: "Alpha".to_string(), count: 2 },
                IssuerCount { name: "Beta".to_string(), count: 1 },
            ]
        );

        let months: Vec<&str> = report.monthly_trend.keys().map(String::as_str).collect();
        assert_eq!(months, vec!["2024-01", "2024-03"]);
        assert_eq!(report.monthly_trend["2024-03"].count, 2);
        assert_eq!(report.monthly_trend["2024-03"].total_taxes, dec("25.00"));

        assert_eq!(
            report.insights,
            vec![
                "No issues found",
                "Average tax burden: 10.0%",
                "Most common type: NFe (2 documents)"
            ]
        );
    }

    #[test]
    fn test_top_issuers_limit_and_ties() {
        let docs: Vec<DocumentSummary> = ["F", "E", "D", "C", "B", "A", "A"]
            .iter()
            .map(|name| summary("NFe", name, "1", "0", 1))
            .collect();
        let names: Vec<String> = analyze(&docs).top_issuers.into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["A", "F", "E", "D", "C"]);
    }

    #[test]
    fn test_error_rate_and_zero_value() {
        let mut invalid = summary("NFe", "A", "0", "0", 1);
        invalid.is_valid = false;
        invalid.created_at = None;
        let report = analyze(&[invalid, summary("NFe", "B", "0", "0", 2)]);

        assert_eq!(report.overview.tax_burden_percent, Decimal::ZERO);
        assert_eq!(report.insights[0], "Documents with errors: 50.0%");
        assert_eq!(report.monthly_trend.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let report = analyze(&[]);
        assert_eq!(report.overview.total_documents, 0);
        assert_eq!(report.insights, vec!["No documents processed"]);
    }

    fn record() -> FiscalRecord {
        let mut record = FiscalRecord::empty(RecordSource::Structured, ["icms", "pis"]);
        record.issuer.legal_name = "Empresa".to_string();
        record.totals.products_total = dec("100.00");
        record.totals.grand_total = dec("110.00");
        record.totals.freight = dec("10.00");
        record.line_items = vec![
            LineItem {
                description: "Caneta".to_string(),
                quantity: dec("10"),
                line_total: dec("20.00"),
                ..Default::default()
            },
            LineItem {
                description: "Caderno".to_string(),
                quantity: dec("2"),
                line_total: dec("80.00"),
                ..Default::default()
            },
        ];
        record
    }

    fn clean() -> ValidationResult {
        ValidationResult::from_parts(Vec::new(), vec!["Access key not found".to_string()], Default::default())
    }

    #[test]
    fn test_document_analysis() {
        let mut record = record();
        record.taxes.insert("icms".to_string(), dec("18.00"));
        record.taxes.insert("pis".to_string(), dec("1.65"));
        record.totals.tax_total = record.taxes_sum().unwrap();

        let analysis = analyze_document(&record, &clean());
        assert_eq!(analysis.summary.issuer, "Empresa");
        assert_eq!(analysis.summary.recipient, "N/A");
        assert_eq!(analysis.taxes.breakdown["icms"].percent, dec("18.00"));
        assert_eq!(analysis.taxes.largest.as_deref(), Some("icms"));
        assert_eq!(analysis.taxes.burden_percent, dec("19.65"));
        assert_eq!(analysis.items.mean_line_total, dec("50.00"));
        assert_eq!(analysis.items.total_quantity, dec("12"));
        assert_eq!(analysis.items.most_expensive.as_ref().unwrap().description, "Caderno");
        assert_eq!(analysis.items.largest_quantity.as_ref().unwrap().description, "Caneta");
        assert_eq!(analysis.financial.additions, dec("10.00"));
        assert_eq!(analysis.financial.net, dec("90.35"));
        assert!(analysis.compliance.is_compliant);
        assert_eq!(analysis.compliance.issue_count, 1);
        assert_eq!(analysis.recommendations, vec!["Document within normal parameters"]);
    }

    #[test]
    fn test_document_recommendations() {
        let mut record = record();
        record.taxes.insert("icms".to_string(), dec("45.00"));
        record.totals.discount = dec("15.01");
        record.line_items = vec![LineItem::default(); 51];

        let recs = analyze_document(&record, &clean()).recommendations;
        assert_eq!(recs.len(), 4);
        assert!(recs[0].starts_with("Tax burden above 30%"));
        assert!(recs[1].starts_with("Very high tax burden"));
        assert!(recs[2].starts_with("Significant discount"));
        assert!(recs[3].starts_with("Invoice with many items"));
    }

    #[test]
    fn test_huge_amounts_saturate() {
        let huge = "70000000000000000000000000000";
        let report = analyze(&[
            summary("NFe", "A", huge, huge, 1),
            summary("NFe", "B", huge, huge, 1),
        ]);
        assert_eq!(report.overview.total_value, Decimal::MAX);
        assert_eq!(report.overview.total_taxes, Decimal::MAX);
        assert_eq!(report.monthly_trend["2024-01"].total_value, Decimal::MAX);
        assert_eq!(report.overview.tax_burden_percent, dec("100"));

        let mut record = record();
        record.taxes.insert("icms".to_string(), dec(huge));
        record.taxes.insert("pis".to_string(), dec(huge));
        record.totals.grand_total = Decimal::MIN;
        record.totals.tax_total = dec(huge);
        record.line_items[0].line_total = dec(huge);
        record.line_items[1].line_total = dec(huge);

        let analysis = analyze_document(&record, &clean());
        assert_eq!(analysis.taxes.total, Decimal::MAX);
        assert_eq!(analysis.financial.net, Decimal::MIN);
        assert_eq!(analysis.items.count, 2);
        assert!(analysis.recommendations[0].starts_with("Tax burden above 30%"));

        let totals = tax_totals(
            &[record.clone(), record],
            &[TaxDefinition::new("icms", "ICMS", crate::models::tax::TaxScope::State, &["vICMS"])],
        );
        assert_eq!(totals["icms"], Decimal::MAX);
    }

    #[test]
    fn test_tax_totals_and_top_products() {
        let mut a = record();
        a.taxes.insert("icms".to_string(), dec("5.00"));
        let mut b = record();
        b.taxes.insert("icms".to_string(), dec("2.50"));
        b.line_items.truncate(1);

        let taxes = vec![
            TaxDefinition::new("icms", "ICMS", crate::models::tax::TaxScope::State, &["vICMS"]),
            TaxDefinition::new("iss", "ISS", crate::models::tax::TaxScope::Municipal, &["vISS"]),
        ];
        let totals = tax_totals(&[a.clone(), b.clone()], &taxes);
        assert_eq!(totals["icms"], dec("7.50"));
        assert_eq!(totals["iss"], Decimal::ZERO);

        let top = top_products(&[a, b], 1);
        assert_eq!(top, vec![ProductCount { description: "Caneta".to_string(), count: 2 }]);
    }
}
