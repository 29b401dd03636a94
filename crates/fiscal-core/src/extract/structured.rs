//! Deterministic extraction from NF-e XML trees.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::error::ExtractionError;
use crate::models::record::{
    join_address, DocumentMetadata, FiscalRecord, Issuer, LineItem, Recipient, RecordSource, Totals,
};
use crate::models::tax::TaxDefinition;

type Node = Map<String, Value>;

/// Total groups searched, in order, for a tax's XML fields.
const TOTAL_GROUPS: [&str; 2] = ["ICMSTot", "ISSQNtot"];

/// Address sub-elements in display order.
const ADDRESS_FIELDS: [&str; 7] = ["xLgr", "nro", "xCpl", "xBairro", "xMun", "UF", "CEP"];

/// Situation code fields: standard regime first, then the simplified regime.
const CODE_FIELDS: [&str; 2] = ["CST", "CSOSN"];

/// Walk an NF-e tree into a record bound to `taxes`.
///
/// A tree without an `infNFe` block yields an empty record whose tax map still
/// holds every tax at zero.
pub fn extract_structured(tree: &Value, taxes: &[TaxDefinition]) -> Result<FiscalRecord, ExtractionError> {
    let mut record = FiscalRecord::empty(RecordSource::Structured, taxes.iter().map(|t| t.id.as_str()));

    let Some(inf) = locate_invoice(tree)? else {
        warn!("No infNFe block found; returning an empty record");
        return Ok(record);
    };

    if let Some(emit) = object(inf, "emit", "infNFe.emit")? {
        record.issuer = issuer(emit)?;
    }
    if let Some(dest) = object(inf, "dest", "infNFe.dest")? {
        record.recipient = recipient(dest)?;
    }

    for (i, det) in elements(inf.get("det")).enumerate() {
        let path = format!("det[{}]", i + 1);
        let det = det.as_object().ok_or_else(|| ExtractionError::Structure {
            path: path.clone(),
            reason: "expected an element".to_string(),
        })?;
        record.line_items.push(line_item(det, &path, taxes)?);
    }

    if let Some(total) = object(inf, "total", "infNFe.total")? {
        let groups: Vec<&Node> = TOTAL_GROUPS
            .iter()
            .filter_map(|g| total.get(*g).and_then(Value::as_object))
            .collect();

        if let Some(icms_tot) = total.get("ICMSTot").and_then(Value::as_object) {
            record.totals = Totals {
                products_total: amount(icms_tot, "vProd", "ICMSTot.vProd")?,
                freight: amount(icms_tot, "vFrete", "ICMSTot.vFrete")?,
                insurance: amount(icms_tot, "vSeg", "ICMSTot.vSeg")?,
                discount: amount(icms_tot, "vDesc", "ICMSTot.vDesc")?,
                tax_total: Decimal::ZERO,
                grand_total: amount(icms_tot, "vNF", "ICMSTot.vNF")?,
            };
        }

        for tax in taxes {
            let mut sum = Decimal::ZERO;
            for field in &tax.xml_fields {
                if let Some(group) = groups.iter().find(|g| g.contains_key(field.as_str())) {
                    let path = format!("total.{}", field);
                    sum = sum
                        .checked_add(amount(group, field, &path)?)
                        .ok_or(ExtractionError::Overflow(path))?;
                }
            }
            trace!("Tax {} = {}", tax.id, sum);
            record.taxes.insert(tax.id.clone(), sum);
        }
    }
    record.totals.tax_total = record
        .taxes_sum()
        .ok_or_else(|| ExtractionError::Overflow("taxes".to_string()))?;

    if let Some(ide) = object(inf, "ide", "infNFe.ide")? {
        let issue_date = text(ide, "dhEmi");
        record.metadata = DocumentMetadata {
            number: text(ide, "nNF"),
            series: text(ide, "serie"),
            issue_date: if issue_date.is_empty() { text(ide, "dEmi") } else { issue_date },
            access_key: None,
        };
    }
    let key = text(inf, "@Id").replace("NFe", "");
    record.metadata.access_key = non_empty(key);

    debug!(
        "Extracted {} items, products total {}, taxes {}",
        record.line_items.len(),
        record.totals.products_total,
        record.totals.tax_total
    );
    Ok(record)
}

/// `nfeProc.NFe.infNFe` or `NFe.infNFe`.
fn locate_invoice(tree: &Value) -> Result<Option<&Node>, ExtractionError> {
    let nfe = match (tree.get("nfeProc"), tree.get("NFe")) {
        (Some(wrapper), _) => wrapper.get("NFe"),
        (None, Some(nfe)) => Some(nfe),
        (None, None) => None,
    };
    let Some(inf) = nfe.and_then(|n| n.get("infNFe")) else {
        return Ok(None);
    };
    inf.as_object()
        .map(Some)
        .ok_or_else(|| ExtractionError::Structure {
            path: "NFe.infNFe".to_string(),
            reason: "expected a single element".to_string(),
        })
}

fn issuer(emit: &Node) -> Result<Issuer, ExtractionError> {
    Ok(Issuer {
        tax_id: non_empty(text(emit, "CNPJ")),
        legal_name: text(emit, "xNome"),
        trade_name: non_empty(text(emit, "xFant")),
        address: address(object(emit, "enderEmit", "emit.enderEmit")?),
        state_registration: non_empty(text(emit, "IE")),
        municipal_registration: non_empty(text(emit, "IM")),
    })
}

fn recipient(dest: &Node) -> Result<Recipient, ExtractionError> {
    Ok(Recipient {
        tax_id: non_empty(text(dest, "CNPJ")),
        personal_id: non_empty(text(dest, "CPF")),
        name: text(dest, "xNome"),
        address: address(object(dest, "enderDest", "dest.enderDest")?),
        state_registration: non_empty(text(dest, "IE")),
    })
}

fn line_item(det: &Node, path: &str, taxes: &[TaxDefinition]) -> Result<LineItem, ExtractionError> {
    let empty = Node::new();
    let prod = object(det, "prod", path)?.unwrap_or(&empty);
    let imposto = object(det, "imposto", path)?.unwrap_or(&empty);

    let tax_codes = taxes
        .iter()
        .filter_map(|tax| {
            imposto
                .get(&tax.item_group_name())
                .and_then(Value::as_object)
                .and_then(situation_code)
                .map(|code| (tax.id.clone(), code))
        })
        .collect();

    Ok(LineItem {
        code: text(prod, "cProd"),
        description: text(prod, "xProd"),
        ncm: non_empty(text(prod, "NCM")),
        cfop: non_empty(text(prod, "CFOP")),
        tax_codes,
        unit: text(prod, "uCom"),
        quantity: amount(prod, "qCom", &format!("{}.qCom", path))?,
        unit_price: amount(prod, "vUnCom", &format!("{}.vUnCom", path))?,
        line_total: amount(prod, "vProd", &format!("{}.vProd", path))?,
    })
}

/// First CST/CSOSN found in the variant children of a tax group
/// (e.g. `ICMS/ICMS00/CST`, `ICMS/ICMSSN102/CSOSN`, `PIS/PISAliq/CST`).
fn situation_code(group: &Node) -> Option<String> {
    group.values().filter_map(Value::as_object).find_map(|variant| {
        CODE_FIELDS
            .iter()
            .map(|field| text(variant, field))
            .find(|code| !code.is_empty())
    })
}

fn address(node: Option<&Node>) -> String {
    match node {
        Some(node) => {
            let parts: Vec<String> = ADDRESS_FIELDS.iter().map(|f| text(node, f)).collect();
            join_address(parts.iter().map(String::as_str))
        }
        None => String::new(),
    }
}

/// Child element that must be an object when present.
fn object<'a>(node: &'a Node, key: &str, path: &str) -> Result<Option<&'a Node>, ExtractionError> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(ExtractionError::Structure {
            path: path.to_string(),
            reason: format!("expected {} to be an element", key),
        }),
    }
}

/// One element or a repeated list of elements.
fn elements(value: Option<&Value>) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        None | Some(Value::Null) => Box::new(std::iter::empty()),
        Some(Value::Array(items)) => Box::new(items.iter()),
        Some(single) => Box::new(std::iter::once(single)),
    }
}

/// Text content of a leaf, empty when absent.
fn text(node: &Node, key: &str) -> String {
    match node.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Object(map)) => map
            .get("#text")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Decimal leaf; absent means zero, unparseable is an error.
fn amount(node: &Node, key: &str, field: &str) -> Result<Decimal, ExtractionError> {
    let raw = text(node, key);
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| ExtractionError::Parse {
            field: field.to_string(),
            value: raw,
        })
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}
