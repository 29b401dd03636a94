//! Dynamic tax definitions and the persisted configuration document.

use serde::{Deserialize, Serialize};

use super::document::DocumentType;

/// Government level that levies a tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxScope {
    Federal,
    State,
    Municipal,
}

/// One configurable tax type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxDefinition {
    /// Unique lowercase slug (e.g. `icms`).
    pub id: String,

    /// Short display name.
    pub name: String,

    /// Full legal name.
    #[serde(default)]
    pub full_name: String,

    #[serde(default)]
    pub description: String,

    /// Fields of the XML totals block summed to obtain this tax.
    pub xml_fields: Vec<String>,

    /// Display colour for charts.
    #[serde(default = "default_color")]
    pub color: String,

    pub scope: TaxScope,

    /// Document types this tax applies to.
    #[serde(default)]
    pub applies_to: Vec<DocumentType>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Element name of the per-item tax group in the XML (e.g. `ISSQN`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_group: Option<String>,
}

fn default_color() -> String {
    "#808080".to_string()
}

fn default_enabled() -> bool {
    true
}

impl TaxDefinition {
    /// Create an enabled definition with no applicability restrictions.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        scope: TaxScope,
        xml_fields: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            full_name: String::new(),
            description: String::new(),
            xml_fields: xml_fields.iter().map(|f| f.to_string()).collect(),
            color: default_color(),
            scope,
            applies_to: Vec::new(),
            enabled: true,
            item_group: None,
        }
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_applies_to(mut self, types: &[DocumentType]) -> Self {
        self.applies_to = types.to_vec();
        self
    }

    pub fn with_item_group(mut self, group: impl Into<String>) -> Self {
        self.item_group = Some(group.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// XML element holding this tax inside each item's `imposto` block.
    pub fn item_group_name(&self) -> String {
        self.item_group
            .clone()
            .unwrap_or_else(|| self.id.to_uppercase())
    }

    /// Label used in prompts and reports.
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.name
        } else {
            &self.full_name
        }
    }

    /// Whether this tax applies to the given document type.
    pub fn applies_to_type(&self, doc_type: DocumentType) -> bool {
        self.applies_to.contains(&doc_type)
    }
}

/// One entry of the append-only change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Local timestamp, `%Y-%m-%d %H:%M:%S`.
    #[serde(rename = "date")]
    pub timestamp: String,

    #[serde(rename = "change")]
    pub description: String,

    pub author: String,
}

/// Metadata block of the configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    #[serde(default)]
    pub change_history: Vec<ChangeRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,

    /// Keys this crate does not interpret, preserved on save.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The persisted tax configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxConfigDocument {
    pub taxes: Vec<TaxDefinition>,

    #[serde(default)]
    pub metadata: ConfigMetadata,
}

impl TaxConfigDocument {
    /// Configuration shipped with a fresh installation.
    pub fn with_defaults() -> Self {
        Self {
            taxes: default_taxes(),
            metadata: ConfigMetadata::default(),
        }
    }

    pub fn find(&self, id: &str) -> Option<&TaxDefinition> {
        self.taxes.iter().find(|t| t.id == id)
    }
}

/// The five taxes enabled out of the box.
pub fn default_taxes() -> Vec<TaxDefinition> {
    use DocumentType::*;

    vec![
        TaxDefinition::new("icms", "ICMS", TaxScope::State, &["vICMS", "vST"])
            .with_full_name("Imposto sobre Circulação de Mercadorias e Serviços")
            .with_description("State tax on goods circulation, including tax substitution")
            .with_color("#1f77b4")
            .with_applies_to(&[InvoiceElectronic, InvoiceConsumer, SatReceipt, FiscalReceipt]),
        TaxDefinition::new("ipi", "IPI", TaxScope::Federal, &["vIPI"])
            .with_full_name("Imposto sobre Produtos Industrializados")
            .with_description("Federal tax on industrialized products")
            .with_color("#ff7f0e")
            .with_applies_to(&[InvoiceElectronic]),
        TaxDefinition::new("pis", "PIS", TaxScope::Federal, &["vPIS"])
            .with_full_name("Programa de Integração Social")
            .with_description("Federal social contribution on revenue")
            .with_color("#2ca02c")
            .with_applies_to(&[InvoiceElectronic, InvoiceConsumer, ServiceInvoice]),
        TaxDefinition::new("cofins", "COFINS", TaxScope::Federal, &["vCOFINS"])
            .with_full_name("Contribuição para o Financiamento da Seguridade Social")
            .with_description("Federal social security contribution on revenue")
            .with_color("#d62728")
            .with_applies_to(&[InvoiceElectronic, InvoiceConsumer, ServiceInvoice]),
        TaxDefinition::new("iss", "ISS", TaxScope::Municipal, &["vISS"])
            .with_full_name("Imposto Sobre Serviços")
            .with_description("Municipal tax on services")
            .with_color("#9467bd")
            .with_applies_to(&[ServiceInvoice, InvoiceElectronic])
            .with_item_group("ISSQN"),
    ]
}
