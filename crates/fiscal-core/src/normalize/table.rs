//! Spreadsheet exports (CSV) with one fiscal document per row.
//!
//! Column headers are matched against known Portuguese names, so tables from
//! different ERPs import without a manual mapping. The tax columns follow the
//! registry: a `valor_<id>` or `vl_<id>` column is recognized for every tax id
//! handed to the importer.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, warn};

use crate::error::NormalizeError;
use crate::extract::parse_brl_amount;
use crate::models::document::{DocumentType, InputFormat};
use crate::models::record::{checked_sum, FiscalRecord};

/// Table extensions accepted by [`TableImporter::read_path`].
pub const TABLE_EXTENSIONS: &[&str] = &["csv"];

/// Record field a column can feed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableField {
    IssuerName,
    IssuerId,
    RecipientName,
    RecipientId,
    Number,
    Series,
    IssueDate,
    GrandTotal,
    ProductsTotal,
    Discount,
    Freight,
    Insurance,
    AccessKey,
    DocumentType,
    /// Amount of the tax with this registry id.
    Tax(String),
}

impl TableField {
    /// Normalized header names that select this field, most specific first.
    fn patterns(&self) -> Vec<String> {
        let fixed: &[&str] = match self {
            TableField::IssuerName => &[
                "emitente",
                "nome_emitente",
                "razao_social_emitente",
                "fornecedor",
                "remetente",
            ],
            TableField::IssuerId => &[
                "cnpj_emitente",
                "cpf_emitente",
                "cnpj_fornecedor",
                "doc_emitente",
            ],
            TableField::RecipientName => &[
                "destinatario",
                "nome_destinatario",
                "razao_social_destinatario",
                "cliente",
            ],
            TableField::RecipientId => &[
                "cnpj_destinatario",
                "cpf_destinatario",
                "cnpj_cliente",
                "cpf_cliente",
                "doc_destinatario",
            ],
            TableField::Number => &["numero_nota", "numero_nf", "num_nf", "numero", "nota", "nf"],
            TableField::Series => &["serie", "serie_nf"],
            TableField::IssueDate => &["data_emissao", "dt_emissao", "emissao", "data_nf", "data"],
            TableField::GrandTotal => &["valor_total", "vl_total", "vlr_total", "valor_nf", "total"],
            TableField::ProductsTotal => &["valor_produtos", "vl_produtos", "vlr_produtos", "produtos"],
            TableField::Discount => &["valor_desconto", "vl_desconto", "desconto"],
            TableField::Freight => &["valor_frete", "vl_frete", "frete"],
            TableField::Insurance => &["valor_seguro", "vl_seguro", "seguro"],
            TableField::AccessKey => &["chave_acesso", "chave_nfe", "chave_nota", "access_key", "chave"],
            TableField::DocumentType => &["tipo_documento", "tipo_nf", "tipo_nota", "modelo", "tipo"],
            TableField::Tax(id) => {
                return ["valor_", "vl_", "vlr_", ""]
                    .iter()
                    .map(|prefix| format!("{prefix}{id}"))
                    .collect();
            }
        };
        fixed.iter().map(|p| p.to_string()).collect()
    }

    /// Every field except the per-tax ones, in detection order.
    pub fn standard() -> [TableField; 14] {
        [
            // Identifier columns first, so "cnpj_emitente" is not taken as a name
            TableField::IssuerId,
            TableField::RecipientId,
            TableField::IssuerName,
            TableField::RecipientName,
            TableField::AccessKey,
            TableField::DocumentType,
            TableField::ProductsTotal,
            TableField::Discount,
            TableField::Freight,
            TableField::Insurance,
            TableField::GrandTotal,
            TableField::Series,
            TableField::IssueDate,
            TableField::Number,
        ]
    }
}

impl fmt::Display for TableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableField::IssuerName => "issuer_name",
            TableField::IssuerId => "issuer_id",
            TableField::RecipientName => "recipient_name",
            TableField::RecipientId => "recipient_id",
            TableField::Number => "number",
            TableField::Series => "series",
            TableField::IssueDate => "issue_date",
            TableField::GrandTotal => "grand_total",
            TableField::ProductsTotal => "products_total",
            TableField::Discount => "discount",
            TableField::Freight => "freight",
            TableField::Insurance => "insurance",
            TableField::AccessKey => "access_key",
            TableField::DocumentType => "document_type",
            TableField::Tax(id) => return f.pad(&format!("tax:{id}")),
        };
        f.pad(name)
    }
}

/// Lowercase, fold Portuguese accents and turn spaces and dashes into `_`.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' | 'ü' => 'u',
            'ç' => 'c',
            ' ' | '-' | '.' => '_',
            other => other,
        })
        .collect()
}

/// Which column feeds which field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMapping {
    headers: Vec<String>,
    columns: BTreeMap<TableField, usize>,
}

impl ColumnMapping {
    /// Guess the mapping from the header row.
    ///
    /// Exact header matches are resolved for every field before any
    /// substring match, and a column feeds at most one field.
    pub fn detect<S: AsRef<str>>(headers: &[S], tax_ids: &[String]) -> Self {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| normalize_header(h.as_ref()))
            .collect();
        let fields: Vec<TableField> = TableField::standard()
            .into_iter()
            .chain(tax_ids.iter().map(|id| TableField::Tax(id.to_lowercase())))
            .collect();

        let mut mapping = Self {
            headers: headers.iter().map(|h| h.as_ref().trim().to_string()).collect(),
            columns: BTreeMap::new(),
        };

        // Tax fields go first in the exact pass so "icms" is never claimed by a fixed field
        let exact_order = fields
            .iter()
            .filter(|f| matches!(f, TableField::Tax(_)))
            .chain(fields.iter().filter(|f| !matches!(f, TableField::Tax(_))));
        for field in exact_order {
            if let Some(col) = field
                .patterns()
                .iter()
                .find_map(|p| mapping.free_column(&normalized, |h| h == p.as_str()))
            {
                mapping.columns.insert(field.clone(), col);
            }
        }

        for field in &fields {
            if mapping.columns.contains_key(field) {
                continue;
            }
            let patterns = field.patterns();
            // Single-word patterns ("nf", "total") only match whole words
            if let Some(col) = patterns.iter().find_map(|p| {
                mapping.free_column(&normalized, |h| {
                    h.split('_').any(|word| word == p.as_str())
                        || (p.contains('_') && h.contains(p.as_str()))
                })
            }) {
                mapping.columns.insert(field.clone(), col);
            }
        }

        debug!("Detected table mapping: {}", mapping.describe());
        mapping
    }

    fn free_column(&self, normalized: &[String], matches: impl Fn(&str) -> bool) -> Option<usize> {
        normalized
            .iter()
            .enumerate()
            .find(|(i, h)| !self.columns.values().any(|c| c == i) && matches(h.as_str()))
            .map(|(i, _)| i)
    }

    /// Point a field at a header explicitly. Returns `false` when the header
    /// is not in the table.
    pub fn set(&mut self, field: TableField, header: &str) -> bool {
        let wanted = normalize_header(header);
        match self.headers.iter().position(|h| normalize_header(h) == wanted) {
            Some(col) => {
                self.columns.retain(|_, c| *c != col);
                self.columns.insert(field, col);
                true
            }
            None => false,
        }
    }

    /// Header mapped to a field.
    pub fn header(&self, field: &TableField) -> Option<&str> {
        self.columns
            .get(field)
            .and_then(|&col| self.headers.get(col))
            .map(String::as_str)
    }

    /// Headers that feed no field.
    pub fn unmapped(&self) -> Vec<&str> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.columns.values().any(|c| c == i))
            .map(|(_, h)| h.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn describe(&self) -> String {
        self.columns
            .iter()
            .filter_map(|(field, &col)| self.headers.get(col).map(|h| format!("{field}={h}")))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn cell<'r>(&self, row: &'r StringRecord, field: &TableField) -> Option<&'r str> {
        self.columns
            .get(field)
            .and_then(|&col| row.get(col))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// One imported row.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedRow {
    /// 1-based data row number (the header row is not counted).
    pub row: usize,
    pub document_type: DocumentType,
    pub record: FiscalRecord,
}

/// Result of importing a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableImport {
    pub mapping: ColumnMapping,
    pub rows: Vec<ImportedRow>,
    /// Rows that could not be turned into a record, with the reason.
    pub skipped: Vec<(usize, String)>,
}

/// Reads CSV exports into fiscal records.
#[derive(Debug, Clone)]
pub struct TableImporter {
    tax_ids: Vec<String>,
    delimiter: Option<u8>,
}

impl TableImporter {
    /// Importer that fills exactly these tax ids on every record.
    pub fn new<I, S>(tax_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tax_ids: tax_ids.into_iter().map(Into::into).collect(),
            delimiter: None,
        }
    }

    /// Force a delimiter instead of sniffing `;` or `,` from the header row.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Read and import a CSV file.
    pub fn read_path(&self, path: &Path) -> Result<TableImport, NormalizeError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !TABLE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(NormalizeError::UnsupportedFormat(path.display().to_string()));
        }

        let bytes = std::fs::read(path).map_err(|e| NormalizeError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.read(&bytes)
    }

    /// Import CSV content with the detected mapping.
    pub fn read(&self, content: &[u8]) -> Result<TableImport, NormalizeError> {
        self.read_with_mapping(content, |_| {})
    }

    /// Import CSV content, letting the caller adjust the detected mapping
    /// before any row is converted. Non-UTF-8 input is read as Latin-1.
    pub fn read_with_mapping(
        &self,
        content: &[u8],
        adjust: impl FnOnce(&mut ColumnMapping),
    ) -> Result<TableImport, NormalizeError> {
        let text = match std::str::from_utf8(content) {
            Ok(text) => text.to_string(),
            Err(_) => {
                debug!("Table is not UTF-8, reading as Latin-1");
                content.iter().map(|&b| b as char).collect()
            }
        };

        let delimiter = self.delimiter.unwrap_or_else(|| sniff_delimiter(&text));
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| NormalizeError::Table(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        let mut mapping = ColumnMapping::detect(&headers, &self.tax_ids);
        adjust(&mut mapping);
        if mapping.is_empty() {
            return Err(NormalizeError::Table(format!(
                "no recognizable columns in header: {}",
                headers.join(", ")
            )));
        }

        let mut import = TableImport {
            mapping,
            ..Default::default()
        };
        for (index, result) in reader.records().enumerate() {
            let row = index + 1;
            let outcome = result
                .map_err(|e| e.to_string())
                .and_then(|record| self.convert(&import.mapping, &record));
            match outcome {
                Ok(Some((document_type, record))) => import.rows.push(ImportedRow {
                    row,
                    document_type,
                    record,
                }),
                Ok(None) => debug!("Skipping blank row {row}"),
                Err(reason) => {
                    warn!("Skipping table row {row}: {reason}");
                    import.skipped.push((row, reason));
                }
            }
        }

        debug!(
            "Imported {} rows ({} skipped)",
            import.rows.len(),
            import.skipped.len()
        );
        Ok(import)
    }

    fn convert(
        &self,
        mapping: &ColumnMapping,
        row: &StringRecord,
    ) -> Result<Option<(DocumentType, FiscalRecord)>, String> {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            return Ok(None);
        }

        let text = |field: TableField| mapping.cell(row, &field).unwrap_or_default().to_string();
        let amount = |field: TableField| {
            mapping
                .cell(row, &field)
                .and_then(|v| {
                    let parsed = parse_brl_amount(v);
                    if parsed.is_none() {
                        debug!("Unreadable amount {v:?} for {field}, using zero");
                    }
                    parsed
                })
                .unwrap_or_default()
        };

        let id = |field: TableField| {
            mapping
                .cell(row, &field)
                .map(clean_tax_id)
                .filter(|digits| !digits.is_empty())
        };

        let mut record = FiscalRecord::empty(
            InputFormat::Structured,
            self.tax_ids.iter().map(String::as_str),
        );

        record.issuer.legal_name = text(TableField::IssuerName);
        record.issuer.tax_id = id(TableField::IssuerId);

        record.recipient.name = text(TableField::RecipientName);
        if let Some(digits) = id(TableField::RecipientId) {
            if digits.len() == 11 {
                record.recipient.personal_id = Some(digits);
            } else {
                record.recipient.tax_id = Some(digits);
            }
        }

        record.metadata.number = text(TableField::Number);
        record.metadata.series = text(TableField::Series);
        record.metadata.issue_date = text(TableField::IssueDate);
        record.metadata.access_key = id(TableField::AccessKey);

        record.totals.products_total = amount(TableField::ProductsTotal);
        record.totals.discount = amount(TableField::Discount);
        record.totals.freight = amount(TableField::Freight);
        record.totals.insurance = amount(TableField::Insurance);
        record.totals.grand_total = amount(TableField::GrandTotal);

        for id in &self.tax_ids {
            record
                .taxes
                .insert(id.clone(), amount(TableField::Tax(id.to_lowercase())));
        }
        record.totals.tax_total = checked_sum(record.taxes.values().copied())
            .ok_or_else(|| "tax amounts out of range".to_string())?;

        let document_type = mapping
            .cell(row, &TableField::DocumentType)
            .map(parse_document_type)
            .unwrap_or(DocumentType::InvoiceElectronic);

        Ok(Some((document_type, record)))
    }
}

/// Keep digits only ("11.222.333/0001-81" becomes "11222333000181").
pub fn clean_tax_id(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Document type from a short code or an invoice model number.
fn parse_document_type(value: &str) -> DocumentType {
    if let Some(doc_type) = DocumentType::from_code(value) {
        return doc_type;
    }
    match normalize_header(value).as_str() {
        "55" | "nf_e" => DocumentType::InvoiceElectronic,
        "65" | "nfc_e" => DocumentType::InvoiceConsumer,
        "57" | "ct_e" => DocumentType::TransportInvoice,
        "59" | "cf_e" => DocumentType::SatReceipt,
        "nfs_e" => DocumentType::ServiceInvoice,
        _ => DocumentType::Other,
    }
}

/// `;` when the header row has more semicolons than commas, else `,`.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn taxes() -> Vec<String> {
        ["icms", "ipi", "pis", "cofins", "iss"].iter().map(|s| s.to_string()).collect()
    }

    const ERP_EXPORT: &str = "\
Número NF;Série;Data Emissão;Emitente;CNPJ Emitente;Cliente;CPF Destinatário;Valor Produtos;Valor ICMS;Valor PIS;Valor Total;Chave;Modelo
123;1;15/01/2024;Comercial Exemplo Ltda;11.222.333/0001-81;Maria Silva;123.456.789-09;R$ 1.234,56;222,22;20,37;R$ 1.234,56;3524 0111 2223 3300 0181 5500 1000 0001 2310 0000 1238;55
124;1;16/01/2024;Comercial Exemplo Ltda;11.222.333/0001-81;Loja Dois;11.444.777/0001-61;100,00;18,00;;100,00;;65
";

    #[test]
    fn test_detect_erp_headers() {
        let headers = [
            "Número NF", "Série", "Data Emissão", "Emitente", "CNPJ Emitente", "Cliente",
            "CPF Destinatário", "Valor Produtos", "Valor ICMS", "Valor Total", "Chave", "Modelo",
        ];
        let mapping = ColumnMapping::detect(&headers, &taxes());
        assert_eq!(mapping.header(&TableField::Number), Some("Número NF"));
        assert_eq!(mapping.header(&TableField::Series), Some("Série"));
        assert_eq!(mapping.header(&TableField::IssueDate), Some("Data Emissão"));
        assert_eq!(mapping.header(&TableField::IssuerName), Some("Emitente"));
        assert_eq!(mapping.header(&TableField::IssuerId), Some("CNPJ Emitente"));
        assert_eq!(mapping.header(&TableField::RecipientName), Some("Cliente"));
        assert_eq!(mapping.header(&TableField::RecipientId), Some("CPF Destinatário"));
        assert_eq!(mapping.header(&TableField::ProductsTotal), Some("Valor Produtos"));
        assert_eq!(mapping.header(&TableField::GrandTotal), Some("Valor Total"));
        assert_eq!(mapping.header(&TableField::Tax("icms".to_string())), Some("Valor ICMS"));
        assert_eq!(mapping.header(&TableField::AccessKey), Some("Chave"));
        assert_eq!(mapping.header(&TableField::DocumentType), Some("Modelo"));
        assert_eq!(mapping.header(&TableField::Tax("ipi".to_string())), None);
        assert!(mapping.unmapped().is_empty());
    }

    #[test]
    fn test_substring_headers() {
        let headers = ["nome do fornecedor", "vl total nota", "observacoes", "icms"];
        let mapping = ColumnMapping::detect(&headers, &taxes());
        assert_eq!(mapping.header(&TableField::IssuerName), Some("nome do fornecedor"));
        assert_eq!(mapping.header(&TableField::GrandTotal), Some("vl total nota"));
        assert_eq!(mapping.header(&TableField::Tax("icms".to_string())), Some("icms"));
        assert_eq!(mapping.unmapped(), vec!["observacoes"]);
    }

    #[test]
    fn test_tax_columns_follow_registry_ids() {
        let headers = ["emitente", "vl_ibs", "valor_cbs"];
        let ids = vec!["ibs".to_string(), "cbs".to_string()];
        let mapping = ColumnMapping::detect(&headers, &ids);
        assert_eq!(mapping.header(&TableField::Tax("ibs".to_string())), Some("vl_ibs"));
        assert_eq!(mapping.header(&TableField::Tax("cbs".to_string())), Some("valor_cbs"));
    }

    #[test]
    fn test_import_semicolon_export() {
        let import = TableImporter::new(taxes()).read(ERP_EXPORT.as_bytes()).unwrap();
        assert!(import.skipped.is_empty());
        assert_eq!(import.rows.len(), 2);

        let first = &import.rows[0];
        assert_eq!(first.row, 1);
        assert_eq!(first.document_type, DocumentType::InvoiceElectronic);
        let record = &first.record;
        assert_eq!(record.source, InputFormat::Structured);
        assert_eq!(record.issuer.legal_name, "Comercial Exemplo Ltda");
        assert_eq!(record.issuer.tax_id.as_deref(), Some("11222333000181"));
        assert_eq!(record.recipient.personal_id.as_deref(), Some("12345678909"));
        assert_eq!(record.recipient.tax_id, None);
        assert_eq!(record.metadata.number, "123");
        assert_eq!(record.metadata.issue_date, "15/01/2024");
        assert_eq!(
            record.metadata.access_key.as_deref(),
            Some("35240111222333000181550010000001231000001238")
        );
        assert_eq!(record.totals.products_total, dec("1234.56"));
        assert_eq!(record.totals.grand_total, dec("1234.56"));
        assert_eq!(record.tax("icms"), dec("222.22"));
        assert_eq!(record.tax("pis"), dec("20.37"));
        assert_eq!(record.tax("iss"), Decimal::ZERO);
        assert_eq!(record.taxes.len(), 5);
        assert_eq!(record.totals.tax_total, dec("242.59"));

        let second = &import.rows[1];
        assert_eq!(second.document_type, DocumentType::InvoiceConsumer);
        assert_eq!(second.record.recipient.tax_id.as_deref(), Some("11444777000161"));
        assert_eq!(second.record.tax("pis"), Decimal::ZERO);
        assert_eq!(second.record.metadata.access_key, None);
        assert_eq!(
            checked_sum(import.rows.iter().map(|r| r.record.totals.grand_total)),
            Some(dec("1334.56"))
        );
    }

    #[test]
    fn test_import_comma_export_with_defaults() {
        let content = "emitente,total,tipo\n\"Acme, Ltda\",\"1.500,00\",\n,,\nBeta,abc,CT-e\n";
        let import = TableImporter::new(["icms"]).read(content.as_bytes()).unwrap();
        assert_eq!(import.rows.len(), 2);
        assert_eq!(import.rows[0].record.issuer.legal_name, "Acme, Ltda");
        assert_eq!(import.rows[0].record.totals.grand_total, dec("1500.00"));
        assert_eq!(import.rows[0].document_type, DocumentType::InvoiceElectronic);
        // Blank row 2 is dropped, row numbers stay those of the table
        assert_eq!(import.rows[1].row, 3);
        assert_eq!(import.rows[1].record.totals.grand_total, Decimal::ZERO);
        assert_eq!(import.rows[1].document_type, DocumentType::TransportInvoice);
    }

    #[test]
    fn test_latin1_export() {
        let mut content = b"Emitente;S".to_vec();
        content.push(0xE9); // é
        content.extend_from_slice(b"rie;Valor Total\nPadaria Jo");
        content.push(0xE3); // ã
        content.extend_from_slice(b"o;2;10,00\n");

        let import = TableImporter::new(["icms"]).read(&content).unwrap();
        assert_eq!(import.mapping.header(&TableField::Series), Some("Série"));
        assert_eq!(import.rows[0].record.issuer.legal_name, "Padaria João");
        assert_eq!(import.rows[0].record.metadata.series, "2");
    }

    #[test]
    fn test_unrecognized_header_is_an_error() {
        let err = TableImporter::new(["icms"])
            .read(b"foo,bar\n1,2\n")
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Table(ref m) if m.contains("foo, bar")));
    }

    #[test]
    fn test_overflowing_row_is_skipped() {
        let huge = "70000000000000000000000000000";
        let content = format!("emitente;icms;ipi\nA;{huge};{huge}\nB;1,00;2,00\n");
        let import = TableImporter::new(["icms", "ipi"]).read(content.as_bytes()).unwrap();
        assert_eq!(import.skipped, vec![(1, "tax amounts out of range".to_string())]);
        assert_eq!(import.rows.len(), 1);
        assert_eq!(import.rows[0].record.totals.tax_total, dec("3.00"));
    }

    #[test]
    fn test_manual_mapping_override() {
        let content = "fornecedor;razao;total\nA;Comercial B;5,00\n";
        let import = TableImporter::new(["icms"])
            .read_with_mapping(content.as_bytes(), |mapping| {
                assert!(mapping.set(TableField::IssuerName, "razao"));
                assert!(!mapping.set(TableField::Series, "missing"));
            })
            .unwrap();
        assert_eq!(import.rows[0].record.issuer.legal_name, "Comercial B");
        assert_eq!(import.mapping.unmapped(), vec!["fornecedor"]);
    }

    #[test]
    fn test_read_path_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notas.xlsx");
        std::fs::write(&path, b"PK").unwrap();
        let err = TableImporter::new(["icms"]).read_path(&path).unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedFormat(_)));

        let path = dir.path().join("notas.CSV");
        std::fs::write(&path, "emitente;total\nA;1,00\n").unwrap();
        let import = TableImporter::new(["icms"]).read_path(&path).unwrap();
        assert_eq!(import.rows.len(), 1);
    }
}
