//! End-to-end pipeline runs against a temporary tax configuration.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use fiscal_core::error::OracleError;
use fiscal_core::{
    analyze, analyze_document, BackendOutput, BatchQueue, BatchRunner, Classifier, DocumentKind,
    DocumentSummary, DocumentType, Extractor, Normalizer, Oracle, OracleRequest, Pipeline,
    PipelineStatus, TaxDefinition, TaxRegistry, TaxScope, TextBackend,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use tempfile::TempDir;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

struct Scripted {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl Oracle for Scripted {
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.replies.lock().unwrap().pop_front().ok_or(OracleError::EmptyReply)
    }
}

struct ScanText;

impl TextBackend for ScanText {
    fn extract(&self, _path: &Path) -> BackendOutput {
        BackendOutput::ok("NOTA FISCAL DE SERVIÇO ELETRÔNICA", Some(vec![1, 2, 3]))
    }
}

const ZERO_TAX_NFE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc versao="4.00">
  <NFe>
    <infNFe Id="NFe35240111222333000181550010000001231000001238" versao="4.00">
      <ide><nNF>123</nNF><serie>1</serie><dhEmi>2024-01-15T10:30:00-03:00</dhEmi></ide>
      <emit><CNPJ>11222333000181</CNPJ><xNome>Comercial Exemplo Ltda</xNome></emit>
      <dest><CPF>12345678909</CPF><xNome>Maria Silva</xNome></dest>
      <det nItem="1">
        <prod><cProd>A1</cProd><xProd>Caneta</xProd><uCom>UN</uCom>
          <qCom>10</qCom><vUnCom>2.50</vUnCom><vProd>25.00</vProd></prod>
      </det>
      <det nItem="2">
        <prod><cProd>B2</cProd><xProd>Caderno</xProd><uCom>UN</uCom>
          <qCom>2</qCom><vUnCom>12.50</vUnCom><vProd>25.00</vProd></prod>
      </det>
      <total>
        <ICMSTot><vProd>50.00</vProd><vICMS>0.00</vICMS><vST>0.00</vST><vIPI>0.00</vIPI>
          <vPIS>0.00</vPIS><vCOFINS>0.00</vCOFINS><vIBS>2.00</vIBS><vNF>50.00</vNF></ICMSTot>
        <ISSQNtot><vISS>0.00</vISS></ISSQNtot>
      </total>
    </infNFe>
  </NFe>
</nfeProc>"#;

fn pipeline(dir: &TempDir, oracle: Option<Arc<Scripted>>) -> Pipeline {
    let registry = TaxRegistry::init_default(dir.path().join("config/tax_config.json"))
        .unwrap()
        .with_author("tests");
    let oracle = oracle.map(|o| o as Arc<dyn Oracle>);
    Pipeline::new(
        Arc::new(registry),
        Normalizer::new(ScanText),
        Classifier::new(oracle.clone()),
        Extractor::new(oracle),
    )
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn zero_tax_invoice_is_valid_with_zero_burden() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&dir, None);
    let path = write(&dir, "nfe.xml", ZERO_TAX_NFE);

    let state = pipeline.run(&path);
    assert_eq!(state.status, PipelineStatus::Validated);

    let doc = state.outcome().unwrap();
    assert_eq!(
        doc.classification.document_type,
        DocumentKind::Known(DocumentType::InvoiceElectronic)
    );
    let keys: Vec<&str> = doc.record.taxes.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["cofins", "icms", "ipi", "iss", "pis"]);
    assert!(doc.record.taxes.values().all(|v| v.is_zero()));

    assert!(doc.validation.is_valid);
    assert!(doc.validation.errors.is_empty());
    assert!(doc.validation.warnings.is_empty());

    let analysis = analyze_document(&doc.record, &doc.validation);
    assert_eq!(analysis.taxes.burden_percent, Decimal::ZERO);
    assert_eq!(analysis.recommendations, vec!["Document within normal parameters"]);
}

#[test]
fn huge_line_amounts_become_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&dir, None);
    let huge = ZERO_TAX_NFE.replacen(
        "<qCom>10</qCom><vUnCom>2.50</vUnCom>",
        "<qCom>100000000000000000000</qCom><vUnCom>100000000000000000000</vUnCom>",
        1,
    );
    let path = write(&dir, "huge.xml", &huge);

    let state = pipeline.run(&path);
    assert_eq!(state.status, PipelineStatus::Validated);

    let doc = state.outcome().unwrap();
    assert_eq!(doc.record.line_items[0].quantity, dec("100000000000000000000"));
    assert!(doc.validation.is_valid);
    assert!(doc.validation.errors.is_empty());
    assert!(doc
        .validation
        .warnings
        .iter()
        .any(|w| w.starts_with("Item 1: calculation out of range")));
}

#[test]
fn new_tax_definition_changes_extraction_without_code() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&dir, None);
    let path = write(&dir, "nfe.xml", ZERO_TAX_NFE);

    let before = pipeline.run(&path).record.unwrap();
    assert!(!before.taxes.contains_key("ibs"));

    let ibs = TaxDefinition::new("ibs", "IBS", TaxScope::State, &["vIBS"])
        .with_full_name("Imposto sobre Bens e Serviços");
    assert!(pipeline.registry().add(ibs).unwrap());

    let after = pipeline.run(&path).record.unwrap();
    assert_eq!(after.tax("ibs"), dec("2.00"));
    assert_eq!(after.totals.tax_total, dec("2.00"));
    assert_eq!(pipeline.registry().history().unwrap().len(), 1);
}

#[test]
fn visual_prompt_follows_registry() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = Arc::new(Scripted::new(&[
        "NFSe",
        r#"{"issuer": {"tax_id": "34567890000130", "legal_name": "Serviços ABC"},
            "taxes": {"iss": "R$ 5,00"}, "totals": {"products_total": 100, "grand_total": 100}}"#,
    ]));
    let pipeline = pipeline(&dir, Some(oracle.clone()));
    pipeline.registry().toggle("ipi").unwrap();

    let state = pipeline.run(write(&dir, "servico.jpg", ""));
    assert_eq!(state.status, PipelineStatus::Validated);
    assert_eq!(
        state.classification.unwrap().document_type,
        DocumentKind::Known(DocumentType::ServiceInvoice)
    );

    let record = state.record.unwrap();
    assert_eq!(record.tax("iss"), dec("5.00"));
    assert!(!record.taxes.contains_key("ipi"));

    let prompts = oracle.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains(r#""iss": number"#));
    assert!(!prompts[1].contains(r#""ipi": number"#));
}

#[test]
fn batch_then_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&dir, None);
    let good = write(&dir, "a.xml", ZERO_TAX_NFE);
    let also_good = write(&dir, "b.xml", ZERO_TAX_NFE);
    let broken = write(&dir, "c.xml", "<nfeProc><NFe>");

    let mut queue = BatchQueue::from_paths([good, also_good, broken]);
    let stats = BatchRunner::new(2)
        .with_auto_retry(true)
        .with_max_attempts(2)
        .run_pipeline(&pipeline, &mut queue);

    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);
    let failed = queue.get(2).unwrap();
    assert_eq!(failed.attempts, 2);
    assert!(failed.error.as_deref().unwrap().starts_with("Normalization failed"));

    let summaries: Vec<DocumentSummary> = queue.documents().map(DocumentSummary::from).collect();
    let report = analyze(&summaries);
    assert_eq!(report.overview.total_documents, 2);
    assert_eq!(report.overview.total_value, dec("100.00"));
    assert_eq!(report.by_type.get("NFe"), Some(&2));
    assert_eq!(report.top_issuers[0].name, "Comercial Exemplo Ltda");
    assert_eq!(report.insights[0], "No issues found");
}
