//! Extraction prompt built from the enabled tax definitions.

use crate::models::tax::TaxDefinition;
use crate::oracle::char_prefix;

/// Build the extraction prompt.
///
/// The `taxes` block of the template lists exactly the given definitions, so
/// adding a tax to the registry changes what the oracle is asked for.
pub fn extraction_prompt(text: &str, taxes: &[TaxDefinition], text_limit: usize) -> String {
    let tax_lines = taxes
        .iter()
        .map(|t| format!("    \"{}\": number  // {}", t.id, t.display_name()))
        .collect::<Vec<_>>()
        .join(",\n");

    let code_lines = taxes
        .iter()
        .map(|t| format!("        \"{}\": \"CST or CSOSN of {}\"", t.id, t.name))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"Extract the following fields from this Brazilian fiscal document and return them as JSON:

{{
  "issuer": {{
    "tax_id": "issuer CNPJ",
    "legal_name": "razão social",
    "trade_name": "nome fantasia, if any",
    "address": "full address",
    "state_registration": "inscrição estadual"
  }},
  "recipient": {{
    "tax_id": "recipient CNPJ",
    "personal_id": "CPF, if the recipient is a person",
    "name": "name or razão social",
    "address": "address"
  }},
  "items": [
    {{
      "code": "product code",
      "description": "product or service description",
      "unit": "unit",
      "quantity": number,
      "unit_price": number,
      "line_total": number,
      "cfop": "item CFOP",
      "tax_codes": {{
{code_lines}
      }}
    }}
  ],
  "totals": {{
    "products_total": number,
    "freight": number,
    "insurance": number,
    "discount": number,
    "grand_total": number
  }},
  "taxes": {{
{tax_lines}
  }},
  "metadata": {{
    "number": "document number",
    "series": "series",
    "issue_date": "issue date",
    "access_key": "44-digit access key"
  }}
}}

OCR text:
{text}

Return ONLY valid JSON, with no additional text."#,
        code_lines = code_lines,
        tax_lines = tax_lines,
        text = char_prefix(text, text_limit),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tax::{default_taxes, TaxScope};

    #[test]
    fn test_prompt_lists_enabled_taxes() {
        let mut taxes = default_taxes();
        taxes.retain(|t| t.id != "ipi");
        taxes.push(TaxDefinition::new("ibs", "IBS", TaxScope::State, &["vIBS"]));

        let prompt = extraction_prompt("DANFE", &taxes, 2000);
        assert!(prompt.contains(r#""icms": number  // Imposto sobre Circulação de Mercadorias e Serviços"#));
        assert!(prompt.contains(r#""ibs": number  // IBS"#));
        assert!(!prompt.contains(r#""ipi": number"#));
        assert!(prompt.contains("DANFE"));
    }

    #[test]
    fn test_prompt_truncates_text() {
        let text = "x".repeat(2500);
        let prompt = extraction_prompt(&text, &default_taxes(), 2000);
        assert!(prompt.contains(&"x".repeat(2000)));
        assert!(!prompt.contains(&"x".repeat(2001)));
    }
}
