//! Checksum rules for Brazilian fiscal identifiers.

pub mod access_key;
pub mod cnpj;
pub mod cpf;

pub use access_key::{normalize_access_key, validate_access_key, ACCESS_KEY_LEN};
pub use cnpj::{format_cnpj, validate_cnpj};
pub use cpf::{format_cpf, validate_cpf};
