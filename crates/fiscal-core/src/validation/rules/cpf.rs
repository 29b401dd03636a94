//! CPF (Brazilian personal registry number) validation.

/// Validate a CPF using its two modulo-11 check digits.
///
/// CPF format: 11 digits. Weights run 10..2 for the first check digit
/// and 11..2 for the second.
pub fn validate_cpf(cpf: &str) -> bool {
    let digits: Vec<u32> = cpf
        .chars()
        .filter(|c| c.is_ascii_digit())
        .filter_map(|c| c.to_digit(10))
        .collect();

    if digits.len() != 11 {
        return false;
    }

    if digits.iter().all(|&d| d == digits[0]) {
        return false;
    }

    check_digit(&digits[..9]) == digits[9] && check_digit(&digits[..10]) == digits[10]
}

/// Check digit over `digits` with descending weights starting at `len + 1`.
fn check_digit(digits: &[u32]) -> u32 {
    let top = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (top - i as u32))
        .sum();
    match (sum * 10) % 11 {
        10 => 0,
        r => r,
    }
}

/// Format CPF as XXX.XXX.XXX-XX.
pub fn format_cpf(cpf: &str) -> String {
    let digits: String = cpf.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() != 11 {
        return cpf.to_string();
    }

    format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_cpf_valid() {
        assert!(validate_cpf("12345678909"));
        assert!(validate_cpf("529.982.247-25"));
    }

    #[test]
    fn test_validate_cpf_invalid() {
        assert!(!validate_cpf("12345678900")); // Wrong check digits
        assert!(!validate_cpf("1234567890")); // Too short
        assert!(!validate_cpf("11111111111")); // Repeated digits
        assert!(!validate_cpf("11222333000181")); // A CNPJ
    }

    #[test]
    fn test_format_cpf() {
        assert_eq!(format_cpf("52998224725"), "529.982.247-25");
    }
}
