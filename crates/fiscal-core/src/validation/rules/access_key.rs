//! Access key (chave de acesso) validation.
//!
//! The key is 44 digits: UF, year/month, issuer CNPJ, model, series, number,
//! emission type, random code and a final modulo-11 check digit.

/// Length of a complete access key.
pub const ACCESS_KEY_LEN: usize = 44;

/// Validate a 44-digit access key, printed groups and punctuation allowed.
///
/// Weights 2..9 are applied cyclically to the first 43 digits read right to
/// left. A remainder of 0 or 1 yields check digit 0, otherwise `11 - remainder`.
pub fn validate_access_key(key: &str) -> bool {
    let digits: Vec<u32> = key.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != ACCESS_KEY_LEN {
        return false;
    }

    access_key_check_digit(&digits[..ACCESS_KEY_LEN - 1]) == digits[ACCESS_KEY_LEN - 1]
}

/// Check digit for the first 43 digits of a key.
pub fn access_key_check_digit(digits: &[u32]) -> u32 {
    let sum: u32 = digits
        .iter()
        .rev()
        .zip((2..=9).cycle())
        .map(|(d, w)| d * w)
        .sum();
    match sum % 11 {
        0 | 1 => 0,
        r => 11 - r,
    }
}

/// Strip everything but digits (keys are often printed in groups of four).
pub fn normalize_access_key(key: &str) -> String {
    key.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "35200902345670000165500100000001231234567896";
    const OTHER_KEY: &str = "35240111222333000181550010000001231000001238";

    #[test]
    fn test_valid_keys() {
        assert!(validate_access_key(KEY));
        assert!(validate_access_key(OTHER_KEY));
    }

    #[test]
    fn test_truncated_key() {
        assert!(!validate_access_key(&KEY[..43]));
    }

    #[test]
    fn test_corrupted_check_digit() {
        let corrupted = format!("{}9", &OTHER_KEY[..43]);
        assert!(!validate_access_key(&corrupted));
        let corrupted = format!("{}0", &KEY[..43]);
        assert!(!validate_access_key(&corrupted));
    }

    #[test]
    fn test_single_digit_changes_are_detected() {
        for i in 0..OTHER_KEY.len() {
            for d in '0'..='9' {
                if OTHER_KEY.as_bytes()[i] as char == d {
                    continue;
                }
                let mut mutated = OTHER_KEY.to_string();
                mutated.replace_range(i..i + 1, &d.to_string());
                assert!(!validate_access_key(&mutated), "{} should be invalid", mutated);
            }
        }
    }

    #[test]
    fn test_formatted_keys() {
        let grouped = "3524 0111 2223 3300 0181 5500 1000 0001 2310 0000 1238";
        assert!(validate_access_key(grouped));
        assert_eq!(normalize_access_key(grouped), OTHER_KEY);

        let spaced = format!("{} {}", &KEY[..22], &KEY[22..]);
        assert!(validate_access_key(&spaced));
        assert!(validate_access_key(&format!("NFe{}", KEY)));

        let grouped_bad = "3524 0111 2223 3300 0181 5500 1000 0001 2310 0000 1239";
        assert!(!validate_access_key(grouped_bad));
        assert!(!validate_access_key(&format!("{} 1", KEY)));
    }

    #[test]
    fn test_check_digit_computation() {
        let digits: Vec<u32> = KEY[..43].chars().filter_map(|c| c.to_digit(10)).collect();
        assert_eq!(access_key_check_digit(&digits), 6);
    }
}
