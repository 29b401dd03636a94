//! Brazilian currency amounts ("R$ 1.234,56").

use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a Brazilian-formatted amount (e.g. "R$ 1.234,56", "1234,56" or "1234.56").
///
/// A single dot followed by exactly three digits is a thousands separator
/// ("1.234" is 1234) unless the integer part starts with zero ("0.125").
pub fn parse_brl_amount(s: &str) -> Option<Decimal> {
    let negative = s.trim_start().starts_with('-');
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Both present: the last one is the decimal separator
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        // Several dots and no comma can only be thousand separators
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        (None, Some(d)) if is_thousands_group(&cleaned[..d], &cleaned[d + 1..]) => {
            cleaned.replace('.', "")
        }
        _ => cleaned,
    };

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

fn is_thousands_group(integer: &str, rest: &str) -> bool {
    (1..=3).contains(&integer.len()) && !integer.starts_with('0') && rest.len() == 3
}

/// Format an amount in Brazilian style (R$ 1.234,56).
pub fn format_brl_amount(amount: Decimal) -> String {
    let s = format!("{:.2}", amount.abs());
    let Some((integer_part, decimal_part)) = s.split_once('.') else {
        return s;
    };

    let chars: Vec<char> = integer_part.chars().collect();
    let mut formatted = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            formatted.push('.');
        }
        formatted.push(*c);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    format!("{}R$ {},{}", sign, formatted, decimal_part)
}
