//! Locale-aware price text normalization

use regex::Regex;
use std::sync::LazyLock;

/// One amount: either digit groups joined by separators, or a plain number
/// with an optional fraction
pub(crate) const AMOUNT_PATTERN: &str =
    r"\d{1,3}(?:[.,'\x{a0}\x{202f} ]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d+)?";

static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(AMOUNT_PATTERN).expect("amount pattern is valid"));

/// Parse the first amount found in `text`.
///
/// Handles both `1.234,56` and `1,234.56`: when both separators appear the
/// last one is the decimal mark; a lone comma followed by one or two digits
/// is decimal; a lone dot followed by exactly three digits is a thousands
/// separator. Currency symbols and words around the amount are ignored.
pub fn parse_price(text: &str) -> Option<f64> {
    let token = AMOUNT.find(text)?.as_str();
    parse_amount(token)
}

/// Every amount in `text`, in order of appearance
pub fn parse_all(text: &str) -> Vec<f64> {
    AMOUNT
        .find_iter(text)
        .filter_map(|m| parse_amount(m.as_str()))
        .collect()
}

pub(crate) fn parse_amount(token: &str) -> Option<f64> {
    let compact: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let normalized = normalize_separators(&compact)?;
    let value: f64 = normalized.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

fn normalize_separators(token: &str) -> Option<String> {
    let dots = token.matches('.').count();
    let commas = token.matches(',').count();

    let normalized = match (dots, commas) {
        (0, 0) => token.to_string(),
        (d, c) if d > 0 && c > 0 => {
            let last = token.rfind(['.', ','])?;
            let decimal = token[last..].chars().next()?;
            let thousands = if decimal == '.' { ',' } else { '.' };
            if token.matches(decimal).count() > 1 {
                return None;
            }
            token.replace(thousands, "").replace(decimal, ".")
        }
        (0, 1) => {
            let fraction = token.len() - token.find(',')? - 1;
            if (1..=2).contains(&fraction) {
                token.replace(',', ".")
            } else {
                token.replace(',', "")
            }
        }
        (1, 0) => {
            let fraction = token.len() - token.find('.')? - 1;
            if fraction == 3 {
                token.replace('.', "")
            } else {
                token.to_string()
            }
        }
        (_, 0) => token.replace('.', ""),
        (_, _) => token.replace(',', ""),
    };

    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn european_style_decimal_comma() {
        assert_eq!(parse_price("1.234,56"), Some(1234.56));
    }

    #[test]
    fn us_style_decimal_point() {
        assert_eq!(parse_price("1,234.56"), Some(1234.56));
    }

    #[test]
    fn lone_dot_before_three_digits_is_thousands() {
        assert_eq!(parse_price("35.000"), Some(35000.0));
        assert_eq!(parse_price("1.234.567"), Some(1_234_567.0));
    }

    #[test]
    fn lira_amounts_with_symbol() {
        assert_eq!(parse_price("₺35.000,50"), Some(35000.50));
        assert_eq!(parse_price("12.450 TL"), Some(12450.0));
    }

    #[test]
    fn dollar_amounts_with_cents() {
        assert_eq!(parse_price("$1,250.00"), Some(1250.0));
        assert_eq!(parse_price("USD 89.90"), Some(89.9));
    }

    #[test]
    fn space_grouped_thousands() {
        assert_eq!(parse_price("1 250 kr"), Some(1250.0));
        assert_eq!(parse_price("2\u{a0}499,00 €"), Some(2499.0));
    }

    #[test]
    fn lone_comma_before_three_digits_is_thousands() {
        assert_eq!(parse_price("4,500"), Some(4500.0));
        assert_eq!(parse_price("12,5"), Some(12.5));
    }

    #[test]
    fn text_without_digits_has_no_price() {
        assert_eq!(parse_price("Sold out"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn negative_signs_are_ignored() {
        assert_eq!(parse_price("-150"), Some(150.0));
    }

    #[test]
    fn finds_every_amount_in_order() {
        assert_eq!(parse_all("2 adults, 7 nights: 14.700 TL"), vec![2.0, 7.0, 14700.0]);
    }
}
