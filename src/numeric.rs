// src/numeric.rs

use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

/// Whether a field is allowed to carry a negative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// Weights and payments: every `-` is discarded before parsing.
    Unsigned,
    /// Deduction-style fields: a leading `-` is kept.
    Signed,
}

/// Longest leading decimal literal of an already-cleaned string.
static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-?)(\d*)(?:\.(\d*))?").unwrap());

/// Best-effort numeric value of a loosely formatted ledger field
/// ("€54.60", "36kg", "3.97%").
///
/// Anything that is not a digit, a `.` or (for [`Sign::Signed`]) a `-` is
/// thrown away, then the leading decimal literal of what remains is taken.
/// Garbage never errors: it comes back as zero.
pub fn parse_numeric(value: &str, sign: Sign) -> Decimal {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || (*c == '-' && sign == Sign::Signed))
        .collect();

    let Some(caps) = LEADING_NUMBER.captures(&cleaned) else {
        return Decimal::ZERO;
    };

    let negative = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
    let int_part = caps.get(2).map_or("", |m| m.as_str());
    let frac_part = caps.get(3).map_or("", |m| m.as_str());

    if int_part.is_empty() && frac_part.is_empty() {
        return Decimal::ZERO;
    }

    let literal = format!(
        "{}{}.{}",
        if negative { "-" } else { "" },
        if int_part.is_empty() { "0" } else { int_part },
        if frac_part.is_empty() { "0" } else { frac_part },
    );

    // Out-of-range literals degrade like any other garbage.
    Decimal::from_str(&literal).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_plain_decimals_are_exact() {
        let cases = [
            ("0", "0"),
            ("7", "7"),
            ("12.5", "12.5"),
            ("0.01", "0.01"),
            ("1234.5678", "1234.5678"),
            ("36.", "36"),
            (".75", "0.75"),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_numeric(input, Sign::Unsigned), dec(expected), "input {input:?}");
        }
    }

    #[test]
    fn test_garbage_is_zero() {
        assert_eq!(parse_numeric("", Sign::Unsigned), Decimal::ZERO);
        assert_eq!(parse_numeric("abc", Sign::Unsigned), Decimal::ZERO);
        assert_eq!(parse_numeric("   ", Sign::Signed), Decimal::ZERO);
        assert_eq!(parse_numeric(".", Sign::Unsigned), Decimal::ZERO);
        assert_eq!(parse_numeric("--5", Sign::Signed), Decimal::ZERO);
        assert_eq!(parse_numeric("kg", Sign::Signed), Decimal::ZERO);
    }

    #[test]
    fn test_units_and_currency_are_discarded() {
        assert_eq!(parse_numeric("€54.60", Sign::Unsigned), dec("54.60"));
        assert_eq!(parse_numeric("36kg", Sign::Unsigned), dec("36"));
        assert_eq!(parse_numeric("3.97%", Sign::Unsigned), dec("3.97"));
        assert_eq!(parse_numeric("12.5 kg", Sign::Unsigned), dec("12.5"));
        assert_eq!(parse_numeric("€1,119.80", Sign::Unsigned), dec("1119.80"));
    }

    #[test]
    fn test_multiple_decimal_points_take_leading_literal() {
        assert_eq!(parse_numeric("1.2.3", Sign::Unsigned), dec("1.2"));
        assert_eq!(parse_numeric("v2.0.1", Sign::Unsigned), dec("2.0"));
    }

    #[test]
    fn test_minus_only_kept_when_signed() {
        assert_eq!(parse_numeric("-€18.20", Sign::Signed), dec("-18.20"));
        assert_eq!(parse_numeric("€-18.20", Sign::Signed), dec("-18.20"));
        assert_eq!(parse_numeric("-€18.20", Sign::Unsigned), dec("18.20"));
        assert_eq!(parse_numeric("5-3", Sign::Signed), dec("5"));
    }

    #[test]
    fn test_overflow_degrades_to_zero() {
        let huge = "9".repeat(60);
        assert_eq!(parse_numeric(&huge, Sign::Unsigned), Decimal::ZERO);
    }
}
