//! Numeric parsing for scraped values.
//!
//! Sources emit a mix of JSON numbers and display strings in Brazilian or
//! English formatting ("1.234,56", "12.5%", "R$ 3,45"). Percent values keep
//! their magnitude: "5,46%" parses to 5.46.

use serde_json::Value;

/// Placeholder strings sites use for missing data.
const EMPTY_MARKERS: &[&str] = &["-", "--", "n/a", "na", "nd", "null"];

/// Extracts a finite f64 from a raw payload value, or `None`.
pub fn parse_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_numeric_str(s),
        _ => None,
    }
}

/// Parses display strings in pt-BR or English number formatting.
pub fn parse_numeric_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || EMPTY_MARKERS.iter().any(|m| trimmed.eq_ignore_ascii_case(m)) {
        return None;
    }

    let mut s = trimmed.to_string();
    for token in ["R$", "US$", "$", "%"] {
        s = s.replace(token, "");
    }
    s.retain(|c| !c.is_whitespace());

    let has_comma = s.contains(',');
    let has_dot = s.contains('.');
    let normalized = if has_comma && has_dot {
        // Whichever separator comes last is the decimal one.
        if s.rfind(',') > s.rfind('.') {
            s.replace('.', "").replace(',', ".")
        } else {
            s.replace(',', "")
        }
    } else if has_comma {
        if s.matches(',').count() > 1 {
            s.replace(',', "")
        } else {
            // Lone comma reads as a pt-BR decimal separator.
            s.replace(',', ".")
        }
    } else if s.matches('.').count() > 1 {
        s.replace('.', "")
    } else {
        s
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}
