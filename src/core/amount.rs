//! Canonical coercion of ledger amounts.
//
// Stored documents are inconsistent about numeric fields: freshly written
// rows hold JSON numbers, rows that passed through spreadsheet pastes hold
// formatted strings ("1.200.000", "1,200,000.50", "(500)", "1 000 000 đ").
// Every amount is whole VND, so the canonical type is `i64` and fractional
// input rounds. This module is the single place where that coercion
// happens; the calculators and the merge resolver only ever see `i64`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parses a formatted amount string into whole VND.
///
/// Handles: empty/placeholder input (0), a leading minus or parenthesized
/// negatives, stray currency symbols, space/dot/comma thousands separators
/// in both the Vietnamese ("1.000.000,5") and English ("1,000,000.5")
/// conventions, and the ambiguous single-dot form ("520.000" is read as
/// 520000 when the integer part is short, "10108321.255" as a decimal).
pub fn parse_amount(raw: &str) -> i64 {
    let mut s: String = raw.replace('\u{a0}', " ").trim().to_string();
    if s.is_empty() || s.chars().all(|c| matches!(c, '-' | '.' | ',' | ' ')) {
        return 0;
    }

    let mut sign = 1.0f64;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest.trim().to_string();
    }
    if s.len() >= 2 && s.starts_with('(') && s.ends_with(')') {
        sign = -1.0;
        s = s[1..s.len() - 1].trim().to_string();
    }

    // Strip currency symbols and suffixes, keep digits and separators.
    s.retain(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | ' '));
    let mut s = s.trim().to_string();

    // Space as thousands separator: "1 000 000" -> "1000000".
    if digit_space_digit(&s) {
        s.retain(|c| c != ' ');
    }

    let dots = s.matches('.').count();
    let commas = s.matches(',').count();

    if dots > 0 && commas == 0 {
        if dots > 1 {
            // Multiple dots can only be thousands separators.
            s.retain(|c| c != '.');
        } else if let Some((int_part, frac_part)) = s.split_once('.') {
            // One dot is ambiguous: "520.000" is Vietnamese thousands,
            // "520.5" and "10108321.255" are decimals.
            if frac_part.len() == 3 && int_part.len() <= 3 {
                s.retain(|c| c != '.');
            }
        }
    } else if commas > 0 && dots == 0 {
        s.retain(|c| c != ',');
    } else if dots > 0 && commas > 0 {
        if s.rfind('.') > s.rfind(',') {
            // English grouping: 1,000,000.00
            s.retain(|c| c != ',');
        } else {
            // Vietnamese grouping: 1.000.000,00
            s.retain(|c| c != '.');
            s = s.replace(',', ".");
        }
    }

    match s.parse::<f64>() {
        Ok(n) if n.is_finite() => (sign * n).round() as i64,
        _ => 0,
    }
}

fn digit_space_digit(s: &str) -> bool {
    s.as_bytes()
        .windows(3)
        .any(|w| w[0].is_ascii_digit() && w[1] == b' ' && w[2].is_ascii_digit())
}

/// Coerces an arbitrary JSON value to whole VND. Numbers round, strings go
/// through [`parse_amount`], anything else is 0.
pub fn amount_from_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f.round() as i64).unwrap_or(0),
        Value::String(s) => parse_amount(s),
        _ => 0,
    }
}

/// Legacy documents store booleans as `true` or `"true"`.
pub fn flag_from_value(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
    }
}

/// Serde adapter for amount fields.
pub fn de_amount<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(amount_from_value(&value))
}

/// Serde adapter for nullable amount fields; `null` stays `None`.
pub fn de_opt_amount<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        other => Some(amount_from_value(&other)),
    })
}

/// Serde adapter for flag fields.
pub fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(flag_from_value(&value))
}
