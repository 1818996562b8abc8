//! Parsing of numeric text as it appears in reports and data pages.

use crate::statement::Scale;

/// Placeholders that mean "not reported".
const PLACEHOLDERS: &[&str] = &["", "-", "--", "—", "–", "n/a", "na", "nm", "null", "none", "upgrade"];

/// Currency codes that may trail a figure without changing its scale.
const CURRENCIES: &[&str] = &["sek", "usd", "eur", "nok", "dkk", "gbp", "chf", "kr"];

/// Parse a reported amount.
///
/// Handles thousands separators in either convention, parentheses and
/// unicode minus for negatives, trailing `%` (divided by 100) and scale or
/// currency suffixes such as `"MSEK"`, `"mkr"` or `"bn"`. Returns the value and
/// the scale named by the suffix, if any. Placeholders and unrecognized
/// suffixes yield `None`.
pub fn parse_amount(text: &str) -> Option<(f64, Option<Scale>)> {
    let mut s = text.trim().replace(['\u{a0}', '\u{202f}'], " ");
    if PLACEHOLDERS.contains(&s.to_lowercase().as_str()) {
        return None;
    }

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = s[1..s.len() - 1].trim().to_string();
    }
    if let Some(rest) = s.strip_prefix(['-', '\u{2212}', '\u{2013}']) {
        negative = !negative;
        s = rest.trim().to_string();
    }

    let mut percent = false;
    if let Some(rest) = s.strip_suffix('%') {
        percent = true;
        s = rest.trim().to_string();
    }

    let number_end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, '.' | ',' | ' ' | '\'')))
        .map_or(s.len(), |(i, _)| i);
    let (number, suffix) = s.split_at(number_end);
    let suffix = suffix.trim();

    let scale = if suffix.is_empty() {
        None
    } else if let Some(scale) = Scale::from_label(suffix) {
        Some(scale)
    } else if CURRENCIES.contains(&suffix.to_lowercase().as_str()) {
        None
    } else {
        return None;
    };

    let mut value = parse_number(number.trim())?;
    if negative {
        value = -value;
    }
    if percent {
        value /= 100.0;
    }
    Some((value, scale))
}

/// Parse digits with thousands and decimal separators in either convention.
fn parse_number(s: &str) -> Option<f64> {
    let s: String = s.chars().filter(|c| !matches!(c, ' ' | '\'')).collect();
    if s.is_empty() || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let commas = s.matches(',').count();
    let dots = s.matches('.').count();
    let cleaned = match (commas, dots) {
        (0, 0) | (0, 1) => s,
        (0, _) => s.replace('.', ""),
        (_, 0) => {
            // A single comma followed by exactly three digits is a thousands
            // separator, unless the leading group is a zero.
            let after = s.rsplit(',').next().map_or(0, str::len);
            let leading_zero = s.split(',').next().is_some_and(|g| g.starts_with('0'));
            if commas == 1 && (after != 3 || leading_zero) {
                s.replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        _ => {
            let last_comma = s.rfind(',')?;
            let last_dot = s.rfind('.')?;
            if last_comma > last_dot {
                s.replace('.', "").replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
    };
    cleaned.parse().ok()
}
