//! FILENAME: core/engine/src/format.rs
//! PURPOSE: Cell value formatting for report output.
//! CONTEXT: The transformers never format values themselves; they call a
//! `Formatter` supplied by the caller. `DefaultFormatter` is the built-in
//! implementation. Formatting never fails from the caller's point of view:
//! internal errors degrade to a best-effort string.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::log_debug;
use crate::value::Value;

// ============================================================================
// VALUE KINDS
// ============================================================================

/// How a column's values are interpreted and displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    String,
    Number,
    Currency,
    Date,
    Datetime,
    Percentage,
    Boolean,
}

impl ValueKind {
    /// Kinds that receive per-column totals.
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Number | ValueKind::Currency)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, ValueKind::Date | ValueKind::Datetime)
    }
}

// ============================================================================
// FORMATTER CONTRACT
// ============================================================================

/// Formatting service consumed by the table and pivot transformers.
pub trait Formatter {
    /// Formats a raw value. Must not fail: on internal errors it returns a
    /// best-effort string representation.
    fn format(&self, value: &Value, kind: ValueKind, locale: &str, hint: Option<&str>) -> String;
}

#[derive(Error, Debug, PartialEq)]
enum FormatError {
    #[error("value of type {0} is not numeric")]
    NotNumeric(&'static str),
    #[error("value of type {0} is not a date")]
    NotTemporal(&'static str),
    #[error("unsupported format pattern '{0}'")]
    InvalidPattern(String),
}

/// Locale-aware default formatter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl DefaultFormatter {
    pub fn new() -> Self {
        DefaultFormatter
    }

    fn try_format(
        &self,
        value: &Value,
        kind: ValueKind,
        locale: &str,
        hint: Option<&str>,
    ) -> Result<String, FormatError> {
        let symbols = NumberSymbols::for_locale(locale);
        match kind {
            ValueKind::String => Ok(value.display_string()),
            ValueKind::Number => {
                let n = numeric(value)?;
                let pattern = match hint {
                    Some(h) => parse_number_pattern(h)?,
                    None => NumberPattern::DEFAULT,
                };
                Ok(format_with_pattern(n, &pattern, &symbols))
            }
            ValueKind::Currency => {
                let n = numeric(value)?;
                Ok(format_currency(n, hint.unwrap_or("USD"), &symbols))
            }
            ValueKind::Percentage => {
                let n = numeric(value)?;
                let pattern = match hint {
                    Some(h) => parse_number_pattern(h.trim_end_matches('%'))?,
                    None => NumberPattern::fixed(0, false),
                };
                Ok(format_percentage(n, &pattern, &symbols))
            }
            ValueKind::Date | ValueKind::Datetime => format_temporal(value, kind, hint),
            ValueKind::Boolean => Ok(format_boolean(value, hint)),
        }
    }
}

impl Formatter for DefaultFormatter {
    fn format(&self, value: &Value, kind: ValueKind, locale: &str, hint: Option<&str>) -> String {
        if value.is_null() {
            return String::new();
        }
        match self.try_format(value, kind, locale, hint) {
            Ok(formatted) => formatted,
            Err(e) => {
                log_debug!("FORMAT", "falling back for {:?} value: {}", kind, e);
                best_effort(value, kind, hint)
            }
        }
    }
}

/// Fallback representation used when formatting fails.
fn best_effort(value: &Value, kind: ValueKind, hint: Option<&str>) -> String {
    let plain = value.display_string();
    match kind {
        ValueKind::Currency => format!("{} {}", plain, hint.unwrap_or("USD")),
        ValueKind::Percentage => format!("{}%", plain),
        _ => plain,
    }
}

fn numeric(value: &Value) -> Result<f64, FormatError> {
    value.to_number().ok_or(FormatError::NotNumeric(value.kind_name()))
}

// ============================================================================
// NUMBERS
// ============================================================================

/// Digit grouping and decimal separators for a locale.
#[derive(Debug, Clone, Copy, PartialEq)]
struct NumberSymbols {
    group: &'static str,
    decimal: char,
}

impl NumberSymbols {
    fn for_locale(locale: &str) -> Self {
        let language = locale
            .split(|c| c == '_' || c == '-')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match language.as_str() {
            "de" | "es" | "it" | "nl" | "pt" | "da" | "id" | "tr" => NumberSymbols { group: ".", decimal: ',' },
            "fr" | "pl" | "cs" | "sk" | "ru" | "uk" | "sv" | "nb" | "fi" | "hu" => {
                NumberSymbols { group: "\u{a0}", decimal: ',' }
            }
            _ => NumberSymbols { group: ",", decimal: '.' },
        }
    }
}

/// A parsed `#,##0.00`-style number pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
struct NumberPattern {
    min_decimals: usize,
    max_decimals: usize,
    grouping: bool,
}

impl NumberPattern {
    /// Grouped, up to three decimals.
    const DEFAULT: NumberPattern = NumberPattern { min_decimals: 0, max_decimals: 3, grouping: true };

    fn fixed(decimals: usize, grouping: bool) -> Self {
        NumberPattern { min_decimals: decimals, max_decimals: decimals, grouping }
    }
}

/// Parses a number pattern. '0' after the decimal point is a required digit,
/// '#' an optional one; a ',' anywhere enables digit grouping.
fn parse_number_pattern(pattern: &str) -> Result<NumberPattern, FormatError> {
    let pattern = pattern.trim();
    if pattern.is_empty() || !pattern.chars().all(|c| matches!(c, '#' | '0' | ',' | '.')) {
        return Err(FormatError::InvalidPattern(pattern.to_string()));
    }

    let (integer_part, fraction_part) = match pattern.split_once('.') {
        Some((i, f)) => (i, f),
        None => (pattern, ""),
    };
    if fraction_part.contains('.') || fraction_part.contains(',') {
        return Err(FormatError::InvalidPattern(pattern.to_string()));
    }

    let min_decimals = fraction_part.chars().take_while(|c| *c == '0').count();
    Ok(NumberPattern {
        min_decimals,
        max_decimals: fraction_part.len(),
        grouping: integer_part.contains(','),
    })
}

fn format_with_pattern(value: f64, pattern: &NumberPattern, symbols: &NumberSymbols) -> String {
    let rounded = format!("{:.prec$}", value.abs(), prec = pattern.max_decimals);
    let (integer_digits, fraction) = match rounded.split_once('.') {
        Some((i, f)) => (i.to_string(), f.to_string()),
        None => (rounded.clone(), String::new()),
    };

    // Drop optional trailing zeros beyond the required decimals
    let mut fraction = fraction;
    while fraction.len() > pattern.min_decimals && fraction.ends_with('0') {
        fraction.pop();
    }

    let integer = if pattern.grouping {
        add_thousands_separator(&integer_digits, symbols.group)
    } else {
        integer_digits
    };

    let mut result = String::new();
    let is_zero = integer.chars().all(|c| c == '0' || !c.is_ascii_digit()) && fraction.chars().all(|c| c == '0');
    if value < 0.0 && !is_zero {
        result.push('-');
    }
    result.push_str(&integer);
    if !fraction.is_empty() {
        result.push(symbols.decimal);
        result.push_str(&fraction);
    }
    result
}

/// Add thousands separators to a string of integer digits.
fn add_thousands_separator(digits: &str, separator: &str) -> String {
    let len = digits.len();
    let mut result = String::with_capacity(len + len / 3 * separator.len());

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push_str(separator);
        }
        result.push(c);
    }

    result
}

/// Currency symbol, placement and minor-unit digits for an ISO 4217 code.
fn currency_layout(code: &str) -> (String, bool, usize) {
    match code.to_ascii_uppercase().as_str() {
        "USD" => ("$".to_string(), true, 2),
        "EUR" => ("€".to_string(), true, 2),
        "GBP" => ("£".to_string(), true, 2),
        "JPY" => ("¥".to_string(), true, 0),
        "PLN" => ("\u{a0}zł".to_string(), false, 2),
        "SEK" => ("\u{a0}kr".to_string(), false, 2),
        other => (format!("{}\u{a0}", other), true, 2),
    }
}

/// Format a number as currency. Negative amounts are shown in parentheses.
fn format_currency(value: f64, code: &str, symbols: &NumberSymbols) -> String {
    let (symbol, before, decimals) = currency_layout(code);
    let formatted = format_with_pattern(value.abs(), &NumberPattern::fixed(decimals, true), symbols);

    let with_symbol = if before {
        format!("{}{}", symbol, formatted)
    } else {
        format!("{}{}", formatted, symbol)
    };

    if value < 0.0 {
        format!("({})", with_symbol)
    } else {
        with_symbol
    }
}

/// Format a number as percentage. Ratios (|v| <= 1) are scaled by 100;
/// larger values are taken to be percentages already.
fn format_percentage(value: f64, pattern: &NumberPattern, symbols: &NumberSymbols) -> String {
    let percentage = if value.abs() <= 1.0 { value * 100.0 } else { value };
    format!("{}%", format_with_pattern(percentage, pattern, symbols))
}

// ============================================================================
// DATES
// ============================================================================

const DEFAULT_DATE_PATTERN: &str = "%b %-d, %Y";
const DEFAULT_DATETIME_PATTERN: &str = "%b %-d, %Y, %-I:%M:%S %p";

/// Parses ISO-8601 text: RFC 3339 (with offset or trailing `Z`), a naive
/// date-time, or a plain date at midnight. Result is in UTC.
pub fn parse_iso_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn format_temporal(value: &Value, kind: ValueKind, hint: Option<&str>) -> Result<String, FormatError> {
    let dt = match value {
        Value::Date(dt) => *dt,
        Value::Text(text) => match parse_iso_datetime(text) {
            Some(dt) => dt,
            // Unparseable text is shown as-is
            None => return Ok(text.clone()),
        },
        other => return Err(FormatError::NotTemporal(other.kind_name())),
    };

    let pattern = match hint {
        Some(h) if h.contains('%') => h.to_string(),
        Some(h) => translate_date_pattern(h)?,
        None if kind == ValueKind::Datetime => DEFAULT_DATETIME_PATTERN.to_string(),
        None => DEFAULT_DATE_PATTERN.to_string(),
    };

    let items: Vec<Item<'_>> = StrftimeItems::new(&pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(FormatError::InvalidPattern(pattern));
    }
    Ok(dt.format_with_items(items.into_iter()).to_string())
}

/// Translates an LDML-style date pattern (`dd.MM.yyyy`, `MMM d, y HH:mm`)
/// into a strftime pattern. Text in single quotes is copied literally.
fn translate_date_pattern(pattern: &str) -> Result<String, FormatError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }
        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let spec = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('E', 4..) => "%A",
            ('E', _) => "%a",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('a', _) => "%p",
            _ => return Err(FormatError::InvalidPattern(pattern.to_string())),
        };
        out.push_str(spec);
        i += run;
    }

    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

// ============================================================================
// BOOLEANS
// ============================================================================

/// Formats a truthy/falsy value. The hint may carry custom labels as
/// `"true-label/false-label"`; the default is `Yes`/`No`.
fn format_boolean(value: &Value, hint: Option<&str>) -> String {
    let (yes, no) = hint
        .and_then(|h| h.split_once('/'))
        .unwrap_or(("Yes", "No"));

    let truthy = match value {
        Value::Bool(b) => *b,
        Value::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        Value::Number(n) => *n != 0.0,
        Value::Null => false,
        Value::Date(_) => true,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    };

    let label = if truthy { yes } else { no };
    label.to_string()
}
