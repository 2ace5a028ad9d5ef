//! Per-field format checks shared by every wire type

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static UUID_CANONICAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

static LEFT_RIGHT_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*(\.[a-z0-9]+)*$").unwrap());

/// Format constraint attached to a field descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Lowercase hyphenated 8-4-4-4-12 hex
    UuidCanonicalTextual,
    /// Lowercase alphanumeric words separated by dots, first word starts with a letter
    LeftRightDot,
    NonNegative,
    PositiveInteger,
    /// 0 or 1
    Bit,
    /// Milliseconds since the epoch, plausibly in this century
    ReasonableUnixTimeMs,
    ReasonableUnixTimeS,
}

impl Format {
    /// Check one scalar; list fields apply this to each element.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Format::UuidCanonicalTextual => check_regex(value, &UUID_CANONICAL, "UuidCanonicalTextual"),
            Format::LeftRightDot => check_regex(value, &LEFT_RIGHT_DOT, "LeftRightDot"),
            Format::NonNegative => match value.as_f64() {
                Some(n) if n >= 0.0 => Ok(()),
                _ => Err(format!("{value} must be non-negative")),
            },
            Format::PositiveInteger => match value.as_i64() {
                Some(n) if n > 0 => Ok(()),
                _ => Err(format!("{value} must be a positive integer")),
            },
            Format::Bit => match value.as_i64() {
                Some(0) | Some(1) => Ok(()),
                _ => Err(format!("{value} must be 0 or 1")),
            },
            Format::ReasonableUnixTimeMs => match value.as_i64() {
                Some(n) if (946_684_800_000..4_102_444_800_000).contains(&n) => Ok(()),
                _ => Err(format!("{value} is not a reasonable unix time in ms")),
            },
            Format::ReasonableUnixTimeS => match value.as_i64() {
                Some(n) if (946_684_800..4_102_444_800).contains(&n) => Ok(()),
                _ => Err(format!("{value} is not a reasonable unix time in s")),
            },
        }
    }
}

fn check_regex(value: &Value, re: &Regex, name: &str) -> Result<(), String> {
    match value.as_str() {
        Some(text) if re.is_match(text) => Ok(()),
        Some(text) => Err(format!("'{text}' is not {name}")),
        None => Err(format!("{value} is not a string")),
    }
}

pub fn is_left_right_dot(text: &str) -> bool {
    Format::LeftRightDot
        .check(&Value::String(text.to_string()))
        .is_ok()
}
