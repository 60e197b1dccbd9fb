use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

/// Page reference as reported by the extraction service, coerced to a number.
///
/// Coercion follows the browser's `Number()`: blank text, `null` and `false`
/// become 0, `true` becomes 1, numeric text (including `0x` style radix
/// prefixes) is parsed, and everything else ends up as NaN. Only positive
/// integers ever validate as pages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRef(f64);

impl PageRef {
    pub fn from_number(value: f64) -> Self {
        Self(value)
    }

    pub fn from_text(text: &str) -> Self {
        Self(parse_numeric_text(text.trim()).unwrap_or(f64::NAN))
    }

    pub fn coerce(value: &Value) -> Self {
        match value {
            Value::Number(number) => Self(number.as_f64().unwrap_or(f64::NAN)),
            Value::String(text) => Self::from_text(text),
            Value::Bool(flag) => Self(if *flag { 1.0 } else { 0.0 }),
            Value::Null => Self(0.0),
            Value::Array(_) | Value::Object(_) => Self(f64::NAN),
        }
    }

    /// A page field the service left out entirely.
    pub fn missing() -> Self {
        Self(f64::NAN)
    }

    pub fn raw(&self) -> f64 {
        self.0
    }

    /// The 1-based page this reference points at, if it is a positive integer.
    pub fn page(&self) -> Option<u32> {
        let value = self.0;
        if !value.is_finite() || value.fract() != 0.0 || value < 1.0 || value > u32::MAX as f64 {
            return None;
        }
        Some(value as u32)
    }
}

fn parse_numeric_text(text: &str) -> Option<f64> {
    if text.is_empty() {
        return Some(0.0);
    }
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        let digits = text
            .get(..2)
            .filter(|head| head.eq_ignore_ascii_case(prefix))
            .map(|_| &text[2..]);
        if let Some(digits) = digits {
            return u64::from_str_radix(digits, radix).ok().map(|value| value as f64);
        }
    }
    match text.trim_start_matches(['+', '-']) {
        "Infinity" => text.parse::<f64>().ok(),
        unsigned
            if unsigned
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) =>
        {
            text.parse::<f64>().ok()
        }
        _ => None,
    }
}

impl From<u32> for PageRef {
    fn from(page: u32) -> Self {
        Self(f64::from(page))
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page() {
            Some(page) => write!(f, "{page}"),
            None if self.0.is_nan() => f.write_str("?"),
            None => write!(f, "{}", self.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadingLevel {
    Numbered(u8),
    Other(String),
}

const MAX_INDENT: usize = 2;

impl HeadingLevel {
    pub fn parse(label: &str) -> Self {
        let trimmed = label.trim();
        let numbered = trimmed
            .strip_prefix('H')
            .or_else(|| trimmed.strip_prefix('h'))
            .and_then(|digits| digits.parse::<u8>().ok())
            .filter(|level| *level >= 1);
        match numbered {
            Some(level) => HeadingLevel::Numbered(level),
            None => HeadingLevel::Other(trimmed.to_owned()),
        }
    }

    pub fn indent(&self) -> usize {
        match self {
            HeadingLevel::Numbered(level) => usize::from(level - 1).min(MAX_INDENT),
            HeadingLevel::Other(_) => 0,
        }
    }
}

impl fmt::Display for HeadingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadingLevel::Numbered(level) => write!(f, "H{level}"),
            HeadingLevel::Other(label) => f.write_str(label),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlineEntry {
    pub text: String,
    pub level: HeadingLevel,
    pub page: PageRef,
}

impl OutlineEntry {
    pub fn new(text: impl Into<String>, level: HeadingLevel, page: impl Into<PageRef>) -> Self {
        Self {
            text: text.into(),
            level,
            page: page.into(),
        }
    }
}

/// Stable sort by page; references that are not numbers go last.
pub fn sort_by_page(entries: &mut [OutlineEntry]) {
    entries.sort_by(|a, b| compare_pages(a.page, b.page));
}

fn compare_pages(a: PageRef, b: PageRef) -> Ordering {
    match (a.raw().is_nan(), b.raw().is_nan()) {
        (false, false) => a.raw().total_cmp(&b.raw()),
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => Ordering::Equal,
    }
}
