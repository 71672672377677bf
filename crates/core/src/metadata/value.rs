//! Typed metadata values

use serde::{Deserialize, Serialize};
use std::fmt;

/// A metadata value: a scalar or an ordered list.
///
/// Persisted stores keep raw text; [`MetadataValue::parse`] decides the
/// variant once at lookup time. Lists use the ENVI `{a, b, c}` notation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Number(f64),
    Text(String),
    Numbers(Vec<f64>),
    Texts(Vec<String>),
}

impl MetadataValue {
    /// Parse raw persisted text.
    ///
    /// `{...}` is a list (numeric if every entry parses as a number), a plain
    /// number is a `Number`, anything else is `Text`. Unbalanced braces are
    /// an error.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let text = raw.trim();
        if let Some(inner) = text.strip_prefix('{') {
            let inner = inner
                .strip_suffix('}')
                .ok_or_else(|| format!("unterminated list '{}'", truncate(text)))?;
            if inner.contains('{') || inner.contains('}') {
                return Err(format!("nested braces in list '{}'", truncate(text)));
            }
            let entries: Vec<&str> = inner
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .collect();
            let numbers: Option<Vec<f64>> = entries.iter().map(|e| e.parse().ok()).collect();
            return Ok(match numbers {
                Some(n) if !n.is_empty() => MetadataValue::Numbers(n),
                _ => MetadataValue::Texts(entries.into_iter().map(String::from).collect()),
            });
        }
        if text.ends_with('}') {
            return Err(format!("unbalanced braces in '{}'", truncate(text)));
        }
        Ok(match text.parse::<f64>() {
            Ok(n) => MetadataValue::Number(n),
            Err(_) => MetadataValue::Text(text.to_string()),
        })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Entry `index` (0-based) of a list value as a scalar value
    pub fn list_item(&self, index: usize) -> Option<MetadataValue> {
        match self {
            MetadataValue::Numbers(n) => n.get(index).copied().map(MetadataValue::Number),
            MetadataValue::Texts(t) => t.get(index).cloned().map(MetadataValue::Text),
            _ => None,
        }
    }

    /// Short type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            MetadataValue::Number(_) => "number",
            MetadataValue::Text(_) => "text",
            MetadataValue::Numbers(_) => "number list",
            MetadataValue::Texts(_) => "text list",
        }
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(40) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text.to_string(),
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Number(n) => write!(f, "{}", n),
            MetadataValue::Text(s) => f.write_str(s),
            MetadataValue::Numbers(n) => {
                let parts: Vec<String> = n.iter().map(|v| v.to_string()).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            MetadataValue::Texts(t) => write!(f, "{{{}}}", t.join(", ")),
        }
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Number(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        MetadataValue::Number(v as f64)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Text(v)
    }
}

impl From<Vec<f64>> for MetadataValue {
    fn from(v: Vec<f64>) -> Self {
        MetadataValue::Numbers(v)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(v: Vec<String>) -> Self {
        MetadataValue::Texts(v)
    }
}
