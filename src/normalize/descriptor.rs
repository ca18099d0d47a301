use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Number, Value};
use strum::EnumString;

pub const APDEX_METRICS: [&str; 5] = ["count", "s", "t", "f", "score"];

/// Aggregate or selector functions that expand into something other than a single column.
/// Every other function name lands in `Other` and yields exactly one column.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum Function {
    Percentile,
    Histogram,
    Funnel,
    Apdex,
    Rate,
    Events,
    EventTypes,
    Keyset,
    #[strum(default)]
    Other(String),
}

/// One entry of the `contents` list in a response's metadata block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDescriptor {
    pub function: String,
    pub attribute: Option<String>,
    pub alias: Option<String>,
    /// funnel step names
    pub steps: Option<Vec<String>>,
    /// percentile thresholds
    pub thresholds: Option<Vec<Number>>,
    pub start: Option<f64>,
    pub bucket_size: Option<f64>,
    pub bucket_count: Option<usize>,
    /// the function `rate` was applied to
    pub of: Option<Box<ContentDescriptor>>,
}

impl ContentDescriptor {
    /// Reads a descriptor, lifting the alias off an `{alias, contents}` wrapper when present.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        match value.get("contents").filter(|inner| inner.is_object()) {
            Some(inner) => {
                let mut descriptor = Self::deserialize(inner)?;
                if let Some(alias) = value.get("alias").and_then(Value::as_str) {
                    descriptor.alias = Some(alias.to_owned());
                }
                Ok(descriptor)
            }
            None => Self::deserialize(value),
        }
    }

    pub fn kind(&self) -> Function {
        Function::from_str(&self.function)
            .unwrap_or_else(|_| Function::Other(self.function.to_owned()))
    }

    /// The name every column derived from this descriptor starts with.
    pub fn column_root(&self) -> String {
        if let Some(alias) = non_empty(&self.alias) {
            return alias.to_owned();
        }

        let mut root = match non_empty(&self.attribute) {
            Some(attribute) => format!("{}_{}", self.function, attribute),
            None => self.function.to_owned(),
        };

        if self.kind() == Function::Rate {
            if let Some(of) = &self.of {
                root.push('_');
                root.push_str(&of.function);
                if let Some(attribute) = non_empty(&of.attribute) {
                    root.push('_');
                    root.push_str(attribute);
                }
            }
        }

        root
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

/// How one descriptor was spread over header columns.
///
/// The header builder records one `Expansion` per descriptor and the row
/// extractors walk that same list, so both sides always agree on how many
/// columns each descriptor owns.
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    /// one column per threshold, values keyed by the threshold text
    Percentile(Vec<String>),
    Histogram(usize),
    Funnel(usize),
    Apdex,
    /// names scanned out of a list carried by each result item (`eventTypes`, `allKeys`);
    /// a cell holds the name when that item's list has it
    Listing { key: &'static str, names: Vec<String> },
    /// raw event attributes, only populated by the events list extractor
    Events(usize),
    Single,
}

impl Expansion {
    pub fn width(&self) -> usize {
        match self {
            Expansion::Percentile(keys) => keys.len(),
            Expansion::Histogram(width) | Expansion::Funnel(width) | Expansion::Events(width) => {
                *width
            }
            Expansion::Apdex => APDEX_METRICS.len(),
            Expansion::Listing { names, .. } => names.len(),
            Expansion::Single => 1,
        }
    }
}
