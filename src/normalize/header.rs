use serde_json::Value;

use super::{
    descriptor::{ContentDescriptor, Expansion, Function, APDEX_METRICS},
    shape::{label, list, FacetSpec, Shape},
    Row,
};

pub(crate) const COMPARE_SUFFIX: &str = "_compare";

const EPOCH_START: f64 = 25569.0; // 1970-01-01 00:00:00
const SECONDS_IN_A_DAY: f64 = 86400.0;

/// Converts a unix timestamp to a spreadsheet serial datetime.
pub fn to_datetime(timestamp: i64) -> f64 {
    timestamp as f64 / SECONDS_IN_A_DAY + EPOCH_START
}

/// Caller include values followed by the query timing fields, in header order.
pub fn query_meta(include: &Row, metadata: &Value, response: &Value, shape: Shape) -> Row {
    let mut meta = include.clone();

    let begin = seconds(metadata, "beginTimeMillis");
    let timestamp = seconds(metadata, "endTimeMillis");
    let timewindow = timestamp - begin;

    meta.insert("datetime".to_owned(), to_datetime(timestamp).into());
    meta.insert("timestamp".to_owned(), timestamp.into());
    meta.insert("timewindow".to_owned(), timewindow.into());

    if shape.is_compare() {
        let timestamp_compare = timestamp - seconds(metadata, "compareWith");
        meta.insert(
            format!("datetime{COMPARE_SUFFIX}"),
            to_datetime(timestamp_compare).into(),
        );
        meta.insert(
            format!("timestamp{COMPARE_SUFFIX}"),
            timestamp_compare.into(),
        );
        meta.insert(format!("timewindow{COMPARE_SUFFIX}"), timewindow.into());
    }

    // overwritten per bucket by the time series extractors
    if shape.has_buckets() {
        let inspected = response
            .pointer("/performanceStats/inspectedCount")
            .cloned()
            .unwrap_or(Value::Null);
        meta.insert("inspectedCount".to_owned(), inspected.clone());
        if shape.is_compare() {
            meta.insert(format!("inspectedCount{COMPARE_SUFFIX}"), inspected);
        }
    }

    meta
}

fn seconds(metadata: &Value, key: &str) -> i64 {
    metadata
        .get(key)
        .and_then(Value::as_f64)
        .map(|millis| (millis / 1000.0) as i64)
        .unwrap_or(0)
}

/// Ordered output columns of one query, plus the layout the row extractors fill them by.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    columns: Vec<String>,
    prefix_len: usize,
    offset: usize,
    layout: Vec<Expansion>,
    width: usize,
}

impl Header {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Index of the first aggregate-derived column.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn layout(&self) -> &[Expansion] {
        &self.layout
    }

    pub fn facet_columns(&self) -> &[String] {
        &self.columns[self.prefix_len..self.offset]
    }

    pub fn aggregate_columns(&self) -> &[String] {
        &self.columns[self.offset..self.offset + self.width]
    }

    /// The `_compare` twins of the aggregate columns; empty unless the query compares.
    pub fn compare_columns(&self) -> &[String] {
        &self.columns[self.offset + self.width..]
    }

    /// Reorders a row to the header, with null for every column the row lacks.
    pub fn conform(&self, row: Row) -> Row {
        self.columns
            .iter()
            .map(|column| {
                let value = row.get(column).cloned().unwrap_or(Value::Null);
                (column.to_owned(), value)
            })
            .collect()
    }
}

/// Builds the header: query meta keys, facet names, then one or more columns per
/// content descriptor. `items` are the leaf result items, scanned for functions whose
/// columns are only discoverable from the data.
pub fn build_header(
    contents: &[ContentDescriptor],
    items: &[&Value],
    meta: &Row,
    facet: Option<&FacetSpec>,
    compare: bool,
) -> Header {
    let mut columns: Vec<String> = meta.keys().cloned().collect();
    let prefix_len = columns.len();

    if let Some(facet) = facet {
        columns.extend(facet.names().iter().cloned());
    }
    let offset = columns.len();

    let layout: Vec<Expansion> = contents
        .iter()
        .map(|descriptor| expand(descriptor, items, &mut columns))
        .collect();
    let width = columns.len() - offset;

    if compare {
        let previous: Vec<String> = columns[offset..]
            .iter()
            .map(|column| format!("{column}{COMPARE_SUFFIX}"))
            .collect();
        columns.extend(previous);
    }

    Header {
        columns,
        prefix_len,
        offset,
        layout,
        width,
    }
}

/// Appends the columns of one descriptor and returns how it was expanded.
fn expand(descriptor: &ContentDescriptor, items: &[&Value], columns: &mut Vec<String>) -> Expansion {
    let root = descriptor.column_root();

    match descriptor.kind() {
        Function::Percentile => {
            let keys: Vec<String> = descriptor
                .thresholds
                .iter()
                .flatten()
                .map(|threshold| threshold.to_string())
                .collect();
            columns.extend(keys.iter().map(|key| format!("{root}_{key}")));
            Expansion::Percentile(keys)
        }
        Function::Histogram => {
            let size = descriptor.bucket_size.unwrap_or_default();
            let count = descriptor.bucket_count.unwrap_or_default();
            let mut start = descriptor.start.unwrap_or_default();
            for _ in 0..count {
                let end = start + size;
                columns.push(format!("{root}_{start:05.2}_{end:05.2}"));
                start = end;
            }
            Expansion::Histogram(count)
        }
        Function::Funnel => {
            let steps = descriptor.steps.as_deref().unwrap_or_default();
            columns.extend(
                steps
                    .iter()
                    .map(|step| format!("{root}_{}", step.replace(' ', "_"))),
            );
            Expansion::Funnel(steps.len())
        }
        Function::Apdex => {
            columns.extend(APDEX_METRICS.iter().map(|metric| format!("{root}_{metric}")));
            Expansion::Apdex
        }
        Function::Events => {
            let keys = items
                .iter()
                .flat_map(|item| list(item, "events"))
                .filter_map(Value::as_object)
                .flat_map(|event| event.keys().cloned());
            Expansion::Events(append_unseen(keys, columns).len())
        }
        Function::EventTypes => listing("eventTypes", items, columns),
        Function::Keyset => listing("allKeys", items, columns),
        Function::Rate | Function::Other(_) => {
            columns.push(root);
            Expansion::Single
        }
    }
}

fn listing(key: &'static str, items: &[&Value], columns: &mut Vec<String>) -> Expansion {
    let names = items.iter().flat_map(|item| list(item, key)).map(label);
    Expansion::Listing {
        key,
        names: append_unseen(names, columns),
    }
}

/// First-seen order, skipping names already anywhere in the header. Returns the
/// names that were appended.
fn append_unseen(names: impl Iterator<Item = String>, columns: &mut Vec<String>) -> Vec<String> {
    let mut appended = Vec::new();
    for name in names {
        if !columns.contains(&name) {
            columns.push(name.clone());
            appended.push(name);
        }
    }
    appended
}
