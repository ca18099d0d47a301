use std::{iter, sync::Arc};

use serde_json::Value;

use super::{
    descriptor::{Expansion, APDEX_METRICS},
    header::{to_datetime, Header, COMPARE_SUFFIX},
    shape::{label, list, Sides, Source},
    Row,
};

/// A lazy, single pass sequence of rows.
pub type Rows<'a> = Box<dyn Iterator<Item = Row> + Send + 'a>;

type Columns = Arc<[String]>;

impl Expansion {
    /// The value feeding column `position` of this expansion, taken from the result
    /// item of the same descriptor.
    fn value<'v>(&self, item: &'v Value, position: usize) -> Option<&'v Value> {
        match self {
            Expansion::Percentile(keys) => {
                let percentiles = item.get("percentiles")?;
                percentiles.get(&keys[position]).or_else(|| {
                    percentiles
                        .as_object()
                        .and_then(|values| values.values().nth(position))
                })
            }
            Expansion::Histogram(_) => item.get("histogram")?.get(position),
            Expansion::Funnel(_) => item.get("steps")?.get(position),
            Expansion::Apdex => item.get(APDEX_METRICS[position]),
            Expansion::Listing { key, names } => {
                let name = &names[position];
                item.get(*key)?
                    .as_array()?
                    .iter()
                    .find(|listed| label(listed) == *name)
            }
            Expansion::Events(_) => None,
            Expansion::Single => item.as_object()?.values().next(),
        }
    }
}

/// Positional value filler: walks the header layout and the result items in step,
/// one item per descriptor, writing exactly the columns each descriptor owns.
pub(crate) fn fill_aggregates(row: &mut Row, layout: &[Expansion], columns: &[String], items: &[Value]) {
    let mut cursor = 0;
    for (index, expansion) in layout.iter().enumerate() {
        let width = expansion.width();
        let Some(span) = columns.get(cursor..cursor + width) else {
            break;
        };
        let item = items.get(index);
        for (position, column) in span.iter().enumerate() {
            let value = item
                .and_then(|item| expansion.value(item, position))
                .cloned()
                .unwrap_or(Value::Null);
            row.insert(column.to_owned(), value);
        }
        cursor += width;
    }
}

/// Picks the extractor for the located results collection.
pub(crate) fn extract<'a>(source: Source<'a>, header: Arc<Header>, include: Arc<Row>) -> Rows<'a> {
    let current: Columns = Arc::from(header.aggregate_columns());
    let previous: Columns = Arc::from(header.compare_columns());

    match source {
        Source::Single(results) => Box::new(single(results, header, include, current)),
        Source::EventsList(results) => Box::new(events_list(results, include)),
        Source::Facets(groups) => Box::new(facets(groups, header, include, current)),
        Source::Timeseries(buckets) => {
            Box::new(timeseries(buckets, header, include, current, ""))
        }
        Source::FacetsTimeseries(groups) => {
            Box::new(facets_timeseries(groups, header, include, current))
        }
        Source::Compare(sides) => Box::new(compare(sides, header, include, current, previous)),
        Source::CompareFacets(sides) => {
            Box::new(compare_facets(sides, header, include, current, previous))
        }
        Source::CompareTimeseries(sides) => {
            Box::new(compare_timeseries(sides, header, include, current, previous))
        }
    }
}

/// SELECT aggr1, aggr2, ... FROM ...
fn single<'a>(
    results: &'a [Value],
    header: Arc<Header>,
    include: Arc<Row>,
    columns: Columns,
) -> impl Iterator<Item = Row> + Send + 'a {
    iter::once_with(move || {
        let mut row = (*include).clone();
        fill_aggregates(&mut row, header.layout(), &columns, results);
        row
    })
}

/// SELECT attr1, attr2, ... FROM ...
fn events_list<'a>(results: &'a [Value], include: Arc<Row>) -> impl Iterator<Item = Row> + Send + 'a {
    let events = results
        .first()
        .map(|result| list(result, "events"))
        .unwrap_or_default();

    events.iter().map(move |event| {
        let mut row: Row = event
            .as_object()
            .map(|fields| {
                fields
                    .iter()
                    .map(|(key, value)| (key.to_owned(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        row.extend(include.iter().map(|(key, value)| (key.to_owned(), value.clone())));
        row
    })
}

/// Include values followed by the group's facet value(s).
fn facet_row(group: &Value, facet_columns: &[String], include: &Row) -> Row {
    let mut row = include.clone();
    match group.get("name") {
        Some(Value::Array(values)) => {
            for (column, value) in facet_columns.iter().zip(values) {
                row.insert(column.to_owned(), value.clone());
            }
        }
        Some(value) => {
            if let Some(column) = facet_columns.first() {
                row.insert(column.to_owned(), value.clone());
            }
        }
        None => {}
    }
    row
}

/// SELECT aggr1, aggr2, ... FROM ... FACET attr1, attr2, ...
fn facets<'a>(
    groups: &'a [Value],
    header: Arc<Header>,
    include: Arc<Row>,
    columns: Columns,
) -> impl Iterator<Item = Row> + Send + 'a {
    groups.iter().map(move |group| {
        let mut row = facet_row(group, header.facet_columns(), &include);
        fill_aggregates(&mut row, header.layout(), &columns, list(group, "results"));
        row
    })
}

/// Writes the bucket's own timing fields, each name followed by `suffix`.
fn bucket_timing(row: &mut Row, bucket: &Value, suffix: &str) {
    let end = bucket.get("endTimeSeconds");
    let begin = bucket.get("beginTimeSeconds");

    let datetime = end
        .and_then(Value::as_f64)
        .map(|seconds| Value::from(to_datetime(seconds as i64)))
        .unwrap_or(Value::Null);
    let timewindow = match (end, begin) {
        (Some(end), Some(begin)) => match (end.as_i64(), begin.as_i64()) {
            (Some(end), Some(begin)) => Value::from(end - begin),
            _ => match (end.as_f64(), begin.as_f64()) {
                (Some(end), Some(begin)) => Value::from(end - begin),
                _ => Value::Null,
            },
        },
        _ => Value::Null,
    };

    row.insert(format!("datetime{suffix}"), datetime);
    row.insert(
        format!("timestamp{suffix}"),
        end.cloned().unwrap_or(Value::Null),
    );
    row.insert(format!("timewindow{suffix}"), timewindow);
    row.insert(
        format!("inspectedCount{suffix}"),
        bucket.get("inspectedCount").cloned().unwrap_or(Value::Null),
    );
}

/// SELECT aggr1, aggr2, ... FROM ... TIMESERIES
fn timeseries<'a>(
    buckets: &'a [Value],
    header: Arc<Header>,
    include: Arc<Row>,
    columns: Columns,
    suffix: &'static str,
) -> impl Iterator<Item = Row> + Send + 'a {
    buckets.iter().map(move |bucket| {
        let mut row = (*include).clone();
        bucket_timing(&mut row, bucket, suffix);
        fill_aggregates(&mut row, header.layout(), &columns, list(bucket, "results"));
        row
    })
}

/// SELECT aggr1, aggr2, ... FROM ... FACET attr1, attr2, ... TIMESERIES
fn facets_timeseries<'a>(
    groups: &'a [Value],
    header: Arc<Header>,
    include: Arc<Row>,
    columns: Columns,
) -> impl Iterator<Item = Row> + Send + 'a {
    groups.iter().flat_map(move |group| {
        let row = Arc::new(facet_row(group, header.facet_columns(), &include));
        timeseries(
            list(group, "timeSeries"),
            header.clone(),
            row,
            columns.clone(),
            "",
        )
    })
}

/// SELECT aggr1, aggr2, ... FROM ... COMPARE WITH ...
fn compare<'a>(
    sides: Sides<'a>,
    header: Arc<Header>,
    include: Arc<Row>,
    current: Columns,
    previous: Columns,
) -> impl Iterator<Item = Row> + Send + 'a {
    iter::once_with(move || {
        let mut row = (*include).clone();
        fill_aggregates(&mut row, header.layout(), &current, sides.current);
        fill_aggregates(&mut row, header.layout(), &previous, sides.previous);
        row
    })
}

/// SELECT aggr1, aggr2, ... FROM ... COMPARE WITH ... FACET attr1, attr2, ...
///
/// Facet groups of both periods are paired by position.
fn compare_facets<'a>(
    sides: Sides<'a>,
    header: Arc<Header>,
    include: Arc<Row>,
    current: Columns,
    previous: Columns,
) -> impl Iterator<Item = Row> + Send + 'a {
    facets(sides.current, header.clone(), include, current)
        .zip(facets(sides.previous, header, Arc::default(), previous))
        .map(merge)
}

/// SELECT aggr1, aggr2, ... FROM ... COMPARE WITH ... TIMESERIES
fn compare_timeseries<'a>(
    sides: Sides<'a>,
    header: Arc<Header>,
    include: Arc<Row>,
    current: Columns,
    previous: Columns,
) -> impl Iterator<Item = Row> + Send + 'a {
    timeseries(sides.current, header.clone(), include, current, "")
        .zip(timeseries(
            sides.previous,
            header,
            Arc::default(),
            previous,
            COMPARE_SUFFIX,
        ))
        .map(merge)
}

/// The previous side is built without include values, so only its own facet, bucket
/// timing and `_compare` columns land on the current row.
fn merge((mut current, previous): (Row, Row)) -> Row {
    current.extend(previous);
    current
}
