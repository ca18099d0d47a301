use insights_export::{normalize, Normalized, Row};
use proptest::prelude::*;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
enum Aggregate {
    Percentile(Vec<u32>),
    Histogram(usize),
    Funnel(Vec<String>),
    Apdex,
    Keyset(Vec<String>),
    Rate,
    Plain,
}

fn aggregate_strategy() -> impl Strategy<Value = Aggregate> {
    prop_oneof![
        prop::collection::btree_set(1u32..100, 1..5)
            .prop_map(|thresholds| Aggregate::Percentile(thresholds.into_iter().collect())),
        (1usize..8).prop_map(Aggregate::Histogram),
        prop::collection::btree_set("[a-z]{1,6}( [a-z]{1,4})?", 1..5)
            .prop_map(|steps| Aggregate::Funnel(steps.into_iter().collect())),
        Just(Aggregate::Apdex),
        prop::collection::btree_set("[a-z]{1,8}", 1..5)
            .prop_map(|keys| Aggregate::Keyset(keys.into_iter().collect())),
        Just(Aggregate::Rate),
        Just(Aggregate::Plain),
    ]
}

/// A content descriptor, a matching result item and the number of columns it owns.
fn fixture(index: usize, aggregate: &Aggregate) -> (Value, Value, usize) {
    let alias = format!("m{index}");
    match aggregate {
        Aggregate::Percentile(thresholds) => {
            let values: serde_json::Map<String, Value> = thresholds
                .iter()
                .map(|threshold| (threshold.to_string(), json!(*threshold as f64 + 0.5)))
                .collect();
            (
                json!({"function": "percentile", "attribute": "duration", "alias": alias, "thresholds": thresholds}),
                json!({"percentiles": values}),
                thresholds.len(),
            )
        }
        Aggregate::Histogram(buckets) => (
            json!({"function": "histogram", "alias": alias, "start": 0, "bucketSize": 10, "bucketCount": buckets}),
            json!({"histogram": (0..*buckets).collect::<Vec<_>>()}),
            *buckets,
        ),
        Aggregate::Funnel(steps) => (
            json!({"function": "funnel", "alias": alias, "steps": steps}),
            json!({"steps": (1..=steps.len()).collect::<Vec<_>>()}),
            steps.len(),
        ),
        Aggregate::Apdex => (
            json!({"function": "apdex", "alias": alias}),
            json!({"count": 10, "s": 7, "t": 2, "f": 1, "score": 0.8}),
            5,
        ),
        Aggregate::Keyset(keys) => {
            let keys: Vec<String> = keys.iter().map(|key| format!("k{index}_{key}")).collect();
            (
                json!({"function": "keyset"}),
                json!({"allKeys": keys}),
                keys.len(),
            )
        }
        Aggregate::Rate => (
            json!({"function": "rate", "alias": alias, "of": {"function": "count"}}),
            json!({"result": 2}),
            1,
        ),
        Aggregate::Plain => (
            json!({"function": "average", "attribute": "duration", "alias": alias}),
            json!({"average": 3}),
            1,
        ),
    }
}

fn fixtures(aggregates: &[Aggregate]) -> (Vec<Value>, Vec<Value>, usize) {
    let mut contents = Vec::new();
    let mut items = Vec::new();
    let mut width = 0;
    for (index, aggregate) in aggregates.iter().enumerate() {
        let (descriptor, item, columns) = fixture(index, aggregate);
        contents.push(descriptor);
        items.push(item);
        width += columns;
    }
    (contents, items, width)
}

#[derive(Debug, Clone, Copy)]
enum Layout {
    Single,
    Facets,
    Timeseries,
    FacetsTimeseries,
}

fn layout_strategy() -> impl Strategy<Value = Layout> {
    prop_oneof![
        Just(Layout::Single),
        Just(Layout::Facets),
        Just(Layout::Timeseries),
        Just(Layout::FacetsTimeseries),
    ]
}

const GROUPS: usize = 2;
const BUCKETS: usize = 3;

fn buckets(items: &[Value]) -> Vec<Value> {
    (0..BUCKETS)
        .map(|bucket| json!({
            "beginTimeSeconds": bucket * 60,
            "endTimeSeconds": (bucket + 1) * 60,
            "inspectedCount": 10,
            "results": items
        }))
        .collect()
}

fn groups(items: &[Value], nested: &str) -> Vec<Value> {
    (0..GROUPS)
        .map(|group| {
            let content = match nested {
                "timeSeries" => Value::Array(buckets(items)),
                _ => Value::Array(items.to_vec()),
            };
            json!({"name": format!("g{group}"), nested: content})
        })
        .collect()
}

impl Layout {
    fn rows(self) -> usize {
        match self {
            Layout::Single => 1,
            Layout::Facets => GROUPS,
            Layout::Timeseries => BUCKETS,
            Layout::FacetsTimeseries => GROUPS * BUCKETS,
        }
    }

    /// The same result items wrapped the way a query of this layout returns them.
    fn response(self, contents: &[Value], items: &[Value]) -> Value {
        match self {
            Layout::Single => json!({"metadata": {"contents": contents}, "results": items}),
            Layout::Facets => json!({
                "metadata": {"facet": "appName", "contents": {"contents": contents}},
                "facets": groups(items, "results")
            }),
            Layout::Timeseries => json!({
                "metadata": {"contents": {}, "timeSeries": {"contents": contents}},
                "timeSeries": buckets(items)
            }),
            Layout::FacetsTimeseries => json!({
                "metadata": {
                    "facet": "appName",
                    "contents": {"timeSeries": {"contents": contents}}
                },
                "facets": groups(items, "timeSeries")
            }),
        }
    }

    /// Both periods carry the same items. `None` for layouts with no compare shape of
    /// their own.
    fn compared(self, contents: &[Value], items: &[Value]) -> Option<Value> {
        let (metadata_contents, key, side) = match self {
            Layout::Single => (json!({"contents": contents}), "results", json!(items)),
            Layout::Facets => (
                json!({"facet": "appName", "contents": {"contents": contents}}),
                "facets",
                json!(groups(items, "results")),
            ),
            Layout::Timeseries => (
                json!({"timeSeries": {"contents": contents}}),
                "timeSeries",
                json!(buckets(items)),
            ),
            Layout::FacetsTimeseries => return None,
        };
        Some(json!({
            "metadata": {"compareWith": 86400000, "contents": metadata_contents},
            "current": {key: side.clone()},
            "previous": {key: side}
        }))
    }
}

fn table(response: &Value) -> (Vec<String>, usize, Vec<Row>) {
    match normalize(response, &Row::new()) {
        Normalized::Table { header, rows } => {
            (header.columns().to_vec(), header.offset(), rows.collect())
        }
        Normalized::Empty(err) => panic!("expected a table, got {err}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn header_and_rows_agree_on_arity(
        layout in layout_strategy(),
        aggregates in prop::collection::vec(aggregate_strategy(), 1..6)
    ) {
        let (contents, items, width) = fixtures(&aggregates);
        let response = layout.response(&contents, &items);

        let (header, offset, rows) = table(&response);

        prop_assert_eq!(header.len(), offset + width);
        prop_assert_eq!(rows.len(), layout.rows());
        for row in &rows {
            prop_assert_eq!(row.len(), header.len());
            for column in &header[offset..] {
                prop_assert!(!row[column].is_null(), "{} was not filled", column);
            }
        }
    }

    #[test]
    fn event_rows_agree_with_the_scanned_header(
        events in prop::collection::vec(
            prop::collection::btree_map("[a-z]{1,6}", 0u32..100, 0..5),
            0..6,
        )
    ) {
        let response = json!({
            "metadata": {"contents": [{"function": "events", "order": {"column": "timestamp"}}]},
            "results": [{"events": events}]
        });

        let (header, _, rows) = table(&response);

        prop_assert_eq!(rows.len(), events.len());
        for (row, event) in rows.iter().zip(&events) {
            prop_assert_eq!(row.keys().collect::<Vec<_>>(), header.iter().collect::<Vec<_>>());
            for (key, value) in event {
                prop_assert_eq!(&row[key], &json!(value));
            }
        }
    }

    #[test]
    fn header_construction_is_idempotent(
        layout in layout_strategy(),
        aggregates in prop::collection::vec(aggregate_strategy(), 1..6)
    ) {
        let (contents, items, _) = fixtures(&aggregates);
        let response = layout.response(&contents, &items);

        let (first, _, _) = table(&response);
        let (second, _, _) = table(&response);

        prop_assert_eq!(first, second);
    }

    #[test]
    fn comparing_a_result_with_itself_is_symmetric(
        layout in layout_strategy(),
        aggregates in prop::collection::vec(aggregate_strategy(), 1..6)
    ) {
        let (contents, items, width) = fixtures(&aggregates);
        let Some(response) = layout.compared(&contents, &items) else {
            return Ok(());
        };

        let (header, offset, rows) = table(&response);

        prop_assert_eq!(header.len(), offset + 2 * width);
        prop_assert_eq!(rows.len(), layout.rows());
        for row in &rows {
            prop_assert_eq!(row.len(), header.len());
            for column in &header[offset..offset + width] {
                let twin = format!("{column}_compare");
                prop_assert!(!row[column].is_null(), "{} was not filled", column);
                prop_assert_eq!(&row[column], &row[&twin]);
            }
        }
    }

    #[test]
    fn facets_times_buckets_yield_every_pair(groups in 1usize..5, buckets in 1usize..6) {
        let facets: Vec<Value> = (0..groups)
            .map(|group| {
                let series: Vec<Value> = (0..buckets)
                    .map(|bucket| json!({
                        "beginTimeSeconds": bucket * 60,
                        "endTimeSeconds": (bucket + 1) * 60,
                        "inspectedCount": group + bucket,
                        "results": [{"count": group * 100 + bucket}]
                    }))
                    .collect();
                json!({"name": format!("g{group}"), "timeSeries": series})
            })
            .collect();
        let response = json!({
            "metadata": {
                "facet": "appName",
                "contents": {"timeSeries": {"contents": [{"function": "count"}]}}
            },
            "facets": facets
        });

        let (_, _, rows) = table(&response);

        prop_assert_eq!(rows.len(), groups * buckets);
        for (index, row) in rows.iter().enumerate() {
            let (group, bucket) = (index / buckets, index % buckets);
            prop_assert_eq!(&row["appName"], &json!(format!("g{group}")));
            prop_assert_eq!(&row["timestamp"], &json!((bucket + 1) * 60));
            prop_assert_eq!(&row["timewindow"], &json!(60));
            prop_assert_eq!(&row["count"], &json!(group * 100 + bucket));
        }
    }
}
