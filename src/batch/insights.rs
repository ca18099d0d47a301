use std::iter;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{DumpError, Storage};
use crate::{
    client::insert_events,
    config::InsertConfig,
    normalize::{Header, Row, Rows},
};

/// Most events the insert API accepts in one post.
pub const MAX_EVENTS: usize = 1000;

/// Posts the rows back to Insights as custom events named after the query.
pub struct InsightsStorage {
    config: InsertConfig,
    timestamp: i64,
    max_retries: u32,
}

impl InsightsStorage {
    /// `timestamp` is stamped on every event that does not carry its own.
    pub fn new(config: InsertConfig, timestamp: i64, max_retries: u32) -> Self {
        InsightsStorage {
            config,
            timestamp,
            max_retries,
        }
    }
}

/// The row's own attributes win over `eventType` and `timestamp`.
fn event(event_type: &str, timestamp: i64, row: Row) -> Row {
    let mut event = Row::new();
    event.insert("eventType".to_owned(), Value::from(event_type));
    event.insert("timestamp".to_owned(), Value::from(timestamp));
    event.extend(row);
    event
}

fn chunks<I: Iterator<Item = Row>>(mut rows: I, size: usize) -> impl Iterator<Item = Vec<Row>> {
    iter::from_fn(move || {
        let chunk: Vec<Row> = rows.by_ref().take(size).collect();
        (!chunk.is_empty()).then_some(chunk)
    })
}

#[async_trait]
impl Storage for InsightsStorage {
    async fn dump(
        &mut self,
        _master_name: &str,
        query_name: &str,
        _header: &Header,
        rows: Rows<'_>,
    ) -> Result<usize, DumpError> {
        let timestamp = self.timestamp;
        let events = rows.map(|row| event(query_name, timestamp, row));

        let mut count = 0;
        for chunk in chunks(events, MAX_EVENTS) {
            insert_events(&self.config, &chunk, self.max_retries).await?;
            count += chunk.len();
            debug!(count, event_type = query_name, "inserted events");
        }
        Ok(count)
    }
}
