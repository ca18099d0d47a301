use std::error::Error;

use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    config::{Config, InsertConfig},
    normalize::Row,
};

pub const MAX_RETRIES: u32 = 5;

pub type ClientError = Box<dyn Error + Send + Sync>;

/// Runs one NRQL query and returns the decoded JSON response.
///
/// Non-success statuses and transport errors are retried up to `max_retries` attempts.
pub async fn execute_query(
    config: &Config,
    nrql: &str,
    max_retries: u32,
) -> Result<Value, ClientError> {
    let url = config.query_url();
    let client = reqwest::Client::new();

    let response = send_with_retries(&url, max_retries, || {
        client
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Query-Key", &config.query_api_key)
            .query(&[("nrql", nrql)])
    })
    .await?;

    Ok(response.json().await?)
}

/// Posts one batch of custom events to the Insights insert API.
pub async fn insert_events(
    config: &InsertConfig,
    events: &[Row],
    max_retries: u32,
) -> Result<(), ClientError> {
    let url = config.events_url();
    let client = reqwest::Client::new();

    send_with_retries(&url, max_retries, || {
        client
            .post(&url)
            .header("X-Insert-Key", &config.insert_api_key)
            .json(events)
    })
    .await?;

    Ok(())
}

async fn send_with_retries(
    url: &str,
    max_retries: u32,
    request: impl Fn() -> RequestBuilder,
) -> Result<Response, ClientError> {
    let max_retries = max_retries.max(1);

    for attempt in 1..=max_retries {
        match request().send().await {
            Ok(response) if response.status().is_success() => {
                debug!(attempt, "request succeeded");
                return Ok(response);
            }
            Ok(response) => warn!(
                status = %response.status(),
                "got a {} response fetching {} ({}/{})",
                response.status(),
                url,
                attempt,
                max_retries
            ),
            Err(err) => warn!(
                error = %err,
                "request to {} failed ({}/{})",
                url,
                attempt,
                max_retries
            ),
        }
    }

    Err(format!("gave up fetching {} after {} attempts", url, max_retries).into())
}
