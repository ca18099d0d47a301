use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

const DEFAULT_ENDPOINT: &str = "https://insights-api.newrelic.com/v1/accounts";
const DEFAULT_INSERT_ENDPOINT: &str = "https://insights-collector.newrelic.com/v1/accounts";

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The account the queries run against
    pub account_id: String,
    /// The Insights query API key for that account
    pub query_api_key: String,
    /// Optional override for the accounts endpoint, without the account id
    pub endpoint: Option<String>,
}

impl Config {
    /// The query url for the configured account.
    pub fn query_url(&self) -> String {
        let endpoint = self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        format!("{}/{}/query", trim_slash(endpoint), self.account_id)
    }
}

/// Where exported rows are posted back as custom events.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertConfig {
    pub account_id: String,
    /// The Insights insert API key for that account
    pub insert_api_key: String,
    pub endpoint: Option<String>,
}

impl InsertConfig {
    pub fn events_url(&self) -> String {
        let endpoint = self.endpoint.as_deref().unwrap_or(DEFAULT_INSERT_ENDPOINT);
        format!("{}/{}/events", trim_slash(endpoint), self.account_id)
    }
}

fn trim_slash(endpoint: &str) -> &str {
    endpoint.strip_suffix('/').unwrap_or(endpoint)
}
