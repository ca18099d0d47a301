//! Runs every query of a query file against every account of an accounts list and
//! hands the normalized rows to a [`Storage`].
//!
//! A query that fails or comes back without rows is logged and skipped, the rest of
//! the batch keeps going.

use std::{error::Error, fs, path::Path};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    client::execute_query,
    config::Config,
    normalize::{normalize, Header, Normalized, Row, Rows},
    nrql,
};

mod error;
pub mod insights;
pub mod local;

pub use error::BatchError;

pub type DumpError = Box<dyn Error + Send + Sync>;

/// Columns every accounts list must carry.
pub const ACCOUNT_COLUMNS: [&str; 4] = ["master_name", "account_name", "account_id", "query_api_key"];

/// Where the rows of each query run end up.
#[async_trait]
pub trait Storage: Send {
    /// Stores the rows one query produced for one account, returning how many were kept.
    async fn dump(
        &mut self,
        master_name: &str,
        query_name: &str,
        header: &Header,
        rows: Rows<'_>,
    ) -> Result<usize, DumpError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Query {
    pub name: String,
    pub nrql: String,
    /// vault entry whose credentials replace the account's own
    pub secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Secret {
    #[serde(deserialize_with = "text_or_number")]
    pub account_id: String,
    pub query_api_key: String,
}

pub type Vault = IndexMap<String, Secret>;

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrNumber {
        Text(String),
        Number(i64),
    }

    Ok(match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Text(text) => text,
        TextOrNumber::Number(number) => number.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub master_name: String,
    pub account_name: String,
    pub account_id: String,
    pub query_api_key: String,
    /// Every column whose name does not mention a key, merged into each row and
    /// offered as query parameters.
    pub metadata: IndexMap<String, String>,
}

impl Account {
    fn from_fields(fields: IndexMap<String, String>) -> Self {
        let field = |name: &str| fields.get(name).cloned().unwrap_or_default();
        Account {
            master_name: field("master_name"),
            account_name: field("account_name"),
            account_id: field("account_id"),
            query_api_key: field("query_api_key"),
            metadata: fields
                .iter()
                .filter(|(name, _)| !name.contains("key"))
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
        }
    }

    fn include(&self) -> Row {
        self.metadata
            .iter()
            .map(|(name, value)| (name.to_owned(), Value::String(value.to_owned())))
            .collect()
    }
}

fn read(path: &Path) -> Result<String, BatchError> {
    fs::read_to_string(path).map_err(|err| BatchError::Open(path.to_owned(), err.to_string()))
}

pub fn load_queries(path: &Path) -> Result<Vec<Query>, BatchError> {
    serde_yaml::from_str(&read(path)?)
        .map_err(|err| BatchError::Parse(path.to_owned(), err.to_string()))
}

pub fn load_vault(path: &Path) -> Result<Vault, BatchError> {
    serde_yaml::from_str(&read(path)?)
        .map_err(|err| BatchError::Parse(path.to_owned(), err.to_string()))
}

pub fn load_accounts(path: &Path) -> Result<Vec<Account>, BatchError> {
    parse_accounts(&read(path)?)
}

pub fn parse_accounts(text: &str) -> Result<Vec<Account>, BatchError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|err| BatchError::Accounts(err.to_string()))?
        .clone();

    if let Some(missing) = ACCOUNT_COLUMNS
        .iter()
        .find(|column| !headers.iter().any(|header| header == **column))
    {
        return Err(BatchError::MissingColumn(missing.to_string()));
    }

    reader
        .records()
        .map(|record| {
            let record = record.map_err(|err| BatchError::Accounts(err.to_string()))?;
            let fields = headers
                .iter()
                .zip(record.iter())
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect();
            Ok(Account::from_fields(fields))
        })
        .collect()
}

/// Everything one batch run needs.
#[derive(Debug, Clone)]
pub struct Batch {
    pub queries: Vec<Query>,
    pub accounts: Vec<Account>,
    pub vault: Vault,
    /// only accounts under these master names run; every account when empty
    pub master_names: Vec<String>,
    pub max_retries: u32,
    pub endpoint: Option<String>,
}

impl Batch {
    fn selected(&self) -> Vec<&Account> {
        self.accounts
            .iter()
            .filter(|account| {
                self.master_names.is_empty() || self.master_names.contains(&account.master_name)
            })
            .collect()
    }

    /// The query's vault secret when it names one the vault holds, else the account's own.
    fn credentials(&self, query: &Query, account: &Account) -> Config {
        let secret = query.secret.as_ref().and_then(|name| {
            let secret = self.vault.get(name);
            if secret.is_none() {
                warn!("cannot find secret {} in vault, using the account key", name);
            }
            secret
        });

        match secret {
            Some(secret) => Config {
                account_id: secret.account_id.to_owned(),
                query_api_key: secret.query_api_key.to_owned(),
                endpoint: self.endpoint.clone(),
            },
            None => Config {
                account_id: account.account_id.to_owned(),
                query_api_key: account.query_api_key.to_owned(),
                endpoint: self.endpoint.clone(),
            },
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub runs: usize,
    pub rows: usize,
    pub empty: usize,
    pub failed: usize,
}

pub async fn export_events<S: Storage>(batch: &Batch, storage: &mut S) -> Summary {
    let accounts = batch.selected();
    let mut summary = Summary::default();

    for (account_index, account) in accounts.iter().enumerate() {
        let include = account.include();

        for (query_index, query) in batch.queries.iter().enumerate() {
            let config = batch.credentials(query, account);
            info!(
                "account {}/{}: {} - {}, query {}/{}: {}",
                account_index + 1,
                accounts.len(),
                config.account_id,
                account.account_name,
                query_index + 1,
                batch.queries.len(),
                query.name
            );

            summary.runs += 1;
            let span = info_span!("export", master = %account.master_name, query = %query.name);
            match run(batch, storage, account, query, &config, &include)
                .instrument(span)
                .await
            {
                Ok(Some(count)) => summary.rows += count,
                Ok(None) => summary.empty += 1,
                Err(err) => {
                    summary.failed += 1;
                    error!(error = %err, "query {} failed for account {}", query.name, config.account_id);
                }
            }
        }
    }

    summary
}

/// `None` when the response normalized to nothing.
async fn run<S: Storage>(
    batch: &Batch,
    storage: &mut S,
    account: &Account,
    query: &Query,
    config: &Config,
    include: &Row,
) -> Result<Option<usize>, DumpError> {
    let nrql = nrql::substitute(&query.nrql, &account.metadata)?;
    let response = execute_query(config, &nrql, batch.max_retries).await?;

    let result = match normalize(&response, include) {
        Normalized::Table { header, rows } => {
            let count = storage
                .dump(&account.master_name, &query.name, &header, rows)
                .await?;
            Ok(Some(count))
        }
        Normalized::Empty(reason) => {
            warn!(%reason, "empty events list returned");
            Ok(None)
        }
    };
    result
}
