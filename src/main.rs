use std::{
    error::Error,
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use insights_export::{
    batch::{
        export_events, insights::InsightsStorage, load_accounts, load_queries, load_vault,
        local::LocalStorage, Batch, Storage, Vault,
    },
    client::{execute_query, MAX_RETRIES},
    config::{Config, InsertConfig},
    normalize, nrql,
    output::{write_csv, write_json, OutputFormat},
    Normalized, Row,
};
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type MainError = Box<dyn Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "insights-export")]
#[command(about = "Run NRQL queries and export their results as flat rows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one query and write its rows to a file or stdout
    Query(QueryOptions),
    /// Run a query file against an accounts list, appending CSV files to a local folder
    BatchLocal {
        #[command(flatten)]
        batch: BatchOptions,
        /// Local output folder, a RUN_<date> folder is created inside it
        #[arg(short, long)]
        output_folder: PathBuf,
    },
    /// Run a query file against an accounts list, posting rows back as custom events
    BatchInsights {
        #[command(flatten)]
        batch: BatchOptions,
        #[arg(short, long, env = "NEW_RELIC_INSERT_ACCOUNT_ID")]
        insert_account_id: String,
        #[arg(short = 'k', long, env = "NEW_RELIC_INSERT_API_KEY", hide_env_values = true)]
        insert_api_key: String,
        #[arg(long, env = "NEW_RELIC_INSERT_ENDPOINT")]
        insert_endpoint: Option<String>,
    },
}

#[derive(Args)]
struct QueryOptions {
    /// NRQL query, or - to read it from stdin
    #[arg(short, long)]
    query: String,
    #[arg(short, long, env = "NEW_RELIC_ACCOUNT_ID")]
    account_id: String,
    #[arg(short = 'k', long, env = "NEW_RELIC_QUERY_API_KEY", hide_env_values = true)]
    query_api_key: String,
    /// Output file name, or - for stdout
    #[arg(short, long, default_value = "-")]
    output_file: String,
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
    output_format: OutputFormat,
    /// Query parameter substituted for {key} placeholders
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,
    #[arg(long, default_value_t = MAX_RETRIES)]
    max_retries: u32,
    #[arg(long, env = "NEW_RELIC_QUERY_ENDPOINT")]
    endpoint: Option<String>,
}

#[derive(Args)]
struct BatchOptions {
    /// YAML list of queries [{name, nrql, secret?}]
    #[arg(short, long)]
    query_file: PathBuf,
    /// CSV accounts list [master_name, account_name, account_id, query_api_key, ...]
    #[arg(short, long)]
    account_file: PathBuf,
    /// YAML vault of named secrets [secret: {account_id, query_api_key}]
    #[arg(short, long)]
    vault_file: Option<PathBuf>,
    /// Only run the accounts under these master names
    #[arg(short, long, num_args = 1..)]
    master_names: Vec<String>,
    #[arg(long, default_value_t = MAX_RETRIES)]
    max_retries: u32,
    #[arg(long, env = "NEW_RELIC_QUERY_ENDPOINT")]
    endpoint: Option<String>,
}

impl BatchOptions {
    fn load(self) -> Result<Batch, MainError> {
        let vault = match &self.vault_file {
            Some(path) => load_vault(path)?,
            None => Vault::new(),
        };
        Ok(Batch {
            queries: load_queries(&self.query_file)?,
            accounts: load_accounts(&self.account_file)?,
            vault,
            master_names: self.master_names,
            max_retries: self.max_retries,
            endpoint: self.endpoint,
        })
    }
}

fn parse_param(param: &str) -> Result<(String, String), String> {
    param
        .split_once('=')
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {}", param))
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match Cli::parse().command {
        Command::Query(options) => query(options).await,
        Command::BatchLocal {
            batch,
            output_folder,
        } => {
            let mut storage = LocalStorage::new(&output_folder, Local::now().naive_local());
            run_batch(batch, &mut storage).await?;
            info!(folder = %storage.folder().display(), "batch written");
            Ok(())
        }
        Command::BatchInsights {
            batch,
            insert_account_id,
            insert_api_key,
            insert_endpoint,
        } => {
            let max_retries = batch.max_retries;
            let config = InsertConfig {
                account_id: insert_account_id,
                insert_api_key,
                endpoint: insert_endpoint,
            };
            let mut storage = InsightsStorage::new(config, Utc::now().timestamp(), max_retries);
            run_batch(batch, &mut storage).await
        }
    }
}

async fn run_batch<S: Storage>(options: BatchOptions, storage: &mut S) -> Result<(), MainError> {
    let batch = options.load()?;
    let summary = export_events(&batch, storage).await;

    info!(
        runs = summary.runs,
        rows = summary.rows,
        empty = summary.empty,
        failed = summary.failed,
        "batch finished"
    );
    if summary.failed > 0 {
        warn!("{} of {} queries failed", summary.failed, summary.runs);
    }
    Ok(())
}

async fn query(options: QueryOptions) -> Result<(), MainError> {
    let config = Config {
        account_id: options.account_id,
        query_api_key: options.query_api_key,
        endpoint: options.endpoint,
    };

    let nrql = if options.query == "-" {
        let mut nrql = String::new();
        io::stdin().read_to_string(&mut nrql)?;
        nrql
    } else {
        options.query
    };
    let params: IndexMap<String, String> = options.params.into_iter().collect();
    let nrql = nrql::substitute(&nrql, &params)?;

    let response = execute_query(&config, &nrql, options.max_retries)
        .instrument(info_span!("execute_query", account_id = %config.account_id))
        .await?;

    let mut include = Row::new();
    include.insert(
        "account_id".to_owned(),
        Value::String(config.account_id.to_owned()),
    );

    let count = match normalize(&response, &include) {
        Normalized::Table { header, rows } => {
            let writer = open_output(&options.output_file)?;
            match options.output_format {
                OutputFormat::Json => write_json(writer, rows)?,
                OutputFormat::Csv => write_csv(writer, &header, rows)?,
            }
        }
        Normalized::Empty(reason) => {
            warn!(%reason, "empty events list returned");
            return Ok(());
        }
    };

    if count == 0 {
        warn!("empty events list returned");
    } else {
        info!(count, format = %options.output_format, "exported rows");
    }

    Ok(())
}

fn open_output(output_file: &str) -> Result<Box<dyn Write>, MainError> {
    Ok(if output_file == "-" {
        Box::new(io::stdout().lock())
    } else {
        Box::new(File::create(Path::new(output_file))?)
    })
}
