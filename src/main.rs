//! keydeck - command-line front end.
//!
//! One subcommand per accessor operation. Results are printed to stdout as
//! JSON; logs go to stderr and are filtered with `RUST_LOG`.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use keydeck::store::RespStore;
use keydeck::{AccessorConfig, CreateKeyRequest, KeyAccessor, StoreConfig, WriteRequest};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Largest page the listing command will request.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Parser)]
#[command(name = "keydeck")]
#[command(about = "Browse, write, expire and delete keys in a Redis-compatible store")]
#[command(version)]
struct Cli {
    /// Server address (host:port)
    #[arg(long, env = "KEYDECK_ENDPOINT", default_value = "127.0.0.1:6379")]
    endpoint: String,

    /// Password sent with AUTH
    #[arg(long, env = "KEYDECK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Logical database number
    #[arg(long, env = "KEYDECK_DB", default_value = "0")]
    db: u32,

    /// Per-call timeout in milliseconds
    #[arg(long, env = "KEYDECK_TIMEOUT_MS", default_value = "5000")]
    timeout_ms: u64,

    /// Maximum concurrent lookups while listing
    #[arg(long, env = "KEYDECK_FANOUT", default_value = "16")]
    fanout: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe a single key
    Get {
        key: String,
    },

    /// List keys matching a glob pattern, one page at a time
    List {
        /// Glob pattern
        #[arg(default_value = "*")]
        pattern: String,

        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,

        /// Keys per page (at most 100)
        #[arg(long, default_value = "20")]
        page_size: usize,
    },

    /// Write a value, inferring its shape from JSON
    ///
    /// Numbers, booleans, arrays, objects and null are read as JSON; anything
    /// that does not parse is stored as text.
    Write {
        key: String,

        value: String,

        /// Seconds until expiry (0 = none)
        #[arg(long, allow_negative_numbers = true)]
        ttl: Option<i64>,
    },

    /// Write a value with a declared shape, from a JSON request body
    Create {
        /// e.g. '{"key":"tags","dataType":"Set","setValues":["a","b"]}'
        body: String,
    },

    /// Set (seconds > 0) or clear (seconds <= 0) a key's expiry
    Ttl {
        key: String,

        #[arg(allow_negative_numbers = true)]
        seconds: i64,
    },

    /// Delete a single key
    Delete {
        key: String,
    },

    /// Delete every key matching a pattern
    DeletePattern {
        pattern: String,

        /// Required to delete with the match-everything pattern '*'
        #[arg(long)]
        force: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Changed<'a> {
    key: &'a str,
    changed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Deleted<'a> {
    pattern: &'a str,
    deleted: u64,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keydeck=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Refuse before connecting
    if let Commands::DeletePattern { pattern, force } = &cli.command {
        if pattern == "*" && !force {
            bail!("refusing to delete every key; pass --force to confirm");
        }
    }

    let store_config = StoreConfig {
        endpoint: cli.endpoint.clone(),
        password: cli.password.clone(),
        database: cli.db,
        ..Default::default()
    };
    let store = RespStore::connect(store_config)
        .await
        .with_context(|| format!("could not connect to {}", cli.endpoint))?;
    debug!(endpoint = %cli.endpoint, db = cli.db, "Connected");

    let config = AccessorConfig::default()
        .with_call_timeout(Duration::from_millis(cli.timeout_ms))
        .with_fanout_limit(cli.fanout);
    let accessor = KeyAccessor::with_config(Arc::new(store), config);

    match cli.command {
        Commands::Get { key } => print_json(&accessor.resolve(&key).await?)?,

        Commands::List {
            pattern,
            page,
            page_size,
        } => {
            let page_size = page_size.min(MAX_PAGE_SIZE);
            print_json(&accessor.list_by_pattern(&pattern, page, page_size).await?)?
        }

        Commands::Write { key, value, ttl } => {
            let json = serde_json::from_str(&value)
                .unwrap_or(serde_json::Value::String(value));
            let request = WriteRequest::infer(key, json, ttl)?;
            print_json(&accessor.write(request).await?)?
        }

        Commands::Create { body } => {
            let request: CreateKeyRequest =
                serde_json::from_str(&body).context("invalid request body")?;
            let request = WriteRequest::try_from(request)?;
            print_json(&accessor.write(request).await?)?
        }

        Commands::Ttl { key, seconds } => {
            let changed = accessor.set_or_clear_ttl(&key, seconds).await?;
            print_json(&Changed { key: &key, changed })?
        }

        Commands::Delete { key } => {
            let changed = accessor.delete_key(&key).await?;
            print_json(&Changed { key: &key, changed })?
        }

        Commands::DeletePattern { pattern, .. } => {
            let deleted = accessor.delete_by_pattern(&pattern).await?;
            print_json(&Deleted {
                pattern: &pattern,
                deleted,
            })?
        }
    }

    Ok(())
}
