//! Fetch transactions from a validator pool and print them as JSON.
//!
//! Reads a genesis file, connects to one validator, and walks a ledger by
//! ascending sequence number until the fetch limit is reached or the
//! ledger runs out of data:
//!
//!   teller-fetch --genesis pool_transactions_genesis --ledger 0 --limit 10
//!   teller-fetch --genesis pool_transactions_genesis --all
//!
//! Results go to stdout as a JSON array; progress goes to stderr. The
//! first transport or protocol error aborts the run.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use teller::{LedgerId, Pool, PoolConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "teller-fetch",
    about = "Fetch transactions from a validator pool ledger"
)]
struct Args {
    /// Path to the pool genesis transaction file.
    #[arg(long)]
    genesis: PathBuf,

    /// Ledger to read (0 = pool, 1 = domain, 2 = config).
    #[arg(long, default_value_t = 0)]
    ledger: i32,

    /// How many transactions to fetch.
    #[arg(long, default_value_t = 10)]
    limit: u64,

    /// Fetch until the ledger runs out, ignoring --limit.
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let genesis = File::open(&args.genesis)
        .with_context(|| format!("opening genesis file {}", args.genesis.display()))?;
    let pool = Pool::from_genesis(BufReader::new(genesis), PoolConfig::default())?;
    tracing::info!(validators = pool.validators().len(), "Pool loaded");

    let ledger = LedgerId(args.ledger);
    let mut results: Vec<Value> = Vec::new();

    for seq_no in 1u64.. {
        if !args.all && seq_no > args.limit {
            break;
        }

        tracing::info!(seq_no, "Fetching transaction");
        let reply = pool.get_transaction(ledger, seq_no).await?;

        if reply.transaction_data().is_none() {
            tracing::info!(seq_no, "Reached the end of the ledger");
            break;
        }
        results.push(reply.result.unwrap_or(Value::Null));
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
