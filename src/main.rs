//! Rewards Ledger CLI
//!
//! Loads a batch of earn/spend instructions from CSV, optionally spends
//! points, and prints the resulting spend records and payer balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- transactions.csv --spend 5000 > result.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity

use rewards_ledger::{write_spend_records, LedgerError, MemoryStore, Result, RewardsEngine};
use std::env;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::process;
use tokio_util::sync::CancellationToken;

#[derive(Debug, PartialEq, Eq)]
struct Args {
    input_path: String,
    spend: Option<i64>,
}

impl Args {
    fn parse(args: &[String]) -> Result<Self> {
        let mut input_path = None;
        let mut spend = None;
        let mut iter = args.iter().skip(1);

        while let Some(arg) = iter.next() {
            if arg == "--spend" {
                let value = iter.next().ok_or_else(|| {
                    LedgerError::InvalidArgument("--spend requires a value".into())
                })?;
                let points = value.parse::<i64>().map_err(|_| {
                    LedgerError::InvalidArgument(format!(
                        "--spend expects whole points, got '{}'",
                        value
                    ))
                })?;
                spend = Some(points);
            } else if arg.starts_with("--") {
                return Err(LedgerError::InvalidArgument(format!("unknown option '{}'", arg)));
            } else if input_path.is_none() {
                input_path = Some(arg.clone());
            } else {
                return Err(LedgerError::InvalidArgument(format!("unexpected argument '{}'", arg)));
            }
        }

        Ok(Args {
            input_path: input_path.ok_or(LedgerError::MissingArgument)?,
            spend,
        })
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let args = Args::parse(&args)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let file = File::open(&args.input_path)?;
    let reader = BufReader::new(file);

    let mut engine = RewardsEngine::new(MemoryStore::new());
    engine.process_csv(reader, &cancel).await?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    if let Some(points) = args.spend {
        let records = engine.spend(points, &cancel).await?;
        write_spend_records(&records, &mut handle)?;
        writeln!(handle)?;
    }

    engine.write_balances(&mut handle, &cancel).await?;

    Ok(())
}
