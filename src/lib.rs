//! # Rewards Ledger
//!
//! A loyalty points ledger that tracks points earned from many payers and
//! spent by a single account holder.
//!
//! ## Design Principles
//!
//! - **Oldest points first**: spends deplete lots in ascending timestamp
//!   order across all payers, ties broken by ingestion order
//! - **Append-only ledger**: lots are never deleted or re-timestamped; only
//!   `remaining_points` of earn lots changes
//! - **All-or-nothing**: every mutating operation commits completely or not
//!   at all, including on cancellation
//! - **Explicit store handle**: the engine owns its [`LotStore`]; there is no
//!   global state
//!
//! ## Example
//!
//! ```no_run
//! use rewards_ledger::{MemoryStore, RewardsEngine};
//! use std::io::Cursor;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> rewards_ledger::Result<()> {
//! let csv = "payer,points,timestamp\nDANNON,1000,2020-11-02T14:00:00Z\n";
//! let cancel = CancellationToken::new();
//! let mut engine = RewardsEngine::new(MemoryStore::new());
//! engine.process_csv(Cursor::new(csv), &cancel).await?;
//! let _spent = engine.spend(250, &cancel).await?;
//! engine.write_balances(std::io::stdout(), &cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod balance;
pub mod engine;
pub mod error;
pub mod lot;
pub mod spend;
pub mod store;
pub mod transaction;

pub use balance::PayerBalance;
pub use engine::{read_instructions, write_spend_records, RewardsEngine};
pub use error::{LedgerError, Result, StoreError};
pub use lot::{Lot, LotId, NewLot};
pub use store::{LotQuery, LotStore, MemoryStore};
pub use transaction::{SpendRecord, TransactionInstruction, TransactionRecord};
