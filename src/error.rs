//! Error types for the rewards ledger.

use crate::lot::LotId;
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur during ledger operation.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Failed to open or read the input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid transaction record
    #[error("Invalid transaction at row {row}: {message}")]
    InvalidRecord { row: usize, message: String },

    /// Input rejected before it reached the ledger
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Eligible lots could not cover the requested amount
    #[error("Insufficient points: requested {requested}, short by {shortfall}")]
    InsufficientPoints { requested: i64, shortfall: i64 },

    /// A payer's points no longer fit in the ledger's integer range
    #[error("Points overflow for payer {payer}")]
    PointsOverflow { payer: String },

    /// The underlying lot store failed
    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    /// The operation was cancelled before it committed
    #[error("Operation cancelled")]
    Cancelled,

    /// Missing input file argument
    #[error("Missing input file argument. Usage: rewards-ledger <transactions.csv> [--spend <points>]")]
    MissingArgument,

    /// Unrecognized or malformed command line argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors raised by a [`LotStore`](crate::store::LotStore) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown lot {0}")]
    UnknownLot(LotId),

    #[error("remaining points {remaining} out of range for lot {id}")]
    InvalidRemaining { id: LotId, remaining: i64 },

    #[error("store accepted the append but returned no lot")]
    NothingAppended,

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("commit cancelled")]
    Cancelled,
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => LedgerError::Cancelled,
            other => LedgerError::Store(other),
        }
    }
}
