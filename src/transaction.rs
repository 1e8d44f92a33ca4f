//! Transaction models for CSV parsing and the ledger boundary.

use crate::error::{LedgerError, Result};
use crate::lot::{Lot, NewLot};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Offset-less layouts accepted in addition to RFC 3339; they are read as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Raw transaction record as read from CSV.
///
/// Every column is read as text so that a bad row can be reported with its
/// row number instead of aborting the reader.
#[derive(Debug, Deserialize)]
pub struct TransactionRecord {
    /// Payer name, any case
    pub payer: String,

    /// Signed whole points
    pub points: String,

    /// ISO-8601 datetime, with or without offset
    pub timestamp: String,
}

impl TransactionRecord {
    /// Parses the raw CSV record into a typed instruction.
    pub fn parse(&self) -> std::result::Result<TransactionInstruction, String> {
        let points = self
            .points
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid points '{}': {}", self.points.trim(), e))?;
        let timestamp = parse_timestamp(&self.timestamp)
            .map_err(|e| format!("invalid timestamp '{}': {}", self.timestamp.trim(), e))?;

        Ok(TransactionInstruction {
            payer: self.payer.trim().to_string(),
            points,
            timestamp,
        })
    }
}

/// Parses an ISO-8601 datetime. Inputs without an offset are taken as UTC.
pub fn parse_timestamp(
    raw: &str,
) -> std::result::Result<DateTime<FixedOffset>, chrono::ParseError> {
    let trimmed = raw.trim();
    match DateTime::parse_from_rfc3339(trimmed) {
        Ok(ts) => Ok(ts),
        Err(rfc_err) => NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
            .ok_or(rfc_err),
    }
}

/// An earn (positive) or spend (negative) instruction submitted for ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionInstruction {
    pub payer: String,
    pub points: i64,
    pub timestamp: DateTime<FixedOffset>,
}

impl TransactionInstruction {
    pub fn new(payer: impl Into<String>, points: i64, timestamp: DateTime<FixedOffset>) -> Self {
        TransactionInstruction {
            payer: payer.into(),
            points,
            timestamp,
        }
    }

    /// Rejects instructions the ledger cannot accept.
    pub fn validate(&self) -> Result<()> {
        if self.payer.trim().is_empty() {
            return Err(LedgerError::MalformedInput(format!(
                "payer is empty for instruction at {}",
                self.timestamp
            )));
        }
        if self.points == i64::MIN {
            return Err(LedgerError::MalformedInput(format!(
                "points out of range for {} at {}",
                self.payer.trim(),
                self.timestamp
            )));
        }
        Ok(())
    }

    /// Converts the instruction into a candidate lot.
    ///
    /// Pure: payer is trimmed and upper-cased, the timestamp moves to UTC and
    /// `remaining_points` starts at `max(points, 0)`.
    pub fn normalize(&self) -> NewLot {
        NewLot::new(
            self.payer.trim().to_uppercase(),
            self.points,
            self.timestamp.with_timezone(&Utc),
        )
    }
}

/// A spend record returned to the caller of a spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpendRecord {
    pub payer: String,
    pub points: i64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Lot> for SpendRecord {
    fn from(lot: &Lot) -> Self {
        SpendRecord {
            payer: lot.payer.clone(),
            points: lot.points,
            timestamp: lot.timestamp,
        }
    }
}
