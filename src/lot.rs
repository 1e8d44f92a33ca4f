//! Point lot model.
//!
//! A lot is an append-only ledger entry. Earn lots carry depletable
//! `remaining_points`; spend records always carry zero.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Store-assigned lot identity.
///
/// Ids increase in staging order, so `(timestamp, id)` is a stable ordering
/// key for lots that share a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LotId(pub u64);

impl fmt::Display for LotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A lot that has not been assigned an identity yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLot {
    /// Canonical (upper-case) payer name.
    pub payer: String,

    /// Positive for earned points, negative for a spend.
    pub points: i64,

    /// UTC instant of the earn or spend.
    pub timestamp: DateTime<Utc>,

    /// Unspent points still held by this lot.
    pub remaining_points: i64,
}

impl NewLot {
    /// Creates an earn or spend lot with `remaining_points = max(points, 0)`.
    pub fn new(payer: impl Into<String>, points: i64, timestamp: DateTime<Utc>) -> Self {
        NewLot {
            payer: payer.into(),
            points,
            timestamp,
            remaining_points: points.max(0),
        }
    }

    /// Creates a spend record of `taken` points; it never holds depletable
    /// points. `taken` is a non-negative amount drawn from a lot.
    pub fn spend(payer: impl Into<String>, taken: i64, timestamp: DateTime<Utc>) -> Self {
        NewLot {
            payer: payer.into(),
            points: -taken,
            timestamp,
            remaining_points: 0,
        }
    }

    /// Attaches a store-assigned identity.
    pub fn with_id(self, id: LotId) -> Lot {
        Lot {
            id,
            payer: self.payer,
            points: self.points,
            timestamp: self.timestamp,
            remaining_points: self.remaining_points,
        }
    }
}

/// A committed or staged ledger entry.
///
/// # Invariants
///
/// - `remaining_points >= 0`
/// - earn lots: `remaining_points <= points`
/// - spend records: `remaining_points == 0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lot {
    pub id: LotId,
    pub payer: String,
    pub points: i64,
    pub timestamp: DateTime<Utc>,
    pub remaining_points: i64,
}

impl Lot {
    /// Returns `true` once nothing is left to deplete.
    pub fn is_exhausted(&self) -> bool {
        self.remaining_points == 0
    }

    /// Whether `remaining` is a legal value of `remaining_points` for this lot.
    pub fn accepts_remaining(&self, remaining: i64) -> bool {
        remaining >= 0 && remaining <= self.points.max(0)
    }

    /// Verifies the lot invariants.
    pub fn check_invariant(&self) -> bool {
        self.accepts_remaining(self.remaining_points)
    }
}
