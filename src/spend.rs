//! Oldest-first point depletion.
//!
//! The routine is shared by global spends and by payer-scoped spends during
//! ingestion. It only plans the depletion; the caller stages the result in
//! the store, so a shortfall leaves every lot untouched.

use crate::error::{LedgerError, Result};
use crate::lot::{Lot, LotId, NewLot};
use chrono::{DateTime, Utc};
use log::debug;

/// The outcome of a successful depletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Depletion {
    /// New `remaining_points` per touched lot, in depletion order.
    pub updates: Vec<(LotId, i64)>,

    /// One spend record per touched lot, in creation order.
    pub records: Vec<NewLot>,
}

/// Depletes `amount` points from `candidates`, oldest first.
///
/// Candidates must already be ordered ascending by `(timestamp, id)`. Lots
/// with nothing remaining are skipped. Every spend record is stamped `now`.
///
/// Returns [`LedgerError::InsufficientPoints`] when the candidates cannot
/// cover `amount`.
pub fn deplete(candidates: &[Lot], amount: i64, now: DateTime<Utc>) -> Result<Depletion> {
    let mut to_spend = amount;
    let mut depletion = Depletion::default();

    for lot in candidates.iter().filter(|lot| !lot.is_exhausted()) {
        if to_spend == 0 {
            break;
        }

        let taken = lot.remaining_points.min(to_spend);
        to_spend -= taken;
        depletion.updates.push((lot.id, lot.remaining_points - taken));
        depletion.records.push(NewLot::spend(lot.payer.clone(), taken, now));

        debug!(
            "Depleted {} points from lot {} ({}), {} left in lot",
            taken,
            lot.id,
            lot.payer,
            lot.remaining_points - taken
        );
    }

    if to_spend > 0 {
        return Err(LedgerError::InsufficientPoints {
            requested: amount,
            shortfall: to_spend,
        });
    }

    Ok(depletion)
}
