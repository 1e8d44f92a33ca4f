//! Per-payer balance aggregation.

use crate::error::{LedgerError, Result};
use crate::lot::Lot;
use serde::Serialize;
use std::collections::BTreeMap;

/// A payer's total remaining points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayerBalance {
    pub payer: String,
    pub points: i64,
}

/// Sums `remaining_points` per payer.
///
/// Payers whose lots are all exhausted are omitted. Output is sorted by payer
/// name. Fails with [`LedgerError::PointsOverflow`] when a payer's total does
/// not fit in an `i64`.
pub fn aggregate<'a, I>(lots: I) -> Result<Vec<PayerBalance>>
where
    I: IntoIterator<Item = &'a Lot>,
{
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for lot in lots.into_iter().filter(|lot| !lot.is_exhausted()) {
        let total = totals.entry(lot.payer.as_str()).or_insert(0);
        *total = total
            .checked_add(lot.remaining_points)
            .ok_or_else(|| LedgerError::PointsOverflow {
                payer: lot.payer.clone(),
            })?;
    }

    Ok(totals
        .into_iter()
        .map(|(payer, points)| PayerBalance {
            payer: payer.to_string(),
            points,
        })
        .collect())
}
