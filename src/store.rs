//! Lot storage boundary.
//!
//! The ledger talks to storage through [`LotStore`]: ordered, filtered reads
//! plus a unit of work of staged appends and `remaining_points` updates that
//! is published atomically by [`LotStore::commit`].

use crate::error::StoreError;
use crate::lot::{Lot, LotId, NewLot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Filter for [`LotStore::query`]. Results are always ordered ascending by
/// `(timestamp, id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotQuery {
    /// Only lots of this canonical payer.
    pub payer: Option<String>,

    /// Only lots with `timestamp <= until`.
    pub until: Option<DateTime<Utc>>,

    /// Only lots with `remaining_points != 0`.
    pub with_remaining: bool,
}

impl LotQuery {
    /// Every lot in the ledger.
    pub fn all() -> Self {
        Self::default()
    }

    /// Lots that still hold points, across all payers.
    pub fn with_remaining() -> Self {
        LotQuery {
            with_remaining: true,
            ..Self::default()
        }
    }

    pub fn payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Whether `lot` passes this filter.
    pub fn matches(&self, lot: &Lot) -> bool {
        if self.with_remaining && lot.remaining_points == 0 {
            return false;
        }
        if let Some(payer) = &self.payer {
            if &lot.payer != payer {
                return false;
            }
        }
        if let Some(until) = self.until {
            if lot.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Storage capabilities the ledger requires.
///
/// Reads observe staged writes of the current unit of work. Nothing staged
/// is visible to other holders of the store until [`commit`](Self::commit)
/// succeeds, and [`discard`](Self::discard) drops it entirely.
#[async_trait]
pub trait LotStore: Send + Sync {
    /// Returns matching lots ordered ascending by `(timestamp, id)`.
    async fn query(&self, query: &LotQuery) -> StoreResult<Vec<Lot>>;

    /// Stages new lots and returns them with their assigned ids, in order.
    async fn append_many(&self, lots: Vec<NewLot>) -> StoreResult<Vec<Lot>>;

    /// Stages a single new lot.
    async fn append(&self, lot: NewLot) -> StoreResult<Lot> {
        let mut appended = self.append_many(vec![lot]).await?;
        appended.pop().ok_or(StoreError::NothingAppended)
    }

    /// Stages an in-place update of a lot's `remaining_points`.
    async fn update_remaining(&self, id: LotId, remaining: i64) -> StoreResult<()>;

    /// Atomically publishes every staged write.
    ///
    /// A cancelled token discards the staged writes and returns
    /// [`StoreError::Cancelled`]; any other failure leaves committed state
    /// untouched.
    async fn commit(&self, cancel: &CancellationToken) -> StoreResult<()>;

    /// Drops every staged write.
    async fn discard(&self);
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Committed arena, indexed by `id - 1`.
    committed: Vec<Lot>,

    /// Committed arena plus staged writes.
    working: Vec<Lot>,

    dirty: bool,
    fail_next_commit: bool,
}

/// In-memory [`LotStore`] backed by an arena of lots.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail with [`StoreError::CommitFailed`].
    pub async fn set_fail_next_commit(&self, fail: bool) {
        self.state.lock().await.fail_next_commit = fail;
    }

    /// Number of committed lots.
    pub async fn committed_len(&self) -> usize {
        self.state.lock().await.committed.len()
    }

    /// Snapshot of the committed lots in id order.
    pub async fn committed_lots(&self) -> Vec<Lot> {
        self.state.lock().await.committed.clone()
    }
}

fn slot(id: LotId) -> Option<usize> {
    usize::try_from(id.0).ok()?.checked_sub(1)
}

#[async_trait]
impl LotStore for MemoryStore {
    async fn query(&self, query: &LotQuery) -> StoreResult<Vec<Lot>> {
        let state = self.state.lock().await;
        let mut lots: Vec<Lot> = state
            .working
            .iter()
            .filter(|lot| query.matches(lot))
            .cloned()
            .collect();
        lots.sort_by_key(|lot| (lot.timestamp, lot.id));
        Ok(lots)
    }

    async fn append_many(&self, lots: Vec<NewLot>) -> StoreResult<Vec<Lot>> {
        let mut state = self.state.lock().await;
        let mut appended = Vec::with_capacity(lots.len());
        for lot in lots {
            let id = LotId(state.working.len() as u64 + 1);
            let lot = lot.with_id(id);
            if !lot.check_invariant() {
                return Err(StoreError::InvalidRemaining {
                    id,
                    remaining: lot.remaining_points,
                });
            }
            state.working.push(lot.clone());
            appended.push(lot);
        }
        state.dirty |= !appended.is_empty();
        Ok(appended)
    }

    async fn update_remaining(&self, id: LotId, remaining: i64) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let lot = slot(id)
            .and_then(|idx| state.working.get_mut(idx))
            .ok_or(StoreError::UnknownLot(id))?;
        if !lot.accepts_remaining(remaining) {
            return Err(StoreError::InvalidRemaining { id, remaining });
        }
        lot.remaining_points = remaining;
        state.dirty = true;
        Ok(())
    }

    async fn commit(&self, cancel: &CancellationToken) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if cancel.is_cancelled() {
            state.working = state.committed.clone();
            state.dirty = false;
            return Err(StoreError::Cancelled);
        }
        if std::mem::take(&mut state.fail_next_commit) {
            return Err(StoreError::CommitFailed("injected failure".to_string()));
        }
        if state.dirty {
            state.committed = state.working.clone();
            state.dirty = false;
            debug!("Committed ledger with {} lots", state.committed.len());
        }
        Ok(())
    }

    async fn discard(&self) {
        let mut state = self.state.lock().await;
        if state.dirty {
            debug!(
                "Discarding {} staged lots",
                state.working.len() - state.committed.len()
            );
        }
        state.working = state.committed.clone();
        state.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 10, day, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let lots = store
            .append_many(vec![
                NewLot::new("DANNON", 100, at(31, 10)),
                NewLot::new("UNILEVER", 200, at(31, 11)),
            ])
            .await
            .unwrap();
        assert_eq!(lots[0].id, LotId(1));
        assert_eq!(lots[1].id, LotId(2));

        let single = store.append(NewLot::new("DANNON", 5, at(31, 12))).await.unwrap();
        assert_eq!(single.id, LotId(3));
    }

    #[tokio::test]
    async fn test_query_orders_by_timestamp_then_id() {
        let store = MemoryStore::new();
        store
            .append_many(vec![
                NewLot::new("B", 1, at(31, 12)),
                NewLot::new("A", 1, at(31, 10)),
                NewLot::new("C", 1, at(31, 12)),
            ])
            .await
            .unwrap();

        let payers: Vec<String> = store
            .query(&LotQuery::all())
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.payer)
            .collect();
        assert_eq!(payers, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_query_filters() {
        let store = MemoryStore::new();
        store
            .append_many(vec![
                NewLot::new("DANNON", 300, at(30, 10)),
                NewLot::new("DANNON", -200, at(30, 11)),
                NewLot::new("DANNON", 1000, at(31, 10)),
                NewLot::new("UNILEVER", 200, at(30, 9)),
            ])
            .await
            .unwrap();

        let lots = store
            .query(&LotQuery::with_remaining().payer("DANNON").until(at(30, 23)))
            .await
            .unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].points, 300);

        let lots = store.query(&LotQuery::with_remaining()).await.unwrap();
        assert_eq!(lots.len(), 3);
    }

    #[tokio::test]
    async fn test_discard_drops_staged_writes() {
        let store = MemoryStore::new();
        store.append(NewLot::new("DANNON", 100, at(31, 10))).await.unwrap();
        store.commit(&CancellationToken::new()).await.unwrap();

        store.append(NewLot::new("DANNON", 50, at(31, 11))).await.unwrap();
        store.update_remaining(LotId(1), 40).await.unwrap();
        store.discard().await;

        let lots = store.query(&LotQuery::all()).await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].remaining_points, 100);
    }

    #[tokio::test]
    async fn test_update_rejects_out_of_range() {
        let store = MemoryStore::new();
        store.append(NewLot::new("DANNON", 100, at(31, 10))).await.unwrap();

        assert_eq!(
            store.update_remaining(LotId(1), 101).await,
            Err(StoreError::InvalidRemaining {
                id: LotId(1),
                remaining: 101
            })
        );
        assert_eq!(
            store.update_remaining(LotId(1), -1).await,
            Err(StoreError::InvalidRemaining {
                id: LotId(1),
                remaining: -1
            })
        );
        assert_eq!(
            store.update_remaining(LotId(9), 0).await,
            Err(StoreError::UnknownLot(LotId(9)))
        );
        assert_eq!(
            store.update_remaining(LotId(0), 0).await,
            Err(StoreError::UnknownLot(LotId(0)))
        );
    }

    /// Accepts every write and keeps none of it.
    struct SinkStore;

    #[async_trait]
    impl LotStore for SinkStore {
        async fn query(&self, _query: &LotQuery) -> StoreResult<Vec<Lot>> {
            Ok(Vec::new())
        }

        async fn append_many(&self, _lots: Vec<NewLot>) -> StoreResult<Vec<Lot>> {
            Ok(Vec::new())
        }

        async fn update_remaining(&self, _id: LotId, _remaining: i64) -> StoreResult<()> {
            Ok(())
        }

        async fn commit(&self, _cancel: &CancellationToken) -> StoreResult<()> {
            Ok(())
        }

        async fn discard(&self) {}
    }

    #[tokio::test]
    async fn test_append_without_returned_lot_is_an_error() {
        let err = SinkStore
            .append(NewLot::new("DANNON", 100, at(31, 10)))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NothingAppended);
    }

    #[tokio::test]
    async fn test_cancelled_commit_discards() {
        let store = MemoryStore::new();
        store.append(NewLot::new("DANNON", 100, at(31, 10))).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(store.commit(&cancel).await, Err(StoreError::Cancelled));
        assert_eq!(store.committed_len().await, 0);
        assert!(store.query(&LotQuery::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_commit_failure_keeps_committed_state() {
        let store = MemoryStore::new();
        store.append(NewLot::new("DANNON", 100, at(31, 10))).await.unwrap();
        store.set_fail_next_commit(true).await;

        assert!(matches!(
            store.commit(&CancellationToken::new()).await,
            Err(StoreError::CommitFailed(_))
        ));
        assert_eq!(store.committed_len().await, 0);

        store.commit(&CancellationToken::new()).await.unwrap();
        assert_eq!(store.committed_len().await, 1);
    }
}
