//! Core rewards ledger engine.
//!
//! Ingests earn/spend instructions in timestamp order, spends points oldest
//! first across all payers and reports per-payer balances. Every mutating
//! operation is a single unit of work against the [`LotStore`]: it either
//! commits completely or leaves the committed ledger untouched.

use crate::balance::{aggregate, PayerBalance};
use crate::error::{LedgerError, Result};
use crate::lot::NewLot;
use crate::spend::{deplete, Depletion};
use crate::store::{LotQuery, LotStore};
use crate::transaction::{SpendRecord, TransactionInstruction, TransactionRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use csv::{ReaderBuilder, Trim};
use log::{debug, info, warn};
use std::io::{Read, Write};
use tokio_util::sync::CancellationToken;

/// Source of the current time for spend records.
pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The rewards ledger engine.
///
/// Owns the store handle. Mutating operations take `&mut self`, so one engine
/// value never runs two of them at once; share an engine between tasks
/// behind a `tokio::sync::Mutex`.
pub struct RewardsEngine<S> {
    store: S,
    clock: Clock,
}

impl<S: LotStore> RewardsEngine<S> {
    /// Creates an engine over `store`, stamping spends with `Utc::now`.
    pub fn new(store: S) -> Self {
        RewardsEngine {
            store,
            clock: Box::new(Utc::now),
        }
    }

    /// Replaces the clock used to timestamp spend records.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds a batch of earn/spend instructions.
    ///
    /// Instructions are applied in ascending timestamp order (stable for
    /// equal timestamps). A negative instruction first depletes the same
    /// payer's lots dated at or before it, oldest first, and is then recorded
    /// as the spend itself. The batch is atomic: on any failure nothing from
    /// it is committed.
    pub async fn add_transactions(
        &mut self,
        instructions: Vec<TransactionInstruction>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for instruction in &instructions {
            instruction.validate()?;
        }

        let mut candidates: Vec<NewLot> = instructions.iter().map(|i| i.normalize()).collect();
        candidates.sort_by_key(|lot| lot.timestamp);
        let count = candidates.len();

        match self.ingest(candidates, cancel).await {
            Ok(()) => {
                info!("Added {} transactions", count);
                Ok(())
            }
            Err(e) => {
                self.store.discard().await;
                warn!("Rejected batch of {} transactions: {}", count, e);
                Err(e)
            }
        }
    }

    async fn ingest(&self, candidates: Vec<NewLot>, cancel: &CancellationToken) -> Result<()> {
        let mut pending = Vec::new();

        for candidate in candidates {
            if candidate.points < 0 {
                // Earlier lots of this batch must be visible to the depletion query
                if !pending.is_empty() {
                    checkpoint(cancel)?;
                    self.store.append_many(std::mem::take(&mut pending)).await?;
                }
                self.spend_for_payer(&candidate, cancel).await?;
            }
            pending.push(candidate);
        }

        checkpoint(cancel)?;
        self.store.append_many(pending).await?;

        // Every payer total must stay representable once the batch lands
        aggregate(&self.store.query(&LotQuery::with_remaining()).await?)?;

        self.store.commit(cancel).await?;
        Ok(())
    }

    /// Realizes a negative instruction against its payer's earlier lots.
    ///
    /// The instruction itself is the spend record, so the records planned by
    /// the depletion are not stored.
    async fn spend_for_payer(&self, spend: &NewLot, cancel: &CancellationToken) -> Result<()> {
        checkpoint(cancel)?;
        let query = LotQuery::with_remaining()
            .payer(spend.payer.clone())
            .until(spend.timestamp);
        let candidates = self.store.query(&query).await?;

        let amount = spend.points.checked_neg().ok_or_else(|| {
            LedgerError::MalformedInput(format!("points out of range for {}", spend.payer))
        })?;
        let depletion = deplete(&candidates, amount, (self.clock)())?;
        self.apply_updates(&depletion).await?;

        debug!(
            "Applied {} points of {} at {} to {} lots",
            spend.points,
            spend.payer,
            spend.timestamp,
            depletion.updates.len()
        );
        Ok(())
    }

    /// Spends `points` from the oldest lots across all payers.
    ///
    /// Returns the spend records created, one per lot touched, in creation
    /// order. Fails with [`LedgerError::InsufficientPoints`] without changing
    /// anything when the ledger holds fewer than `points`.
    pub async fn spend(
        &mut self,
        points: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<SpendRecord>> {
        if points <= 0 {
            return Err(LedgerError::MalformedInput(format!(
                "spend amount must be positive, got {}",
                points
            )));
        }

        match self.spend_oldest(points, cancel).await {
            Ok(records) => {
                info!("Spent {} points across {} lots", points, records.len());
                Ok(records)
            }
            Err(e) => {
                self.store.discard().await;
                warn!("Spend of {} points failed: {}", points, e);
                Err(e)
            }
        }
    }

    async fn spend_oldest(
        &self,
        points: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<SpendRecord>> {
        checkpoint(cancel)?;
        let candidates = self.store.query(&LotQuery::with_remaining()).await?;

        let depletion = deplete(&candidates, points, (self.clock)())?;
        self.apply_updates(&depletion).await?;

        checkpoint(cancel)?;
        let records = self.store.append_many(depletion.records).await?;
        self.store.commit(cancel).await?;

        Ok(records.iter().map(SpendRecord::from).collect())
    }

    async fn apply_updates(&self, depletion: &Depletion) -> Result<()> {
        for &(id, remaining) in &depletion.updates {
            self.store.update_remaining(id, remaining).await?;
        }
        Ok(())
    }

    /// Returns the remaining points of every payer that has any, sorted by
    /// payer.
    pub async fn payer_balances(&self, cancel: &CancellationToken) -> Result<Vec<PayerBalance>> {
        checkpoint(cancel)?;
        let lots = self.store.query(&LotQuery::with_remaining()).await?;
        aggregate(&lots)
    }

    /// Reads a `payer,points,timestamp` CSV and adds it as one batch.
    pub async fn process_csv<R: Read>(
        &mut self,
        reader: R,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let instructions = read_instructions(reader)?;
        self.add_transactions(instructions, cancel).await
    }

    /// Writes payer balances as CSV.
    pub async fn write_balances<W: Write>(
        &self,
        writer: W,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let balances = self.payer_balances(cancel).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["payer", "points"])?;
        for balance in balances {
            csv_writer.write_record([balance.payer, balance.points.to_string()])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}

/// Reads every instruction from a `payer,points,timestamp` CSV.
///
/// Any unreadable row fails the whole read, since the file is applied as a
/// single batch.
pub fn read_instructions<R: Read>(reader: R) -> Result<Vec<TransactionInstruction>> {
    let mut csv_reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut instructions = Vec::new();

    for (row_idx, result) in csv_reader.deserialize::<TransactionRecord>().enumerate() {
        let row = row_idx + 2; // 1-indexed, accounting for header row
        let record = result.map_err(|e| LedgerError::InvalidRecord {
            row,
            message: e.to_string(),
        })?;
        let instruction = record
            .parse()
            .map_err(|message| LedgerError::InvalidRecord { row, message })?;
        instructions.push(instruction);
    }

    debug!("Read {} instructions", instructions.len());
    Ok(instructions)
}

/// Writes spend records as CSV, in the order given.
pub fn write_spend_records<W: Write>(records: &[SpendRecord], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["payer", "points", "timestamp"])?;
    for record in records {
        csv_writer.write_record([
            record.payer.clone(),
            record.points.to_string(),
            record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(LedgerError::Cancelled);
    }
    Ok(())
}
