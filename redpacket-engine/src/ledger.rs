//! Balance ledger.
//!
//! Every balance change goes through a [`LedgerTx`] inside the caller's
//! transaction and is paired with exactly one appended [`LedgerEntry`] whose
//! `balance_after` is the balance observed by that same change.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{Amount, Direction, EntryKind, LedgerEntry, NewLedgerEntry};

/// Balance mutations scoped to one open transaction.
#[async_trait]
pub trait LedgerTx: Send {
    /// Decrement `account` by `amount` if and only if the balance covers it.
    ///
    /// Implemented as one conditional update, never read-then-write.
    /// Returns the balance after the debit, or `InsufficientFunds` with no
    /// mutation (a missing account reads as insufficient).
    async fn withdraw(&mut self, account: Uuid, amount: Amount) -> Result<Amount>;

    /// Increment `account` by `amount`. Returns the balance after the credit.
    async fn deposit(&mut self, account: Uuid, amount: Amount) -> Result<Amount>;

    /// Append one ledger entry.
    async fn record(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry>;
}

impl NewLedgerEntry {
    pub fn incoming(
        account_id: Uuid,
        kind: EntryKind,
        amount: Amount,
        balance_after: Amount,
        related_packet_id: Option<Uuid>,
        remark: &str,
    ) -> Self {
        Self {
            account_id,
            kind,
            direction: Direction::In,
            amount,
            balance_after,
            related_packet_id,
            remark: remark.to_string(),
        }
    }

    pub fn outgoing(
        account_id: Uuid,
        kind: EntryKind,
        amount: Amount,
        balance_after: Amount,
        related_packet_id: Option<Uuid>,
        remark: &str,
    ) -> Self {
        Self {
            account_id,
            kind,
            direction: Direction::Out,
            amount,
            balance_after,
            related_packet_id,
            remark: remark.to_string(),
        }
    }
}

/// Deposit and log the matching incoming entry.
pub async fn credit<T>(
    tx: &mut T,
    account: Uuid,
    amount: Amount,
    kind: EntryKind,
    related_packet_id: Option<Uuid>,
    remark: &str,
) -> Result<LedgerEntry>
where
    T: LedgerTx + ?Sized,
{
    let balance_after = tx.deposit(account, amount).await?;
    tx.record(NewLedgerEntry::incoming(
        account,
        kind,
        amount,
        balance_after,
        related_packet_id,
        remark,
    ))
    .await
}
