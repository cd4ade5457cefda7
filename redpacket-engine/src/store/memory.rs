//! In-process store.
//!
//! Committed state sits behind a single `RwLock`, so a commit becomes visible
//! all at once. Every account and packet row also owns an async mutex: a
//! transaction takes it the first time it touches the row and holds it until
//! commit or drop, which blocks concurrent writers the way PostgreSQL row
//! locks do. Writes are staged inside the transaction and only applied on
//! commit. A row's mutex is dropped from the lock table once the last
//! transaction holding or waiting on it ends.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::errors::{RedPacketError, Result};
use crate::ledger::LedgerTx;
use crate::models::{
    Account, Amount, ClaimItem, ClaimRecord, LedgerEntry, NewClaim, NewLedgerEntry,
    NewRedPacket, PacketStatus, ReceivedItem, RedPacket, Window,
};
use crate::packet_store::PacketTx;

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    packets: HashMap<Uuid, RedPacket>,
    claims: Vec<ClaimRecord>,
    entries: Vec<LedgerEntry>,
}

impl Tables {
    fn username(&self, id: &Uuid) -> String {
        self.accounts
            .get(id)
            .map(|a| a.username.clone())
            .unwrap_or_default()
    }

    fn has_claim(&self, packet_id: Uuid, receiver_id: Uuid) -> bool {
        self.claims
            .iter()
            .any(|c| c.packet_id == packet_id && c.receiver_id == receiver_id)
    }
}

#[derive(Default)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<Uuid, Arc<RowLock<()>>>>,
}

impl Shared {
    fn row_lock(&self, id: Uuid) -> Arc<RowLock<()>> {
        self.row_locks
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(RowLock::new(())))
            .clone()
    }
}

/// Store kept entirely in process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a balance directly, bypassing the ledger
    #[cfg(test)]
    pub(crate) fn seed_balance(&self, account: Uuid, balance: Amount) {
        if let Some(a) = self.shared.tables.write().accounts.get_mut(&account) {
            a.balance = balance;
        }
    }

    /// Replace a committed packet row, bypassing the coordinators
    #[cfg(test)]
    pub(crate) fn overwrite_packet(&self, packet: RedPacket) {
        self.shared.tables.write().packets.insert(packet.id, packet);
    }
}

fn paginate<T>(items: Vec<T>, window: Window) -> Vec<T> {
    let offset = usize::try_from(window.offset).unwrap_or(0);
    let limit = usize::try_from(window.limit).unwrap_or(0);
    items.into_iter().skip(offset).take(limit).collect()
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        Ok(MemoryTx {
            shared: self.shared.clone(),
            held: HashMap::new(),
            balances: HashMap::new(),
            packets: HashMap::new(),
            claims: Vec::new(),
            entries: Vec::new(),
        })
    }

    async fn create_account(&self, username: &str) -> Result<Account> {
        let mut tables = self.shared.tables.write();
        if tables.accounts.values().any(|a| a.username == username) {
            return Err(RedPacketError::Validation(format!(
                "username already exists: {username}"
            )));
        }

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            username: username.to_string(),
            balance: 0,
            created_at: now,
            updated_at: now,
        };
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.shared.tables.read().accounts.get(&id).cloned())
    }

    async fn get_packet(&self, id: Uuid) -> Result<Option<RedPacket>> {
        Ok(self.shared.tables.read().packets.get(&id).cloned())
    }

    async fn find_claim(&self, packet_id: Uuid, receiver_id: Uuid) -> Result<Option<ClaimRecord>> {
        Ok(self
            .shared
            .tables
            .read()
            .claims
            .iter()
            .find(|c| c.packet_id == packet_id && c.receiver_id == receiver_id)
            .cloned())
    }

    async fn count_claims(&self, packet_id: Uuid) -> Result<i64> {
        let tables = self.shared.tables.read();
        Ok(tables.claims.iter().filter(|c| c.packet_id == packet_id).count() as i64)
    }

    async fn list_claims(&self, packet_id: Uuid, window: Window) -> Result<(Vec<ClaimItem>, i64)> {
        let tables = self.shared.tables.read();
        let mut items: Vec<ClaimItem> = tables
            .claims
            .iter()
            .filter(|c| c.packet_id == packet_id)
            .map(|c| ClaimItem {
                receiver_id: c.receiver_id,
                receiver_name: tables.username(&c.receiver_id),
                amount: c.amount,
                claimed_at: c.claimed_at,
            })
            .collect();
        items.sort_by_key(|item| item.claimed_at);

        let total = items.len() as i64;
        Ok((paginate(items, window), total))
    }

    async fn list_sent(&self, sender_id: Uuid, window: Window) -> Result<(Vec<RedPacket>, i64)> {
        let tables = self.shared.tables.read();
        let mut packets: Vec<RedPacket> = tables
            .packets
            .values()
            .filter(|p| p.sender_id == sender_id)
            .cloned()
            .collect();
        packets.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = packets.len() as i64;
        Ok((paginate(packets, window), total))
    }

    async fn list_received(
        &self,
        receiver_id: Uuid,
        window: Window,
    ) -> Result<(Vec<ReceivedItem>, i64)> {
        let tables = self.shared.tables.read();
        let mut items: Vec<ReceivedItem> = tables
            .claims
            .iter()
            .rev()
            .filter(|c| c.receiver_id == receiver_id)
            .filter_map(|c| {
                let packet = tables.packets.get(&c.packet_id)?;
                Some(ReceivedItem {
                    packet_id: c.packet_id,
                    sender_id: packet.sender_id,
                    sender_name: tables.username(&packet.sender_id),
                    packet_type: packet.packet_type,
                    amount: c.amount,
                    claimed_at: c.claimed_at,
                })
            })
            .collect();
        items.sort_by(|a, b| b.claimed_at.cmp(&a.claimed_at));

        let total = items.len() as i64;
        Ok((paginate(items, window), total))
    }

    async fn list_ledger_entries(
        &self,
        account_id: Uuid,
        window: Window,
    ) -> Result<(Vec<LedgerEntry>, i64)> {
        let tables = self.shared.tables.read();
        let mut entries: Vec<LedgerEntry> = tables
            .entries
            .iter()
            .rev()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = entries.len() as i64;
        Ok((paginate(entries, window), total))
    }
}

/// Open in-memory transaction. Dropping it releases its row locks and
/// discards staged writes.
pub struct MemoryTx {
    shared: Arc<Shared>,
    held: HashMap<Uuid, OwnedMutexGuard<()>>,
    balances: HashMap<Uuid, Amount>,
    packets: HashMap<Uuid, RedPacket>,
    claims: Vec<ClaimRecord>,
    entries: Vec<LedgerEntry>,
}

impl MemoryTx {
    async fn lock_row(&mut self, id: Uuid) {
        if self.held.contains_key(&id) {
            return;
        }
        let lock = self.shared.row_lock(id);
        let guard = lock.lock_owned().await;
        self.held.insert(id, guard);
    }

    fn release_rows(&mut self) {
        let ids: Vec<Uuid> = self.held.keys().copied().collect();
        self.held.clear();

        let mut locks = self.shared.row_locks.lock();
        for id in ids {
            // a waiter cloned the Arc under this same mutex, so a count of one
            // means nobody else can reach the lock
            if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&id);
            }
        }
    }

    fn balance_of(&self, account: Uuid) -> Option<Amount> {
        if let Some(balance) = self.balances.get(&account) {
            return Some(*balance);
        }
        self.shared
            .tables
            .read()
            .accounts
            .get(&account)
            .map(|a| a.balance)
    }

    fn staged_or_committed_claim(&self, packet_id: Uuid, receiver_id: Uuid) -> Option<ClaimRecord> {
        self.claims
            .iter()
            .find(|c| c.packet_id == packet_id && c.receiver_id == receiver_id)
            .cloned()
            .or_else(|| {
                self.shared
                    .tables
                    .read()
                    .claims
                    .iter()
                    .find(|c| c.packet_id == packet_id && c.receiver_id == receiver_id)
                    .cloned()
            })
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.release_rows();
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn withdraw(&mut self, account: Uuid, amount: Amount) -> Result<Amount> {
        self.lock_row(account).await;

        match self.balance_of(account) {
            Some(balance) if balance >= amount => {
                let after = balance - amount;
                self.balances.insert(account, after);
                Ok(after)
            }
            _ => Err(RedPacketError::InsufficientFunds {
                account,
                requested: amount,
            }),
        }
    }

    async fn deposit(&mut self, account: Uuid, amount: Amount) -> Result<Amount> {
        self.lock_row(account).await;

        let balance = self
            .balance_of(account)
            .ok_or(RedPacketError::AccountNotFound(account))?;
        let after = balance.checked_add(amount).ok_or_else(|| {
            RedPacketError::Internal(format!("balance overflow on account {account}"))
        })?;
        self.balances.insert(account, after);
        Ok(after)
    }

    async fn record(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            account_id: entry.account_id,
            kind: entry.kind,
            direction: entry.direction,
            amount: entry.amount,
            balance_after: entry.balance_after,
            related_packet_id: entry.related_packet_id,
            remark: entry.remark,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl PacketTx for MemoryTx {
    async fn create_packet(&mut self, packet: NewRedPacket) -> Result<RedPacket> {
        let packet = RedPacket {
            id: Uuid::new_v4(),
            sender_id: packet.sender_id,
            packet_type: packet.packet_type,
            total_amount: packet.total_amount,
            total_count: packet.total_count,
            remaining_amount: packet.total_amount,
            remaining_count: packet.total_count,
            status: PacketStatus::Active,
            expires_at: packet.expires_at,
            created_at: packet.created_at,
        };
        self.lock_row(packet.id).await;
        self.packets.insert(packet.id, packet.clone());
        Ok(packet)
    }

    async fn get_for_update(&mut self, id: Uuid) -> Result<Option<RedPacket>> {
        self.lock_row(id).await;

        if let Some(packet) = self.packets.get(&id) {
            return Ok(Some(packet.clone()));
        }
        Ok(self.shared.tables.read().packets.get(&id).cloned())
    }

    async fn save_packet(&mut self, packet: &RedPacket) -> Result<()> {
        self.lock_row(packet.id).await;
        self.packets.insert(packet.id, packet.clone());
        Ok(())
    }

    async fn find_claim(
        &mut self,
        packet_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Option<ClaimRecord>> {
        Ok(self.staged_or_committed_claim(packet_id, receiver_id))
    }

    async fn insert_claim(&mut self, claim: NewClaim) -> Result<ClaimRecord> {
        if self
            .staged_or_committed_claim(claim.packet_id, claim.receiver_id)
            .is_some()
        {
            return Err(RedPacketError::AlreadyClaimed {
                packet_id: claim.packet_id,
                receiver_id: claim.receiver_id,
            });
        }

        let record = ClaimRecord {
            id: Uuid::new_v4(),
            packet_id: claim.packet_id,
            receiver_id: claim.receiver_id,
            amount: claim.amount,
            claimed_at: Utc::now(),
        };
        self.claims.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(mut self) -> Result<()> {
        let mut tables = self.shared.tables.write();

        // uniqueness is re-checked at commit, like a storage constraint
        if let Some(dup) = self
            .claims
            .iter()
            .find(|c| tables.has_claim(c.packet_id, c.receiver_id))
        {
            return Err(RedPacketError::AlreadyClaimed {
                packet_id: dup.packet_id,
                receiver_id: dup.receiver_id,
            });
        }

        let now = Utc::now();
        for (id, balance) in self.balances.drain() {
            if let Some(account) = tables.accounts.get_mut(&id) {
                account.balance = balance;
                account.updated_at = now;
            }
        }
        for (id, packet) in self.packets.drain() {
            tables.packets.insert(id, packet);
        }
        tables.claims.append(&mut self.claims);
        tables.entries.append(&mut self.entries);

        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        drop(self);
        Ok(())
    }
}
