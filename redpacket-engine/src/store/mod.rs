//! Storage seam.
//!
//! [`Store`] is the long-lived handle built once at startup and shared by
//! the service. Writes happen through a [`StoreTx`] obtained from
//! [`Store::begin`]; a transaction that is dropped without
//! [`StoreTx::commit`] is rolled back, so early returns never leave partial
//! state behind.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::Result;
use crate::ledger::LedgerTx;
use crate::models::{
    Account, ClaimItem, ClaimRecord, LedgerEntry, ReceivedItem, RedPacket, Window,
};
use crate::packet_store::PacketTx;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One atomic scope over ledger and packet state.
#[async_trait]
pub trait StoreTx: LedgerTx + PacketTx {
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx>;

    /// Register an account with a zero balance
    async fn create_account(&self, username: &str) -> Result<Account>;

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>>;

    /// Plain, non-locking packet read
    async fn get_packet(&self, id: Uuid) -> Result<Option<RedPacket>>;

    async fn find_claim(&self, packet_id: Uuid, receiver_id: Uuid) -> Result<Option<ClaimRecord>>;

    async fn count_claims(&self, packet_id: Uuid) -> Result<i64>;

    /// Claims on one packet, oldest first
    async fn list_claims(&self, packet_id: Uuid, window: Window) -> Result<(Vec<ClaimItem>, i64)>;

    /// Packets sent by one account, newest first
    async fn list_sent(&self, sender_id: Uuid, window: Window) -> Result<(Vec<RedPacket>, i64)>;

    /// Claims made by one account, newest first
    async fn list_received(
        &self,
        receiver_id: Uuid,
        window: Window,
    ) -> Result<(Vec<ReceivedItem>, i64)>;

    /// Ledger entries of one account, newest first
    async fn list_ledger_entries(
        &self,
        account_id: Uuid,
        window: Window,
    ) -> Result<(Vec<LedgerEntry>, i64)>;
}
