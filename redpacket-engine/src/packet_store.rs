//! Persisted red packet state and claim records.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{ClaimRecord, NewClaim, NewRedPacket, RedPacket};

/// Packet mutations scoped to one open transaction.
#[async_trait]
pub trait PacketTx: Send {
    /// Insert a packet as `Active` with remaining amount/count equal to the
    /// totals.
    async fn create_packet(&mut self, packet: NewRedPacket) -> Result<RedPacket>;

    /// Read a packet and hold its row lock until the transaction ends.
    /// Concurrent callers for the same id wait here.
    async fn get_for_update(&mut self, id: Uuid) -> Result<Option<RedPacket>>;

    /// Persist remaining amount, remaining count and status.
    async fn save_packet(&mut self, packet: &RedPacket) -> Result<()>;

    async fn find_claim(&mut self, packet_id: Uuid, receiver_id: Uuid)
        -> Result<Option<ClaimRecord>>;

    /// Insert a claim record. A second record for the same
    /// `(packet_id, receiver_id)` fails with `AlreadyClaimed`.
    async fn insert_claim(&mut self, claim: NewClaim) -> Result<ClaimRecord>;
}
