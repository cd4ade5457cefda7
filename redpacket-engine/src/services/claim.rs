use chrono::Utc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::RedPacketService;
use crate::errors::{ErrorKind, RedPacketError, Result};
use crate::ledger;
use crate::metrics;
use crate::models::{Amount, EntryKind, NewClaim, PacketStatus};
use crate::packet_store::PacketTx;
use crate::store::{Store, StoreTx};

impl<S: Store> RedPacketService<S> {
    /// Take one share of a packet for `receiver_id`.
    ///
    /// The packet row stays locked from the first read until commit, so
    /// concurrent claims on the same packet run one after another and each
    /// sees the state the previous one committed.
    pub async fn claim_packet(&self, packet_id: Uuid, receiver_id: Uuid) -> Result<Amount> {
        let started = Instant::now();
        let mut tx = self.store.begin().await?;

        let outcome = self.claim_in(&mut tx, packet_id, receiver_id).await;
        let result = match outcome {
            Ok(amount) => tx.commit().await.map(|_| amount),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        packet_id = %packet_id,
                        error = %rollback_err,
                        "Claim rollback failed"
                    );
                }
                Err(err)
            }
        };

        match &result {
            Ok(amount) => {
                metrics::record_claim_success(*amount, started.elapsed().as_secs_f64());
                info!(
                    packet_id = %packet_id,
                    receiver_id = %receiver_id,
                    amount = *amount,
                    "Red packet claimed"
                );
            }
            Err(err) => {
                let kind = err.kind();
                metrics::record_claim_rejected(kind);
                if kind == ErrorKind::Internal {
                    error!(
                        packet_id = %packet_id,
                        receiver_id = %receiver_id,
                        error = %err,
                        "Claim failed"
                    );
                } else {
                    info!(
                        packet_id = %packet_id,
                        receiver_id = %receiver_id,
                        reason = kind.as_str(),
                        "Claim rejected"
                    );
                }
            }
        }

        result
    }

    async fn claim_in(&self, tx: &mut S::Tx, packet_id: Uuid, receiver_id: Uuid) -> Result<Amount> {
        let mut packet = tx
            .get_for_update(packet_id)
            .await?
            .ok_or(RedPacketError::PacketNotFound(packet_id))?;

        match packet.status {
            PacketStatus::Active => {}
            PacketStatus::Empty => return Err(RedPacketError::PacketEmpty(packet_id)),
            PacketStatus::Expired => return Err(RedPacketError::PacketExpired(packet_id)),
        }

        // Expiry is only observed here; the stored status is left as is.
        if packet.is_expired_at(Utc::now()) {
            return Err(RedPacketError::PacketExpired(packet_id));
        }

        if tx.find_claim(packet_id, receiver_id).await?.is_some() {
            return Err(RedPacketError::AlreadyClaimed {
                packet_id,
                receiver_id,
            });
        }

        if packet.remaining_count < 1
            || packet.remaining_amount < Amount::from(packet.remaining_count)
        {
            return Err(RedPacketError::InvariantViolation(format!(
                "active packet {} has {} units for {} slots",
                packet_id, packet.remaining_amount, packet.remaining_count
            )));
        }

        let amount = self.allocator.allocate(packet.split_state());
        if amount < 1 || amount > packet.remaining_amount {
            return Err(RedPacketError::InvariantViolation(format!(
                "allocated {} from {} remaining on packet {}",
                amount, packet.remaining_amount, packet_id
            )));
        }

        packet.take_share(amount);
        tx.save_packet(&packet).await?;

        tx.insert_claim(NewClaim {
            packet_id,
            receiver_id,
            amount,
        })
        .await?;

        ledger::credit(
            tx,
            receiver_id,
            amount,
            EntryKind::Receive,
            Some(packet_id),
            "claim red packet",
        )
        .await?;

        Ok(amount)
    }
}
