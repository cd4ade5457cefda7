use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::RedPacketService;
use crate::errors::{RedPacketError, Result};
use crate::ledger::LedgerTx;
use crate::metrics;
use crate::models::{Amount, CreatePacketRequest, EntryKind, NewLedgerEntry, NewRedPacket, RedPacket};
use crate::packet_store::PacketTx;
use crate::store::{Store, StoreTx};

impl<S: Store> RedPacketService<S> {
    /// Debit the sender and open a new packet.
    ///
    /// Input is validated before any transaction starts. The debit, the
    /// packet row and the `send` ledger entry commit together.
    pub async fn create_packet(
        &self,
        sender_id: Uuid,
        request: CreatePacketRequest,
    ) -> Result<RedPacket> {
        // Validate request
        request.validate()?;

        if request.total_count > self.settings.max_count {
            return Err(RedPacketError::Validation(format!(
                "total_count cannot exceed {}",
                self.settings.max_count
            )));
        }

        if request.total_amount < Amount::from(request.total_count) {
            return Err(RedPacketError::Validation(
                "total_amount must be at least total_count".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;

        let created_at = Utc::now();
        let balance_after = tx.withdraw(sender_id, request.total_amount).await?;

        let packet = tx
            .create_packet(NewRedPacket {
                sender_id,
                packet_type: request.packet_type,
                total_amount: request.total_amount,
                total_count: request.total_count,
                expires_at: created_at + self.settings.ttl(),
                created_at,
            })
            .await?;

        tx.record(NewLedgerEntry::outgoing(
            sender_id,
            EntryKind::Send,
            request.total_amount,
            balance_after,
            Some(packet.id),
            "send red packet",
        ))
        .await?;

        tx.commit().await?;

        metrics::record_packet_created(packet.packet_type);
        info!(
            packet_id = %packet.id,
            sender_id = %sender_id,
            packet_type = ?packet.packet_type,
            total_amount = packet.total_amount,
            total_count = packet.total_count,
            "Red packet created"
        );

        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ErrorKind, RedPacketError};
    use crate::models::{
        CreatePacketRequest, Direction, EntryKind, PacketStatus, PacketType, PageRequest,
    };
    use crate::services::testing::{funded, service};
    use crate::store::Store;

    fn request(packet_type: PacketType, total_amount: i64, total_count: i32) -> CreatePacketRequest {
        CreatePacketRequest {
            packet_type,
            total_amount,
            total_count,
        }
    }

    #[tokio::test]
    async fn create_debits_sender_and_logs_send() {
        let svc = service();
        let sender = funded(&svc, "sender", 500).await;

        let packet = svc
            .create_packet(sender.id, request(PacketType::Lucky, 200, 4))
            .await
            .unwrap();

        assert_eq!(packet.status, PacketStatus::Active);
        assert_eq!(packet.remaining_amount, 200);
        assert_eq!(packet.remaining_count, 4);
        assert_eq!(packet.expires_at - packet.created_at, chrono::Duration::hours(24));
        assert_eq!(svc.profile(sender.id).await.unwrap().balance, 300);

        let history = svc.ledger_history(sender.id, PageRequest::default()).await.unwrap();
        let send = &history.list[0];
        assert_eq!(send.kind, EntryKind::Send);
        assert_eq!(send.direction, Direction::Out);
        assert_eq!(send.amount, 200);
        assert_eq!(send.balance_after, 300);
        assert_eq!(send.related_packet_id, Some(packet.id));
    }

    #[tokio::test]
    async fn expiry_is_exactly_one_ttl_after_creation() {
        let svc = service();
        let sender = funded(&svc, "sender", 100).await;

        let packet = svc
            .create_packet(sender.id, request(PacketType::Even, 30, 3))
            .await
            .unwrap();
        let stored = svc.store().get_packet(packet.id).await.unwrap().unwrap();

        assert_eq!(stored.created_at, packet.created_at);
        assert_eq!(stored.expires_at - stored.created_at, svc.settings().ttl());
    }

    #[tokio::test]
    async fn fewer_units_than_slots_is_rejected_before_debit() {
        let svc = service();
        let sender = funded(&svc, "sender", 100).await;

        let err = svc
            .create_packet(sender.id, request(PacketType::Even, 2, 3))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(svc.profile(sender.id).await.unwrap().balance, 100);
        let (sent, total) = svc
            .store()
            .list_sent(sender.id, PageRequest::default().resolve(10, 50))
            .await
            .unwrap();
        assert!(sent.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn out_of_range_requests_are_rejected() {
        let svc = service();
        let sender = funded(&svc, "sender", 1_000).await;

        for bad in [
            request(PacketType::Even, 0, 1),
            request(PacketType::Even, 10, 0),
            request(PacketType::Lucky, -5, 2),
            request(PacketType::Lucky, 500, 101),
        ] {
            let err = svc.create_packet(sender.id, bad).await.unwrap_err();
            assert!(matches!(err, RedPacketError::Validation(_)));
        }
        assert_eq!(svc.profile(sender.id).await.unwrap().balance, 1_000);
    }

    #[tokio::test]
    async fn insufficient_balance_leaves_no_trace() {
        let svc = service();
        let sender = funded(&svc, "sender", 50).await;

        let err = svc
            .create_packet(sender.id, request(PacketType::Even, 51, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, RedPacketError::InsufficientFunds { requested: 51, .. }));

        assert_eq!(svc.profile(sender.id).await.unwrap().balance, 50);
        let history = svc.ledger_history(sender.id, PageRequest::default()).await.unwrap();
        // only the funding recharge
        assert_eq!(history.total, 1);
        let sent = svc.list_sent(sender.id, PageRequest::default()).await.unwrap();
        assert_eq!(sent.total, 0);
    }

    #[tokio::test]
    async fn unknown_sender_reads_as_insufficient() {
        let svc = service();
        let err = svc
            .create_packet(uuid::Uuid::new_v4(), request(PacketType::Even, 10, 2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    }
}
