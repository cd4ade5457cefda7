use uuid::Uuid;

use super::RedPacketService;
use crate::config::PAGE_SIZE_LIMIT;
use crate::errors::{RedPacketError, Result};
use crate::models::{ClaimItem, Page, PageRequest, PacketDetail, ReceivedItem, RedPacket, Window};
use crate::store::Store;

impl<S: Store> RedPacketService<S> {
    pub(crate) fn window(&self, page: PageRequest) -> Window {
        let max_page_size = self.settings.max_page_size.min(PAGE_SIZE_LIMIT);
        page.resolve(self.settings.default_page_size, max_page_size)
    }

    /// Packet fields plus sender name, claim count and the viewer's own claim
    pub async fn get_detail(&self, packet_id: Uuid, viewer_id: Uuid) -> Result<PacketDetail> {
        let packet = self
            .store
            .get_packet(packet_id)
            .await?
            .ok_or(RedPacketError::PacketNotFound(packet_id))?;

        let sender_name = self
            .store
            .get_account(packet.sender_id)
            .await?
            .map(|a| a.username)
            .unwrap_or_default();
        let claimed_count = self.store.count_claims(packet_id).await?;
        let my_claim = self.store.find_claim(packet_id, viewer_id).await?.into();

        Ok(PacketDetail {
            packet,
            sender_name,
            claimed_count,
            my_claim,
        })
    }

    /// Claims on a packet, oldest first
    pub async fn list_records(&self, packet_id: Uuid, page: PageRequest) -> Result<Page<ClaimItem>> {
        let (list, total) = self.store.list_claims(packet_id, self.window(page)).await?;
        Ok(Page { total, list })
    }

    /// Packets sent by an account, newest first
    pub async fn list_sent(&self, sender_id: Uuid, page: PageRequest) -> Result<Page<RedPacket>> {
        let (list, total) = self.store.list_sent(sender_id, self.window(page)).await?;
        Ok(Page { total, list })
    }

    /// Claims made by an account, newest first
    pub async fn list_received(
        &self,
        receiver_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<ReceivedItem>> {
        let (list, total) = self
            .store
            .list_received(receiver_id, self.window(page))
            .await?;
        Ok(Page { total, list })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use uuid::Uuid;

    use crate::allocator::Allocator;
    use crate::config::PacketConfig;
    use crate::errors::RedPacketError;
    use crate::models::{CreatePacketRequest, PacketType, PageRequest};
    use crate::services::testing::{funded, service};

    #[tokio::test]
    async fn detail_reports_viewer_claim() {
        let svc = service();
        let sender = funded(&svc, "alice", 90).await;
        let packet = svc
            .create_packet(
                sender.id,
                CreatePacketRequest {
                    packet_type: PacketType::Even,
                    total_amount: 90,
                    total_count: 3,
                },
            )
            .await
            .unwrap();
        let bob = funded(&svc, "bob", 0).await;
        let carol = funded(&svc, "carol", 0).await;
        svc.claim_packet(packet.id, bob.id).await.unwrap();

        let seen_by_bob = svc.get_detail(packet.id, bob.id).await.unwrap();
        assert_eq!(seen_by_bob.sender_name, "alice");
        assert_eq!(seen_by_bob.claimed_count, 1);
        assert!(seen_by_bob.my_claim.claimed);
        assert_eq!(seen_by_bob.my_claim.amount, Some(30));
        assert_eq!(seen_by_bob.packet.remaining_count, 2);

        let seen_by_carol = svc.get_detail(packet.id, carol.id).await.unwrap();
        assert!(!seen_by_carol.my_claim.claimed);
        assert_eq!(seen_by_carol.my_claim.amount, None);
    }

    #[tokio::test]
    async fn detail_of_missing_packet_is_not_found() {
        let svc = service();
        let err = svc.get_detail(Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RedPacketError::PacketNotFound(_)));
    }

    #[tokio::test]
    async fn listings_join_names_and_page() {
        let svc = service();
        let sender = funded(&svc, "alice", 1_000).await;
        let bob = funded(&svc, "bob", 0).await;

        let mut packets = Vec::new();
        for _ in 0..3 {
            let packet = svc
                .create_packet(
                    sender.id,
                    CreatePacketRequest {
                        packet_type: PacketType::Lucky,
                        total_amount: 100,
                        total_count: 2,
                    },
                )
                .await
                .unwrap();
            svc.claim_packet(packet.id, bob.id).await.unwrap();
            packets.push(packet);
        }

        let sent = svc.list_sent(sender.id, PageRequest::new(1, 2)).await.unwrap();
        assert_eq!(sent.total, 3);
        assert_eq!(sent.list.len(), 2);

        let received = svc.list_received(bob.id, PageRequest::default()).await.unwrap();
        assert_eq!(received.total, 3);
        assert!(received.list.iter().all(|r| r.sender_name == "alice"));
        assert!(received.list.iter().all(|r| r.packet_type == PacketType::Lucky));

        let records = svc
            .list_records(packets[0].id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(records.total, 1);
        assert_eq!(records.list[0].receiver_name, "bob");
    }

    #[tokio::test]
    async fn page_size_is_capped() {
        let svc = service();
        let sender = funded(&svc, "alice", 10_000).await;
        for _ in 0..60 {
            svc.create_packet(
                sender.id,
                CreatePacketRequest {
                    packet_type: PacketType::Even,
                    total_amount: 1,
                    total_count: 1,
                },
            )
            .await
            .unwrap();
        }

        let page = svc.list_sent(sender.id, PageRequest::new(1, 500)).await.unwrap();
        assert_eq!(page.total, 60);
        assert_eq!(page.list.len(), 50);

        let page = svc.list_sent(sender.id, PageRequest::new(2, 500)).await.unwrap();
        assert_eq!(page.list.len(), 10);
    }

    #[tokio::test]
    async fn oversized_page_setting_still_caps_at_fifty() {
        let svc = crate::services::RedPacketService::new(
            Arc::new(crate::store::MemoryStore::new()),
            Allocator::seeded(3),
            PacketConfig {
                max_page_size: 500,
                ..PacketConfig::default()
            },
        );
        let sender = funded(&svc, "bob", 100).await;
        for _ in 0..55 {
            svc.create_packet(
                sender.id,
                CreatePacketRequest {
                    packet_type: PacketType::Even,
                    total_amount: 1,
                    total_count: 1,
                },
            )
            .await
            .unwrap();
        }

        let page = svc.list_sent(sender.id, PageRequest::new(1, 200)).await.unwrap();
        assert_eq!(page.total, 55);
        assert_eq!(page.list.len(), 50);
    }
}
