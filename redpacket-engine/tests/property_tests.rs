//! Property-based tests for fund conservation
//!
//! Random packets are drained by random claimer sequences (with repeats)
//! and checked for:
//! - Conservation: Σ(claims) + remaining_amount == total_amount
//! - Uniqueness: a repeat claimer is always rejected
//! - Balance/ledger agreement: the latest entry carries the account balance

use proptest::prelude::*;
use redpacket_engine::config::PacketConfig;
use redpacket_engine::models::{CreatePacketRequest, PacketStatus, PacketType, PageRequest};
use redpacket_engine::{Allocator, ErrorKind, MemoryStore, RedPacketService, Store};
use std::collections::HashSet;
use std::sync::Arc;

/// Strategy for generating split policies
fn packet_type_strategy() -> impl Strategy<Value = PacketType> {
    prop_oneof![Just(PacketType::Even), Just(PacketType::Lucky)]
}

/// Strategy for generating a valid (amount, count) pair
fn packet_size_strategy() -> impl Strategy<Value = (i64, i32)> {
    (1i32..=30).prop_flat_map(|count| (i64::from(count)..=5_000i64, Just(count)))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn claims_conserve_funds(
        packet_type in packet_type_strategy(),
        (total_amount, total_count) in packet_size_strategy(),
        claimers in prop::collection::vec(0usize..40, 1..80),
        seed in any::<u64>(),
    ) {
        runtime().block_on(async {
            let svc = RedPacketService::new(
                Arc::new(MemoryStore::new()),
                Allocator::seeded(seed),
                PacketConfig::default(),
            );

            let sender = svc.register("sender").await.unwrap();
            svc.recharge(sender.id, total_amount).await.unwrap();
            let packet = svc
                .create_packet(
                    sender.id,
                    CreatePacketRequest { packet_type, total_amount, total_count },
                )
                .await
                .unwrap();

            let mut users = Vec::new();
            for i in 0..40 {
                users.push(svc.register(&format!("user-{i}")).await.unwrap().id);
            }

            let mut seen = HashSet::new();
            let mut paid = 0i64;
            let mut successes = 0i32;
            for idx in claimers {
                let receiver = users[idx];
                match svc.claim_packet(packet.id, receiver).await {
                    Ok(amount) => {
                        assert!(amount >= 1);
                        assert!(seen.insert(receiver));
                        paid += amount;
                        successes += 1;
                    }
                    Err(err) => match err.kind() {
                        ErrorKind::AlreadyClaimed => assert!(seen.contains(&receiver)),
                        ErrorKind::PacketEmpty => assert_eq!(successes, total_count),
                        other => panic!("unexpected rejection: {other:?}"),
                    },
                }

                let stored = svc.store().get_packet(packet.id).await.unwrap().unwrap();
                assert_eq!(paid + stored.remaining_amount, total_amount);
                assert_eq!(stored.remaining_count, total_count - successes);
                assert!(stored.remaining_amount >= i64::from(stored.remaining_count));
            }

            let stored = svc.store().get_packet(packet.id).await.unwrap().unwrap();
            if successes == total_count {
                assert_eq!(stored.status, PacketStatus::Empty);
                assert_eq!(stored.remaining_amount, 0);
            } else {
                assert_eq!(stored.status, PacketStatus::Active);
            }

            for receiver in seen {
                let balance = svc.profile(receiver).await.unwrap().balance;
                let history = svc.ledger_history(receiver, PageRequest::default()).await.unwrap();
                assert_eq!(history.total, 1);
                assert_eq!(history.list[0].balance_after, balance);
            }
        });
    }
}
