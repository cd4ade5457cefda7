//! Red packet operations.
//!
//! [`RedPacketService`] is the only writer of packet and balance state. Each
//! mutating operation opens one transaction on the injected [`Store`] and
//! either commits it or lets it roll back, so a failure at any step leaves
//! nothing behind.

mod account;
mod claim;
mod creation;
mod query;

use std::sync::Arc;

use crate::allocator::Allocator;
use crate::config::PacketConfig;
use crate::store::Store;

pub struct RedPacketService<S: Store> {
    store: Arc<S>,
    allocator: Allocator,
    settings: PacketConfig,
}

impl<S: Store> RedPacketService<S> {
    pub fn new(store: Arc<S>, allocator: Allocator, settings: PacketConfig) -> Self {
        RedPacketService {
            store,
            allocator,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &PacketConfig {
        &self.settings
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::models::Account;
    use crate::store::MemoryStore;

    pub(crate) fn service() -> RedPacketService<MemoryStore> {
        RedPacketService::new(
            Arc::new(MemoryStore::new()),
            Allocator::seeded(7),
            PacketConfig::default(),
        )
    }

    pub(crate) async fn funded(
        service: &RedPacketService<MemoryStore>,
        username: &str,
        balance: i64,
    ) -> Account {
        let account = service.register(username).await.unwrap();
        if balance > 0 {
            service.recharge(account.id, balance).await.unwrap();
        }
        service.profile(account.id).await.unwrap()
    }
}
