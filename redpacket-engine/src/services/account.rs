use tracing::info;
use uuid::Uuid;

use super::RedPacketService;
use crate::errors::{RedPacketError, Result};
use crate::ledger;
use crate::models::{Account, Amount, EntryKind, LedgerEntry, Page, PageRequest};
use crate::store::{Store, StoreTx};

const MAX_USERNAME_LEN: usize = 50;

impl<S: Store> RedPacketService<S> {
    /// Open an account with a zero balance
    pub async fn register(&self, username: &str) -> Result<Account> {
        let username = username.trim();
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
            return Err(RedPacketError::Validation(format!(
                "username must be 1 to {MAX_USERNAME_LEN} characters"
            )));
        }

        let account = self.store.create_account(username).await?;
        info!(account_id = %account.id, username = %account.username, "Account registered");
        Ok(account)
    }

    /// Add funds to an account, logged as a `recharge` entry
    pub async fn recharge(&self, account_id: Uuid, amount: Amount) -> Result<LedgerEntry> {
        if amount < 1 {
            return Err(RedPacketError::Validation(
                "recharge amount must be positive".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let entry = ledger::credit(
            &mut tx,
            account_id,
            amount,
            EntryKind::Recharge,
            None,
            "recharge",
        )
        .await?;
        tx.commit().await?;

        info!(
            account_id = %account_id,
            amount = amount,
            balance_after = entry.balance_after,
            "Account recharged"
        );
        Ok(entry)
    }

    pub async fn profile(&self, account_id: Uuid) -> Result<Account> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or(RedPacketError::AccountNotFound(account_id))
    }

    /// Ledger entries of an account, newest first
    pub async fn ledger_history(
        &self,
        account_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<LedgerEntry>> {
        let (list, total) = self
            .store
            .list_ledger_entries(account_id, self.window(page))
            .await?;
        Ok(Page { total, list })
    }
}
