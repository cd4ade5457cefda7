//! PostgreSQL store.
//!
//! Packet claims are serialized with `SELECT ... FOR UPDATE`; balance
//! changes are single conditional `UPDATE ... RETURNING` statements, so two
//! writers on the same account never interleave a read and a write.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Pool, Postgres, Transaction};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::config::DatabaseConfig;
use crate::errors::{RedPacketError, Result};
use crate::ledger::LedgerTx;
use crate::models::{
    Account, Amount, ClaimItem, ClaimRecord, LedgerEntry, NewClaim, NewLedgerEntry,
    NewRedPacket, PacketStatus, ReceivedItem, RedPacket, Window,
};
use crate::packet_store::PacketTx;

pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        Ok(PgStore { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Open PostgreSQL transaction. Rolled back by sqlx when dropped.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        Ok(PgTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn create_account(&self, username: &str) -> Result<Account> {
        let now = Utc::now();

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, username, balance, created_at, updated_at)
            VALUES ($1, $2, 0, $3, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return RedPacketError::Validation(format!("username already exists: {username}"));
            }
            RedPacketError::from(e)
        })?;

        Ok(account)
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT * FROM accounts WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn get_packet(&self, id: Uuid) -> Result<Option<RedPacket>> {
        let packet = sqlx::query_as::<_, RedPacket>(
            r#"
            SELECT * FROM red_packets WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(packet)
    }

    async fn find_claim(&self, packet_id: Uuid, receiver_id: Uuid) -> Result<Option<ClaimRecord>> {
        let record = sqlx::query_as::<_, ClaimRecord>(
            r#"
            SELECT * FROM claim_records WHERE packet_id = $1 AND receiver_id = $2
            "#,
        )
        .bind(packet_id)
        .bind(receiver_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn count_claims(&self, packet_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM claim_records WHERE packet_id = $1
            "#,
        )
        .bind(packet_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn list_claims(&self, packet_id: Uuid, window: Window) -> Result<(Vec<ClaimItem>, i64)> {
        let total = self.count_claims(packet_id).await?;

        let items = sqlx::query_as::<_, ClaimItem>(
            r#"
            SELECT
                c.receiver_id,
                COALESCE(a.username, '') AS receiver_name,
                c.amount,
                c.claimed_at
            FROM claim_records c
            LEFT JOIN accounts a ON a.id = c.receiver_id
            WHERE c.packet_id = $1
            ORDER BY c.claimed_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(packet_id)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((items, total))
    }

    async fn list_sent(&self, sender_id: Uuid, window: Window) -> Result<(Vec<RedPacket>, i64)> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM red_packets WHERE sender_id = $1
            "#,
        )
        .bind(sender_id)
        .fetch_one(&self.pool)
        .await?;

        let packets = sqlx::query_as::<_, RedPacket>(
            r#"
            SELECT * FROM red_packets
            WHERE sender_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(sender_id)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((packets, total))
    }

    async fn list_received(
        &self,
        receiver_id: Uuid,
        window: Window,
    ) -> Result<(Vec<ReceivedItem>, i64)> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM claim_records WHERE receiver_id = $1
            "#,
        )
        .bind(receiver_id)
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, ReceivedItem>(
            r#"
            SELECT
                c.packet_id,
                p.sender_id,
                COALESCE(a.username, '') AS sender_name,
                p.packet_type,
                c.amount,
                c.claimed_at
            FROM claim_records c
            JOIN red_packets p ON p.id = c.packet_id
            LEFT JOIN accounts a ON a.id = p.sender_id
            WHERE c.receiver_id = $1
            ORDER BY c.claimed_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(receiver_id)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((items, total))
    }

    async fn list_ledger_entries(
        &self,
        account_id: Uuid,
        window: Window,
    ) -> Result<(Vec<LedgerEntry>, i64)> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM ledger_entries WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT * FROM ledger_entries
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((entries, total))
    }
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn withdraw(&mut self, account: Uuid, amount: Amount) -> Result<Amount> {
        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE accounts
            SET balance = balance - $1,
                updated_at = $2
            WHERE id = $3 AND balance >= $1
            RETURNING balance
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(account)
        .fetch_optional(&mut *self.tx)
        .await?;

        balance.ok_or(RedPacketError::InsufficientFunds {
            account,
            requested: amount,
        })
    }

    async fn deposit(&mut self, account: Uuid, amount: Amount) -> Result<Amount> {
        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE accounts
            SET balance = balance + $1,
                updated_at = $2
            WHERE id = $3
            RETURNING balance
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(account)
        .fetch_optional(&mut *self.tx)
        .await?;

        balance.ok_or(RedPacketError::AccountNotFound(account))
    }

    async fn record(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries (
                id, account_id, kind, direction, amount,
                balance_after, related_packet_id, remark, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.account_id)
        .bind(entry.kind)
        .bind(entry.direction)
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(entry.related_packet_id)
        .bind(entry.remark)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(entry)
    }
}

#[async_trait]
impl PacketTx for PgTx {
    async fn create_packet(&mut self, packet: NewRedPacket) -> Result<RedPacket> {
        let packet = sqlx::query_as::<_, RedPacket>(
            r#"
            INSERT INTO red_packets (
                id, sender_id, packet_type, total_amount, total_count,
                remaining_amount, remaining_count, status, expires_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(packet.sender_id)
        .bind(packet.packet_type)
        .bind(packet.total_amount)
        .bind(packet.total_count)
        .bind(PacketStatus::Active)
        .bind(packet.expires_at)
        .bind(packet.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(packet)
    }

    async fn get_for_update(&mut self, id: Uuid) -> Result<Option<RedPacket>> {
        let packet = sqlx::query_as::<_, RedPacket>(
            r#"
            SELECT * FROM red_packets WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(packet)
    }

    async fn save_packet(&mut self, packet: &RedPacket) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE red_packets
            SET remaining_amount = $1,
                remaining_count = $2,
                status = $3
            WHERE id = $4
            "#,
        )
        .bind(packet.remaining_amount)
        .bind(packet.remaining_count)
        .bind(packet.status)
        .bind(packet.id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_claim(
        &mut self,
        packet_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Option<ClaimRecord>> {
        let record = sqlx::query_as::<_, ClaimRecord>(
            r#"
            SELECT * FROM claim_records WHERE packet_id = $1 AND receiver_id = $2
            "#,
        )
        .bind(packet_id)
        .bind(receiver_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn insert_claim(&mut self, claim: NewClaim) -> Result<ClaimRecord> {
        let record = sqlx::query_as::<_, ClaimRecord>(
            r#"
            INSERT INTO claim_records (id, packet_id, receiver_id, amount, claimed_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(claim.packet_id)
        .bind(claim.receiver_id)
        .bind(claim.amount)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return RedPacketError::AlreadyClaimed {
                    packet_id: claim.packet_id,
                    receiver_id: claim.receiver_id,
                };
            }
            RedPacketError::from(e)
        })?;

        Ok(record)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
