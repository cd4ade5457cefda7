use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Monetary amount in the smallest currency unit.
pub type Amount = i64;

/// Split policy of a red packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "packet_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "lowercase")]
pub enum PacketType {
    /// Equal shares, remainder goes to the last claimer
    Even,
    /// Random shares, every claimer gets at least one unit
    Lucky,
}

/// Red packet status. Leaves `Active` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "packet_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "lowercase")]
pub enum PacketStatus {
    Active,
    Empty,
    Expired,
}

/// Ledger entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ledger_entry_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Recharge,
    Send,
    Receive,
    // Declared for expiry refunds; nothing produces it yet.
    Refund,
}

/// Direction of funds relative to the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ledger_direction", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// User account holding a non-negative balance
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Main red packet structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RedPacket {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub packet_type: PacketType,
    pub total_amount: Amount,
    pub total_count: i32,
    pub remaining_amount: Amount,
    pub remaining_count: i32,
    pub status: PacketStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RedPacket {
    /// Snapshot of the fields the allocator is allowed to see
    pub fn split_state(&self) -> SplitState {
        SplitState {
            packet_type: self.packet_type,
            total_amount: self.total_amount,
            total_count: self.total_count,
            remaining_amount: self.remaining_amount,
            remaining_count: self.remaining_count,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Take one share out of the packet. Marks the packet `Empty` once the
    /// last slot is taken.
    pub fn take_share(&mut self, amount: Amount) {
        self.remaining_amount -= amount;
        self.remaining_count -= 1;
        if self.remaining_count == 0 {
            self.status = PacketStatus::Empty;
        }
    }
}

/// Allocator input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitState {
    pub packet_type: PacketType,
    pub total_amount: Amount,
    pub total_count: i32,
    pub remaining_amount: Amount,
    pub remaining_count: i32,
}

/// Packet insert
#[derive(Debug, Clone)]
pub struct NewRedPacket {
    pub sender_id: Uuid,
    pub packet_type: PacketType,
    pub total_amount: Amount,
    pub total_count: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One receiver's share of one packet. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ClaimRecord {
    pub id: Uuid,
    pub packet_id: Uuid,
    pub receiver_id: Uuid,
    pub amount: Amount,
    pub claimed_at: DateTime<Utc>,
}

/// Claim record insert
#[derive(Debug, Clone)]
pub struct NewClaim {
    pub packet_id: Uuid,
    pub receiver_id: Uuid,
    pub amount: Amount,
}

/// Append-only record of one balance change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: EntryKind,
    pub direction: Direction,
    pub amount: Amount,
    pub balance_after: Amount,
    pub related_packet_id: Option<Uuid>,
    pub remark: String,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry insert
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub account_id: Uuid,
    pub kind: EntryKind,
    pub direction: Direction,
    pub amount: Amount,
    pub balance_after: Amount,
    pub related_packet_id: Option<Uuid>,
    pub remark: String,
}

/// Red packet creation request
#[derive(Debug, Clone, Deserialize, Serialize, validator::Validate)]
pub struct CreatePacketRequest {
    pub packet_type: PacketType,
    #[validate(range(min = 1))]
    pub total_amount: i64,
    #[validate(range(min = 1))]
    pub total_count: i32,
}

/// Recharge request
#[derive(Debug, Clone, Deserialize, Serialize, validator::Validate)]
pub struct RechargeRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
}

/// Claim response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub packet_id: Uuid,
    pub amount: Amount,
}

/// The viewer's own claim on a packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyClaim {
    pub claimed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl From<Option<ClaimRecord>> for MyClaim {
    fn from(record: Option<ClaimRecord>) -> Self {
        match record {
            Some(record) => MyClaim {
                claimed: true,
                amount: Some(record.amount),
                claimed_at: Some(record.claimed_at),
            },
            None => MyClaim {
                claimed: false,
                amount: None,
                claimed_at: None,
            },
        }
    }
}

/// Red packet detail view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketDetail {
    #[serde(flatten)]
    pub packet: RedPacket,
    pub sender_name: String,
    pub claimed_count: i64,
    pub my_claim: MyClaim,
}

/// Row of a packet's claim list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ClaimItem {
    pub receiver_id: Uuid,
    pub receiver_name: String,
    pub amount: Amount,
    pub claimed_at: DateTime<Utc>,
}

/// Row of a receiver's claim history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReceivedItem {
    pub packet_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub packet_type: PacketType,
    pub amount: Amount,
    pub claimed_at: DateTime<Utc>,
}

/// Pagination query
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    /// Resolve to `(offset, limit)`. Page starts at 1, size is clamped to
    /// `[1, max_page_size]`.
    pub fn resolve(&self, default_page_size: i64, max_page_size: i64) -> Window {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .page_size
            .unwrap_or(default_page_size)
            .clamp(1, max_page_size.max(1));
        Window {
            offset: (page - 1).saturating_mul(limit),
            limit,
        }
    }
}

/// Resolved page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: i64,
    pub limit: i64,
}

/// One page of results with the unpaged total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: i64,
    pub list: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn packet(total_amount: Amount, total_count: i32) -> RedPacket {
        let now = Utc::now();
        RedPacket {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            packet_type: PacketType::Even,
            total_amount,
            total_count,
            remaining_amount: total_amount,
            remaining_count: total_count,
            status: PacketStatus::Active,
            expires_at: now + Duration::hours(24),
            created_at: now,
        }
    }

    #[test]
    fn take_share_decrements_and_empties_on_last_slot() {
        let mut p = packet(10, 2);
        p.take_share(4);
        assert_eq!(p.remaining_amount, 6);
        assert_eq!(p.remaining_count, 1);
        assert_eq!(p.status, PacketStatus::Active);

        p.take_share(6);
        assert_eq!(p.remaining_amount, 0);
        assert_eq!(p.remaining_count, 0);
        assert_eq!(p.status, PacketStatus::Empty);
    }

    #[test]
    fn expiry_is_strictly_after() {
        let p = packet(10, 2);
        assert!(!p.is_expired_at(p.expires_at));
        assert!(p.is_expired_at(p.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn page_request_defaults_and_clamps() {
        assert_eq!(
            PageRequest::default().resolve(10, 50),
            Window { offset: 0, limit: 10 }
        );
        assert_eq!(
            PageRequest::new(3, 500).resolve(10, 50),
            Window { offset: 100, limit: 50 }
        );
        assert_eq!(
            PageRequest::new(0, 0).resolve(10, 50),
            Window { offset: 0, limit: 1 }
        );
        assert_eq!(
            PageRequest::new(-4, 20).resolve(10, 50),
            Window { offset: 0, limit: 20 }
        );
    }

    #[test]
    fn my_claim_from_record() {
        let none: MyClaim = None.into();
        assert!(!none.claimed);
        assert_eq!(none.amount, None);

        let record = ClaimRecord {
            id: Uuid::new_v4(),
            packet_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            amount: 42,
            claimed_at: Utc::now(),
        };
        let some: MyClaim = Some(record.clone()).into();
        assert!(some.claimed);
        assert_eq!(some.amount, Some(42));
        assert_eq!(some.claimed_at, Some(record.claimed_at));
    }

    #[test]
    fn request_amounts_must_be_positive() {
        use validator::Validate;

        let create = |total_amount, total_count| CreatePacketRequest {
            packet_type: PacketType::Lucky,
            total_amount,
            total_count,
        };
        assert!(create(100, 5).validate().is_ok());
        assert!(create(0, 5).validate().is_err());
        assert!(create(100, 0).validate().is_err());

        assert!(RechargeRequest { amount: 1 }.validate().is_ok());
        assert!(RechargeRequest { amount: -3 }.validate().is_err());
    }

    #[test]
    fn enums_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&PacketType::Lucky).unwrap(), "\"lucky\"");
        assert_eq!(serde_json::to_string(&PacketStatus::Empty).unwrap(), "\"empty\"");
        assert_eq!(serde_json::to_string(&EntryKind::Receive).unwrap(), "\"receive\"");
        assert_eq!(serde_json::to_string(&Direction::Out).unwrap(), "\"out\"");
    }
}
