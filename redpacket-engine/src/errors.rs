use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::models::Amount;

pub type Result<T> = std::result::Result<T, RedPacketError>;

#[derive(Error, Debug)]
pub enum RedPacketError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient balance: account {account} cannot pay {requested}")]
    InsufficientFunds { account: Uuid, requested: Amount },

    #[error("Red packet not found: {0}")]
    PacketNotFound(Uuid),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Red packet {packet_id} already claimed by {receiver_id}")]
    AlreadyClaimed { packet_id: Uuid, receiver_id: Uuid },

    #[error("Red packet is empty: {0}")]
    PacketEmpty(Uuid),

    #[error("Red packet is expired: {0}")]
    PacketExpired(Uuid),

    #[error("Missing or invalid caller identity")]
    Unauthorized,

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Stable classification of [`RedPacketError`], independent of message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InsufficientFunds,
    NotFound,
    AlreadyClaimed,
    PacketEmpty,
    PacketExpired,
    Unauthorized,
    Internal,
}

impl ErrorKind {
    /// Machine-readable code reported to clients
    pub fn code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::Internal => 500,
            ErrorKind::InsufficientFunds => 1001,
            ErrorKind::PacketEmpty => 1002,
            ErrorKind::PacketExpired => 1003,
            ErrorKind::AlreadyClaimed => 1004,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::InsufficientFunds => "insufficient_balance",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyClaimed => "already_claimed",
            ErrorKind::PacketEmpty => "packet_empty",
            ErrorKind::PacketExpired => "packet_expired",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl RedPacketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RedPacketError::Database(_) => ErrorKind::Internal,
            RedPacketError::Migration(_) => ErrorKind::Internal,
            RedPacketError::Validation(_) => ErrorKind::Validation,
            RedPacketError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            RedPacketError::PacketNotFound(_) => ErrorKind::NotFound,
            RedPacketError::AccountNotFound(_) => ErrorKind::NotFound,
            RedPacketError::AlreadyClaimed { .. } => ErrorKind::AlreadyClaimed,
            RedPacketError::PacketEmpty(_) => ErrorKind::PacketEmpty,
            RedPacketError::PacketExpired(_) => ErrorKind::PacketExpired,
            RedPacketError::Unauthorized => ErrorKind::Unauthorized,
            RedPacketError::InvariantViolation(_) => ErrorKind::Internal,
            RedPacketError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show to a client. Internal failures stay generic.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for RedPacketError {
    fn from(err: validator::ValidationErrors) -> Self {
        RedPacketError::Validation(err.to_string())
    }
}

impl ResponseError for RedPacketError {
    fn error_response(&self) -> HttpResponse {
        let kind = self.kind();
        if kind == ErrorKind::Internal {
            error!(error = %self, "request failed");
        }

        HttpResponse::build(self.status_code()).json(json!({
            "code": kind.code(),
            "message": self.public_message(),
            "type": kind.as_str(),
            "data": null
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::InsufficientFunds => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyClaimed => StatusCode::CONFLICT,
            ErrorKind::PacketEmpty => StatusCode::GONE,
            ErrorKind::PacketExpired => StatusCode::GONE,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
