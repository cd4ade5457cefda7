//! Red packet engine
//!
//! A sender locks funds into a packet; other users claim one share each,
//! split evenly or at random, until the packet runs out or lapses.
//!
//! # Architecture
//!
//! - **Ledger**: conditional debit/credit plus an append-only entry per change
//! - **Packet store**: packet rows with a locking read that serializes claims
//! - **Allocator**: pure share computation over a seedable random source
//! - **Services**: the only writers, one transaction per operation
//!
//! # Invariants
//!
//! - Conservation: Σ(claim amounts) + remaining_amount == total_amount
//! - One claim per (packet, receiver)
//! - Status only moves Active → Empty or Active → Expired
//! - Balances never go negative and every change has one ledger entry
//!   carrying the resulting balance

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod allocator;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod packet_store;
pub mod services;
pub mod store;

pub use allocator::Allocator;
pub use config::Config;
pub use errors::{ErrorKind, RedPacketError, Result};
pub use services::RedPacketService;
pub use store::{MemoryStore, PgStore, Store, StoreTx};
