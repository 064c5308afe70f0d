//! # friendnest-store
//!
//! SQLite storage for the FriendNest server.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model.  Operations that must change several rows together (accepting or
//! dissolving a friendship, creating a group with its first member) run in a
//! single transaction.

pub mod database;
pub mod events;
pub mod friend_requests;
pub mod friendships;
pub mod groups;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod sessions;
pub mod stats;
pub mod users;

mod error;
mod sql;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use stats::DashboardCounts;
