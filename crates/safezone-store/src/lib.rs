//! # safezone-store
//!
//! Document storage for SafeZone, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model, plus a [`LiveStore`] that shares one database between tasks and
//! pushes fresh snapshots to watchers after every committed write.

pub mod chats;
pub mod database;
pub mod live;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod secure;
pub mod users;

mod codec;
mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use live::{LiveStore, StoreChange, Watch, DEFAULT_WATCH_BUFFER};
pub use models::*;
