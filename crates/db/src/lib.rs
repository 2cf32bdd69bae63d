//! Durable event log for voxflow, backed by SQLite via sqlx.
//!
//! The single `conversation_event` table is append-only; the
//! `(trace_id, sequence_number)` unique constraint is the correctness
//! guard that lets the engine's event bus retry flushes without producing
//! duplicate rows.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{RepositoryError, SqlEventLogRepository};
