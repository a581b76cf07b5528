//! Persistence for the course catalog and per-learner tracking rows.
//!
//! Two backends implement the same traits: an in-memory store used by tests
//! and prototypes, and `SQLite` via `sqlx`.

pub mod memory;
pub mod repository;
pub mod sqlite;
