//! Database module: models, schema and queries for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `query.rs`: filter / sort / page building for list endpoints
//! - `sqlite.rs`: the `Storage` handle plus keystore/truststore rows
//! - `openid.rs`, `tokens.rs`, `http.rs`: per-area table access

pub mod http;
pub mod models;
pub mod openid;
pub mod query;
pub mod schema;
pub mod sqlite;
pub mod tokens;

pub use query::{ListQuery, Op, Predicate, SortOrder};
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, Storage, StoreKind};
