//! SQLite-backed journal store and result hydration.

pub mod db;
pub mod hydrate;

pub use db::{JournalStore, StoreStats};
