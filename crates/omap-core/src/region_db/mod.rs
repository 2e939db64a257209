//! Persistent region registry and tile ledger (SQLite via sqlx).
//!
//! Stores region metadata (bounds, zoom range, counters, state) and one
//! ledger row per downloaded tile. The ledger is the source of truth for
//! which tiles exist in the cache; directories are never scanned to infer it.

mod db;
mod ledger;
mod regions;
mod types;

pub use db::RegionDb;
pub use ledger::MarkOutcome;
pub use types::*;
