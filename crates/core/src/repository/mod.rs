//! Item persistence.
//!
//! Items, their payload files and conversion status, scraped metadata,
//! subscriber/admin sets and the crawl offset all live behind the
//! `ItemRepository` trait.

mod sqlite;
mod types;

pub use sqlite::SqliteItemRepository;
pub use types::*;
