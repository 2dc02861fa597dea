//! # nota-db
//!
//! SQLite database layer for nota.
//!
//! This crate provides:
//! - Connection pool management for the embedded note store
//! - Schema bootstrap for the note/tag/attribute tables
//! - A read-through metadata cache for name→id resolution
//! - The note query compiler: parsed filter/order expressions in,
//!   executable SQL out
//! - A note repository persisting entity changes and hydrating query
//!   results
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nota_db::{create_pool, ensure_schema, MetadataCache, SqliteNoteRepository};
//! use nota_db::{ParsedQuery, ParsedTag, SearchDepth};
//!
//! #[tokio::main]
//! async fn main() -> nota_db::Result<()> {
//!     let pool = create_pool("notes.db".as_ref()).await?;
//!     ensure_schema(&pool).await?;
//!     let cache = Arc::new(MetadataCache::new(pool.clone()));
//!     let repo = SqliteNoteRepository::new(pool, cache);
//!
//!     let query = ParsedQuery {
//!         where_clause: Some("{tag0}".to_string()),
//!         tags: vec![ParsedTag::new("groceries").at_depth(SearchDepth::Child)],
//!         ..Default::default()
//!     };
//!     for note in repo.list_notes(&query, Some(1)).await? {
//!         println!("{}", note.text);
//!     }
//!     Ok(())
//! }
//! ```

mod literals;
pub mod metadata;
pub mod notes;
pub mod pool;
pub mod query_builder;
pub mod schema;

// Re-export core types
pub use nota_core::*;

pub use metadata::{MetadataCache, MetadataKind};
pub use notes::SqliteNoteRepository;
pub use pool::{create_memory_pool, create_pool, create_pool_with_config, PoolConfig};
pub use query_builder::build_notes_query;
pub use schema::ensure_schema;
