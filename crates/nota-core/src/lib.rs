//! # nota-core
//!
//! Core types, traits, and abstractions for the nota library.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other nota crates depend on: the domain models
//! (spaces, notes, tags, attributes), the parsed-query AST consumed by
//! the query compiler, the shared error type, and the temporal storage
//! encoding helpers.

pub mod error;
pub mod models;
pub mod query;
pub mod temporal;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use query::{ParsedAttr, ParsedQuery, ParsedTag, ParsedTagFilter, SearchDepth};
pub use temporal::{decode_timestamp, encode_timestamp, timespan_seconds, utc_midnight};
pub use traits::MetadataResolver;
