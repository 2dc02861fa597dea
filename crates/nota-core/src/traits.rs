//! Core traits for nota abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::AttrType;

/// Name-to-identifier resolution for spaces, tags and attributes.
///
/// The query compiler consumes this to turn the names appearing in a
/// parsed query into the integer identifiers it inlines into SQL. A
/// lookup may suspend to refresh backing metadata, but it must be
/// read-only; resolution failures surface as [`crate::Error::NotFound`].
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Resolve a space name to its id.
    async fn resolve_space(&self, name: &str) -> Result<i64>;

    /// Resolve a tag name inside one space.
    async fn resolve_tag(&self, name: &str, space_id: i64) -> Result<i64>;

    /// Resolve a tag name across all spaces. Used for unqualified
    /// references in cross-space queries; more than one match means the
    /// reference is ambiguous.
    async fn resolve_tags_by_name(&self, name: &str) -> Result<Vec<i64>>;

    /// Resolve an attribute name inside one space to its id and declared
    /// type.
    async fn resolve_attr(&self, name: &str, space_id: i64) -> Result<(i64, AttrType)>;

    /// Resolve an attribute name across all spaces.
    async fn resolve_attrs_by_name(&self, name: &str) -> Result<Vec<(i64, AttrType)>>;
}
