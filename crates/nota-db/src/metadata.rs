//! Read-through metadata cache for space, tag and attribute lookups.
//!
//! The query compiler resolves names to ids on every compilation, so the
//! id mappings are cached in memory per kind. A lookup that misses the
//! cached snapshot repopulates that kind from the store and retries once
//! before failing; write paths call [`MetadataCache::invalidate`] for the
//! kinds they touch. The cache is injected wherever resolution is
//! needed — there is no ambient global state.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::debug;

use nota_core::error::{Error, Result};
use nota_core::models::AttrType;
use nota_core::traits::MetadataResolver;

/// Which cached metadata snapshot to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Spaces,
    Tags,
    Attrs,
}

#[derive(Debug, Clone)]
struct SpaceRow {
    id: i64,
    name: String,
}

#[derive(Debug, Clone)]
struct TagRow {
    id: i64,
    name: String,
    space_id: i64,
}

#[derive(Debug, Clone)]
struct AttrRow {
    id: i64,
    name: String,
    space_id: i64,
    attr_type: AttrType,
}

/// Cached name→id metadata backed by the note store.
pub struct MetadataCache {
    pool: SqlitePool,
    spaces: RwLock<Option<Vec<SpaceRow>>>,
    tags: RwLock<Option<Vec<TagRow>>>,
    attrs: RwLock<Option<Vec<AttrRow>>>,
}

impl MetadataCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            spaces: RwLock::new(None),
            tags: RwLock::new(None),
            attrs: RwLock::new(None),
        }
    }

    /// Drop one kind's snapshot; the next lookup repopulates it.
    pub async fn invalidate(&self, kind: MetadataKind) {
        debug!(?kind, "metadata snapshot invalidated");
        match kind {
            MetadataKind::Spaces => *self.spaces.write().await = None,
            MetadataKind::Tags => *self.tags.write().await = None,
            MetadataKind::Attrs => *self.attrs.write().await = None,
        }
    }

    async fn load_spaces(&self) -> Result<Vec<SpaceRow>> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM Space")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| SpaceRow { id, name })
            .collect())
    }

    async fn load_tags(&self) -> Result<Vec<TagRow>> {
        let rows: Vec<(i64, String, i64)> =
            sqlx::query_as("SELECT n.id, t.name, n.spaceId FROM Note n INNER JOIN Tag t ON n.id = t.id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, space_id)| TagRow { id, name, space_id })
            .collect())
    }

    async fn load_attrs(&self) -> Result<Vec<AttrRow>> {
        let rows: Vec<(i64, String, i64, i64)> =
            sqlx::query_as("SELECT id, name, spaceId, type FROM Attr")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|(id, name, space_id, ty)| {
                Ok(AttrRow {
                    id,
                    name,
                    space_id,
                    attr_type: AttrType::from_db(ty)?,
                })
            })
            .collect()
    }

    fn find_space(rows: &[SpaceRow], name: &str) -> Option<i64> {
        rows.iter().find(|row| row.name == name).map(|row| row.id)
    }

    fn find_tag(rows: &[TagRow], name: &str, space_id: i64) -> Option<i64> {
        rows.iter()
            .find(|row| row.name == name && row.space_id == space_id)
            .map(|row| row.id)
    }

    fn find_attr(rows: &[AttrRow], name: &str, space_id: i64) -> Option<(i64, AttrType)> {
        rows.iter()
            .find(|row| row.name == name && row.space_id == space_id)
            .map(|row| (row.id, row.attr_type))
    }
}

#[async_trait]
impl MetadataResolver for MetadataCache {
    async fn resolve_space(&self, name: &str) -> Result<i64> {
        if let Some(rows) = self.spaces.read().await.as_ref() {
            if let Some(id) = Self::find_space(rows, name) {
                return Ok(id);
            }
        }
        let rows = self.load_spaces().await?;
        let found = Self::find_space(&rows, name);
        *self.spaces.write().await = Some(rows);
        found.ok_or_else(|| Error::NotFound(format!("space '{name}'")))
    }

    async fn resolve_tag(&self, name: &str, space_id: i64) -> Result<i64> {
        if let Some(rows) = self.tags.read().await.as_ref() {
            if let Some(id) = Self::find_tag(rows, name, space_id) {
                return Ok(id);
            }
        }
        let rows = self.load_tags().await?;
        let found = Self::find_tag(&rows, name, space_id);
        *self.tags.write().await = Some(rows);
        found.ok_or_else(|| Error::NotFound(format!("tag '{name}' in space {space_id}")))
    }

    async fn resolve_tags_by_name(&self, name: &str) -> Result<Vec<i64>> {
        if let Some(rows) = self.tags.read().await.as_ref() {
            let ids: Vec<i64> = rows
                .iter()
                .filter(|row| row.name == name)
                .map(|row| row.id)
                .collect();
            if !ids.is_empty() {
                return Ok(ids);
            }
        }
        let rows = self.load_tags().await?;
        let ids: Vec<i64> = rows
            .iter()
            .filter(|row| row.name == name)
            .map(|row| row.id)
            .collect();
        *self.tags.write().await = Some(rows);
        Ok(ids)
    }

    async fn resolve_attr(&self, name: &str, space_id: i64) -> Result<(i64, AttrType)> {
        if let Some(rows) = self.attrs.read().await.as_ref() {
            if let Some(found) = Self::find_attr(rows, name, space_id) {
                return Ok(found);
            }
        }
        let rows = self.load_attrs().await?;
        let found = Self::find_attr(&rows, name, space_id);
        *self.attrs.write().await = Some(rows);
        found.ok_or_else(|| Error::NotFound(format!("attr '{name}' in space {space_id}")))
    }

    async fn resolve_attrs_by_name(&self, name: &str) -> Result<Vec<(i64, AttrType)>> {
        if let Some(rows) = self.attrs.read().await.as_ref() {
            let found: Vec<(i64, AttrType)> = rows
                .iter()
                .filter(|row| row.name == name)
                .map(|row| (row.id, row.attr_type))
                .collect();
            if !found.is_empty() {
                return Ok(found);
            }
        }
        let rows = self.load_attrs().await?;
        let found = rows
            .iter()
            .filter(|row| row.name == name)
            .map(|row| (row.id, row.attr_type))
            .collect();
        *self.attrs.write().await = Some(rows);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::create_memory_pool;
    use crate::schema::ensure_schema;

    async fn seeded_cache() -> anyhow::Result<MetadataCache> {
        let pool = create_memory_pool().await?;
        ensure_schema(&pool).await?;

        sqlx::query("INSERT INTO Space (name) VALUES ('Work'), ('Home')")
            .execute(&pool)
            .await?;
        sqlx::query("INSERT INTO Note (spaceId, text, date) VALUES (1, 'todo', 0)")
            .execute(&pool)
            .await?;
        sqlx::query("INSERT INTO Tag (id, name) VALUES (1, 'todo')")
            .execute(&pool)
            .await?;
        sqlx::query("INSERT INTO Attr (spaceId, name, type) VALUES (1, 'status', 1)")
            .execute(&pool)
            .await?;

        Ok(MetadataCache::new(pool))
    }

    #[tokio::test]
    async fn test_resolves_seeded_metadata() -> anyhow::Result<()> {
        let cache = seeded_cache().await?;
        assert_eq!(cache.resolve_space("Work").await?, 1);
        assert_eq!(cache.resolve_space("Home").await?, 2);
        assert_eq!(cache.resolve_tag("todo", 1).await?, 1);
        assert_eq!(cache.resolve_attr("status", 1).await?, (1, AttrType::Text));
        assert_eq!(cache.resolve_tags_by_name("todo").await?, vec![1]);
        Ok(())
    }

    #[tokio::test]
    async fn test_miss_reads_through_to_fresh_rows() -> anyhow::Result<()> {
        let cache = seeded_cache().await?;
        // populate the snapshot
        cache.resolve_space("Work").await?;

        sqlx::query("INSERT INTO Space (name) VALUES ('Archive')")
            .execute(&cache.pool)
            .await?;
        // unknown name misses the snapshot and triggers a refresh
        assert_eq!(cache.resolve_space("Archive").await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_name_fails_after_refresh() -> anyhow::Result<()> {
        let cache = seeded_cache().await?;
        let err = cache.resolve_space("Nowhere").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = cache.resolve_tag("missing", 1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_snapshot_is_stale_until_invalidated() -> anyhow::Result<()> {
        let cache = seeded_cache().await?;
        cache.resolve_space("Work").await?;

        sqlx::query("UPDATE Space SET name = 'Office' WHERE id = 1")
            .execute(&cache.pool)
            .await?;

        // cached snapshot still answers for the old name
        assert_eq!(cache.resolve_space("Work").await?, 1);

        cache.invalidate(MetadataKind::Spaces).await;
        assert_eq!(cache.resolve_space("Office").await?, 1);
        assert!(cache.resolve_space("Work").await.is_err());
        Ok(())
    }
}
