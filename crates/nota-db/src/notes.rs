//! Note repository implementation.
//!
//! Persists in-memory entities by diffing their [`EntityState`] against
//! the tables: new entities insert (with id backfill), dirty ones
//! update, deleted ones delete, clean ones are skipped. Write paths
//! invalidate the metadata kinds they touch so name resolution stays
//! read-through.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use nota_core::error::Result;
use nota_core::models::{Attr, AttrType, AttrValue, EntityState, Note, NoteAttr, NoteTag, Space, Tag};
use nota_core::query::ParsedQuery;

use crate::metadata::{MetadataCache, MetadataKind};
use crate::query_builder::build_notes_query;

/// SQLite implementation of note persistence.
pub struct SqliteNoteRepository {
    pool: SqlitePool,
    cache: Arc<MetadataCache>,
}

impl SqliteNoteRepository {
    /// Create a new repository over the given pool and metadata cache.
    pub fn new(pool: SqlitePool, cache: Arc<MetadataCache>) -> Self {
        Self { pool, cache }
    }

    /// Persist a space according to its entity state.
    pub async fn save_space(&self, space: &mut Space) -> Result<()> {
        match space.state {
            EntityState::Clean => return Ok(()),
            EntityState::New => {
                let result = sqlx::query("INSERT INTO Space (name) VALUES (?)")
                    .bind(&space.name)
                    .execute(&self.pool)
                    .await?;
                space.id = result.last_insert_rowid();
                space.state = EntityState::Clean;
            }
            EntityState::Dirty => {
                sqlx::query("UPDATE Space SET name = ? WHERE id = ?")
                    .bind(&space.name)
                    .bind(space.id)
                    .execute(&self.pool)
                    .await?;
                space.state = EntityState::Clean;
            }
            EntityState::Deleted => {
                sqlx::query("DELETE FROM Space WHERE id = ?")
                    .bind(space.id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        self.cache.invalidate(MetadataKind::Spaces).await;
        Ok(())
    }

    /// Persist an attribute definition according to its entity state.
    pub async fn save_attr(&self, attr: &mut Attr) -> Result<()> {
        match attr.state {
            EntityState::Clean => return Ok(()),
            EntityState::New => {
                let result = sqlx::query("INSERT INTO Attr (spaceId, name, type) VALUES (?, ?, ?)")
                    .bind(attr.space_id)
                    .bind(&attr.name)
                    .bind(attr.attr_type.to_db())
                    .execute(&self.pool)
                    .await?;
                attr.id = result.last_insert_rowid();
                attr.state = EntityState::Clean;
            }
            EntityState::Dirty => {
                sqlx::query("UPDATE Attr SET spaceId = ?, name = ?, type = ? WHERE id = ?")
                    .bind(attr.space_id)
                    .bind(&attr.name)
                    .bind(attr.attr_type.to_db())
                    .bind(attr.id)
                    .execute(&self.pool)
                    .await?;
                attr.state = EntityState::Clean;
            }
            EntityState::Deleted => {
                sqlx::query("DELETE FROM Attr WHERE id = ?")
                    .bind(attr.id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        self.cache.invalidate(MetadataKind::Attrs).await;
        Ok(())
    }

    /// Persist a batch of notes with their tag relationships and
    /// attribute values, in one transaction.
    pub async fn save_notes(&self, notes: &mut [Note]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let mut tags_changed = false;

        for note in notes.iter_mut() {
            match note.state {
                EntityState::New => {
                    let result =
                        sqlx::query("INSERT INTO Note (spaceId, text, date) VALUES (?, ?, ?)")
                            .bind(note.space_id)
                            .bind(&note.text)
                            .bind(note.date)
                            .execute(&mut *tx)
                            .await?;
                    note.id = result.last_insert_rowid();
                    note.state = EntityState::Clean;
                }
                EntityState::Dirty => {
                    sqlx::query("UPDATE Note SET spaceId = ?, text = ?, date = ? WHERE id = ?")
                        .bind(note.space_id)
                        .bind(&note.text)
                        .bind(note.date)
                        .bind(note.id)
                        .execute(&mut *tx)
                        .await?;
                    note.state = EntityState::Clean;
                }
                EntityState::Deleted => {
                    sqlx::query("DELETE FROM Note WHERE id = ?")
                        .bind(note.id)
                        .execute(&mut *tx)
                        .await?;
                    tags_changed |= note.own_tag.is_some();
                    continue;
                }
                EntityState::Clean => {}
            }

            let mut drop_own_tag = false;
            if let Some(tag) = note.own_tag.as_mut() {
                // a tag's id always mirrors its backing note
                tag.id = note.id;
                tag.space_id = note.space_id;
                match tag.state {
                    EntityState::New => {
                        sqlx::query("INSERT INTO Tag (id, name) VALUES (?, ?)")
                            .bind(tag.id)
                            .bind(&tag.name)
                            .execute(&mut *tx)
                            .await?;
                        tag.state = EntityState::Clean;
                        tags_changed = true;
                    }
                    EntityState::Dirty => {
                        sqlx::query("UPDATE Tag SET name = ? WHERE id = ?")
                            .bind(&tag.name)
                            .bind(tag.id)
                            .execute(&mut *tx)
                            .await?;
                        tag.state = EntityState::Clean;
                        tags_changed = true;
                    }
                    EntityState::Deleted => {
                        sqlx::query("DELETE FROM Tag WHERE id = ?")
                            .bind(tag.id)
                            .execute(&mut *tx)
                            .await?;
                        drop_own_tag = true;
                        tags_changed = true;
                    }
                    EntityState::Clean => {}
                }
            }
            if drop_own_tag {
                note.own_tag = None;
            }

            for note_tag in note.tags.iter_mut() {
                save_note_tag(&mut tx, note.id, note_tag).await?;
            }
            for note_tag in note.tags_pending_deletion.drain(..) {
                sqlx::query("DELETE FROM NoteTag WHERE noteId = ? AND tagId = ?")
                    .bind(note.id)
                    .bind(note_tag.tag_id)
                    .execute(&mut *tx)
                    .await?;
            }

            for note_attr in note.attrs.iter_mut() {
                save_note_attr(&mut tx, note.id, note_attr).await?;
            }
            for note_attr in note.attrs_pending_deletion.drain(..) {
                sqlx::query(
                    "DELETE FROM NoteAttr WHERE noteId = ? AND attrId = ? AND COALESCE(tagId, 0) = ?",
                )
                .bind(note.id)
                .bind(note_attr.attr_id)
                .bind(note_attr.tag_id.unwrap_or(0))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        if tags_changed {
            self.cache.invalidate(MetadataKind::Tags).await;
        }
        Ok(())
    }

    /// Compile and run a note query, returning fully hydrated notes.
    pub async fn list_notes(
        &self,
        query: &ParsedQuery,
        space_id: Option<i64>,
    ) -> Result<Vec<Note>> {
        let sql = build_notes_query(query, space_id, self.cache.as_ref()).await?;
        debug!(sql = %sql, "compiled note query");
        self.fetch_notes(&sql).await
    }

    /// Compile a note query and count its matches without fetching them.
    pub async fn count_notes(&self, query: &ParsedQuery, space_id: Option<i64>) -> Result<i64> {
        let sql = build_notes_query(query, space_id, self.cache.as_ref()).await?;
        let body = sql.trim_end_matches(';');
        let row = sqlx::query(&format!("SELECT COUNT(*) AS cnt FROM ({body})"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("cnt")?)
    }

    /// Notes carrying the given tag directly.
    pub async fn related_notes(&self, tag_id: i64) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT n.id, n.spaceId, n.text, n.date FROM Note n INNER JOIN NoteTag nt ON nt.noteId = n.id WHERE nt.tagId = {tag_id}"
        );
        self.fetch_notes(&sql).await
    }

    async fn fetch_notes(&self, sql: &str) -> Result<Vec<Note>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let mut notes = Vec::with_capacity(rows.len());
        let mut index_by_id = HashMap::new();
        for row in rows {
            let mut note = Note::new(row.try_get("spaceId")?, row.try_get::<String, _>("text")?, row.try_get("date")?);
            note.id = row.try_get("id")?;
            note.state = EntityState::Clean;
            index_by_id.insert(note.id, notes.len());
            notes.push(note);
        }
        if notes.is_empty() {
            return Ok(notes);
        }

        let ids = notes
            .iter()
            .map(|note| note.id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let own_tag_rows = sqlx::query(&format!(
            "SELECT n.id, t.name, n.spaceId FROM Note n INNER JOIN Tag t ON n.id = t.id WHERE n.id IN ({ids})"
        ))
        .fetch_all(&self.pool)
        .await?;
        for row in own_tag_rows {
            let note_id: i64 = row.try_get("id")?;
            if let Some(&index) = index_by_id.get(&note_id) {
                let mut tag = Tag::new(row.try_get::<String, _>("name")?);
                tag.id = note_id;
                tag.space_id = row.try_get("spaceId")?;
                tag.state = EntityState::Clean;
                notes[index].own_tag = Some(tag);
            }
        }

        let tag_rows = sqlx::query(&format!(
            "SELECT noteId, tagId, data FROM NoteTag WHERE noteId IN ({ids})"
        ))
        .fetch_all(&self.pool)
        .await?;
        for row in tag_rows {
            let note_id: i64 = row.try_get("noteId")?;
            let Some(&index) = index_by_id.get(&note_id) else {
                continue;
            };
            let data = match row.try_get::<Option<String>, _>("data")? {
                Some(raw) => Some(serde_json::from_str::<JsonValue>(&raw)?),
                None => None,
            };
            let mut note_tag = NoteTag::new(row.try_get("tagId")?, data);
            note_tag.state = EntityState::Clean;
            notes[index].tags.push(note_tag);
        }

        let attr_rows = sqlx::query(&format!(
            "SELECT na.noteId, na.attrId, na.tagId, na.value, a.type FROM NoteAttr na INNER JOIN Attr a ON na.attrId = a.id WHERE na.noteId IN ({ids})"
        ))
        .fetch_all(&self.pool)
        .await?;
        for row in attr_rows {
            let note_id: i64 = row.try_get("noteId")?;
            let Some(&index) = index_by_id.get(&note_id) else {
                continue;
            };
            let attr_type = AttrType::from_db(row.try_get("type")?)?;
            let value = AttrValue::decode(attr_type, &row.try_get::<String, _>("value")?)?;
            let mut note_attr = NoteAttr::new(row.try_get("attrId")?, row.try_get("tagId")?, value);
            note_attr.state = EntityState::Clean;
            notes[index].attrs.push(note_attr);
        }

        Ok(notes)
    }
}

async fn save_note_tag(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    note_id: i64,
    note_tag: &mut NoteTag,
) -> Result<()> {
    let data = note_tag
        .data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    match note_tag.state {
        EntityState::New => {
            sqlx::query("INSERT INTO NoteTag (noteId, tagId, data) VALUES (?, ?, ?)")
                .bind(note_id)
                .bind(note_tag.tag_id)
                .bind(data)
                .execute(&mut **tx)
                .await?;
            note_tag.state = EntityState::Clean;
        }
        EntityState::Dirty => {
            sqlx::query("UPDATE NoteTag SET data = ? WHERE noteId = ? AND tagId = ?")
                .bind(data)
                .bind(note_id)
                .bind(note_tag.tag_id)
                .execute(&mut **tx)
                .await?;
            note_tag.state = EntityState::Clean;
        }
        EntityState::Clean | EntityState::Deleted => {}
    }
    Ok(())
}

async fn save_note_attr(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    note_id: i64,
    note_attr: &mut NoteAttr,
) -> Result<()> {
    match note_attr.state {
        EntityState::New => {
            sqlx::query("INSERT INTO NoteAttr (noteId, attrId, value, tagId) VALUES (?, ?, ?, ?)")
                .bind(note_id)
                .bind(note_attr.attr_id)
                .bind(note_attr.value.encode())
                .bind(note_attr.tag_id)
                .execute(&mut **tx)
                .await?;
            note_attr.state = EntityState::Clean;
        }
        EntityState::Dirty => {
            sqlx::query(
                "UPDATE NoteAttr SET value = ? WHERE noteId = ? AND attrId = ? AND COALESCE(tagId, 0) = ?",
            )
            .bind(note_attr.value.encode())
            .bind(note_id)
            .bind(note_attr.attr_id)
            .bind(note_attr.tag_id.unwrap_or(0))
            .execute(&mut **tx)
            .await?;
            note_attr.state = EntityState::Clean;
        }
        EntityState::Clean | EntityState::Deleted => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::create_memory_pool;
    use crate::schema::ensure_schema;
    use nota_core::query::{ParsedTag, ParsedTagFilter, SearchDepth};
    use nota_core::traits::MetadataResolver;
    use serde_json::json;

    async fn repository() -> anyhow::Result<SqliteNoteRepository> {
        let pool = create_memory_pool().await?;
        ensure_schema(&pool).await?;
        let cache = Arc::new(MetadataCache::new(pool.clone()));
        Ok(SqliteNoteRepository::new(pool, cache))
    }

    #[tokio::test]
    async fn test_save_space_backfills_id_and_cleans() -> anyhow::Result<()> {
        let repo = repository().await?;
        let mut space = Space::new("Work");
        repo.save_space(&mut space).await?;
        assert_eq!(space.id, 1);
        assert_eq!(space.state, EntityState::Clean);

        // clean saves are no-ops
        repo.save_space(&mut space).await?;

        space.name = "Office".to_string();
        space.state = EntityState::Dirty;
        repo.save_space(&mut space).await?;
        assert_eq!(repo.cache.resolve_space("Office").await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_attr_and_resolve_type() -> anyhow::Result<()> {
        let repo = repository().await?;
        let mut space = Space::new("Work");
        repo.save_space(&mut space).await?;

        let mut attr = Attr::new(space.id, "status", AttrType::Text);
        repo.save_attr(&mut attr).await?;
        assert_eq!(attr.id, 1);
        assert_eq!(
            repo.cache.resolve_attr("status", space.id).await?,
            (1, AttrType::Text)
        );
        Ok(())
    }

    async fn seed_tagged_note(repo: &SqliteNoteRepository) -> anyhow::Result<(i64, i64)> {
        let mut space = Space::new("Work");
        repo.save_space(&mut space).await?;

        let mut attr = Attr::new(space.id, "status", AttrType::Text);
        repo.save_attr(&mut attr).await?;

        let mut tag_note = Note::new(space.id, "groceries", 100);
        tag_note.set_own_tag("groceries");
        repo.save_notes(std::slice::from_mut(&mut tag_note)).await?;

        let mut note = Note::new(space.id, "buy milk", 200);
        note.add_tag(tag_note.id, Some(json!({"priority": "high"})));
        note.add_attr(attr.id, None, AttrValue::Text("open".to_string()));
        repo.save_notes(std::slice::from_mut(&mut note)).await?;

        Ok((tag_note.id, note.id))
    }

    #[tokio::test]
    async fn test_save_and_list_notes_round_trip() -> anyhow::Result<()> {
        let repo = repository().await?;
        let (tag_id, note_id) = seed_tagged_note(&repo).await?;

        let query = ParsedQuery {
            where_clause: Some("{tag0}".to_string()),
            tags: vec![ParsedTag::new("groceries").at_depth(SearchDepth::Child)],
            ..Default::default()
        };
        let notes = repo.list_notes(&query, Some(1)).await?;
        assert_eq!(notes.len(), 1);

        let note = &notes[0];
        assert_eq!(note.id, note_id);
        assert_eq!(note.text, "buy milk");
        assert_eq!(note.state, EntityState::Clean);
        assert_eq!(note.tags.len(), 1);
        assert_eq!(note.tags[0].tag_id, tag_id);
        assert_eq!(note.tags[0].data, Some(json!({"priority": "high"})));
        assert_eq!(note.attrs.len(), 1);
        assert_eq!(note.attrs[0].value, AttrValue::Text("open".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_notes_hydrates_own_tag() -> anyhow::Result<()> {
        let repo = repository().await?;
        let (tag_id, _) = seed_tagged_note(&repo).await?;

        let query = ParsedQuery {
            where_clause: Some("{tag0}".to_string()),
            tags: vec![ParsedTag::new("groceries").at_depth(SearchDepth::Own)],
            ..Default::default()
        };
        let notes = repo.list_notes(&query, Some(1)).await?;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, tag_id);
        let own_tag = notes[0].own_tag.as_ref().expect("own tag hydrated");
        assert_eq!(own_tag.name, "groceries");
        assert_eq!(own_tag.space_id, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_notes_with_data_filter() -> anyhow::Result<()> {
        let repo = repository().await?;
        let (tag_id, note_id) = seed_tagged_note(&repo).await?;

        // a second note whose relationship data misses the filter
        let mut other = Note::new(1, "buy bread", 300);
        other.add_tag(tag_id, Some(json!({"priority": "low"})));
        repo.save_notes(std::slice::from_mut(&mut other)).await?;

        let query = ParsedQuery {
            where_clause: Some("{tag0}".to_string()),
            tags: vec![ParsedTag::new("groceries")
                .at_depth(SearchDepth::Child)
                .with_filter(ParsedTagFilter::new(
                    "{exp0} = 'high'",
                    vec!["priority".to_string()],
                ))],
            ..Default::default()
        };
        let notes = repo.list_notes(&query, Some(1)).await?;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, note_id);
        Ok(())
    }

    #[tokio::test]
    async fn test_count_notes() -> anyhow::Result<()> {
        let repo = repository().await?;
        seed_tagged_note(&repo).await?;

        let all = ParsedQuery::new();
        assert_eq!(repo.count_notes(&all, Some(1)).await?, 2);

        let tagged = ParsedQuery {
            where_clause: Some("{tag0}".to_string()),
            tags: vec![ParsedTag::new("groceries").at_depth(SearchDepth::Child)],
            ..Default::default()
        };
        assert_eq!(repo.count_notes(&tagged, Some(1)).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_related_notes() -> anyhow::Result<()> {
        let repo = repository().await?;
        let (tag_id, note_id) = seed_tagged_note(&repo).await?;

        let related = repo.related_notes(tag_id).await?;
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, note_id);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_tag_persists_deletion() -> anyhow::Result<()> {
        let repo = repository().await?;
        let (tag_id, _) = seed_tagged_note(&repo).await?;

        let tagged = ParsedQuery {
            where_clause: Some("{tag0}".to_string()),
            tags: vec![ParsedTag::new("groceries").at_depth(SearchDepth::Child)],
            ..Default::default()
        };
        let mut notes = repo.list_notes(&tagged, Some(1)).await?;
        assert_eq!(notes.len(), 1);

        notes[0].remove_tag(tag_id);
        repo.save_notes(&mut notes).await?;

        assert_eq!(repo.count_notes(&tagged, Some(1)).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_deleted_note_cascades_relationships() -> anyhow::Result<()> {
        let repo = repository().await?;
        let (_, note_id) = seed_tagged_note(&repo).await?;

        let all = ParsedQuery::new();
        let mut notes = repo.list_notes(&all, Some(1)).await?;
        let note = notes
            .iter_mut()
            .find(|n| n.id == note_id)
            .expect("seeded note present");
        note.mark_deleted();
        repo.save_notes(&mut notes).await?;

        assert_eq!(repo.count_notes(&all, Some(1)).await?, 1);
        let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM NoteTag")
            .fetch_one(&repo.pool)
            .await?;
        assert_eq!(remaining, 0);
        Ok(())
    }
}
