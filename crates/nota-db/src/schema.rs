//! Note storage schema bootstrap.
//!
//! Tag ids equal their backing note's id, which is why `Tag.id` is both
//! primary key and foreign key into `Note`. Relationship data is stored
//! as nullable JSON text on `NoteTag`; attribute values as text on
//! `NoteAttr`, decoded under the attribute's declared type.

use sqlx::SqlitePool;
use tracing::{debug, info};

use nota_core::Result;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE Space (
        id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL
    )",
    "CREATE TABLE Note (
        id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
        spaceId INTEGER NOT NULL,
        text TEXT NOT NULL,
        date INTEGER NOT NULL,
        FOREIGN KEY (spaceId) REFERENCES Space(id) ON DELETE CASCADE
    )",
    "CREATE INDEX Note_spaceId ON Note(spaceId)",
    "CREATE INDEX Note_date ON Note(date)",
    "CREATE TABLE Tag (
        id INTEGER NOT NULL,
        name TEXT NOT NULL,
        PRIMARY KEY (id),
        FOREIGN KEY (id) REFERENCES Note(id) ON DELETE CASCADE
    )",
    "CREATE TABLE NoteTag (
        noteId INTEGER NOT NULL,
        tagId INTEGER NOT NULL,
        data TEXT NULL,
        PRIMARY KEY (noteId, tagId),
        FOREIGN KEY (noteId) REFERENCES Note(id) ON DELETE CASCADE,
        FOREIGN KEY (tagId) REFERENCES Tag(id) ON DELETE CASCADE
    )",
    "CREATE INDEX NoteTag_noteId ON NoteTag(noteId)",
    "CREATE INDEX NoteTag_tagId ON NoteTag(tagId)",
    "CREATE TABLE Attr (
        id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
        spaceId INTEGER NOT NULL,
        name TEXT NOT NULL,
        type INTEGER NOT NULL,
        FOREIGN KEY (spaceId) REFERENCES Space(id) ON DELETE CASCADE
    )",
    "CREATE INDEX Attr_spaceId ON Attr(spaceId)",
    "CREATE TABLE NoteAttr (
        noteId INTEGER NOT NULL,
        attrId INTEGER NOT NULL,
        value TEXT NOT NULL,
        tagId INTEGER NULL,
        PRIMARY KEY (noteId, attrId, tagId),
        FOREIGN KEY (noteId) REFERENCES Note(id) ON DELETE CASCADE,
        FOREIGN KEY (attrId) REFERENCES Attr(id) ON DELETE CASCADE,
        FOREIGN KEY (tagId) REFERENCES Tag(id) ON DELETE CASCADE
    )",
    "CREATE INDEX NoteAttr_noteId ON NoteAttr(noteId)",
    "CREATE INDEX NoteAttr_attrId ON NoteAttr(attrId)",
    "CREATE INDEX NoteAttr_tagId ON NoteAttr(tagId)",
];

/// Create the note storage tables and indexes if they do not exist yet.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    let existing =
        sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'Note'")
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        debug!("note storage schema already present");
        return Ok(());
    }

    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("note storage schema created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::create_memory_pool;

    #[tokio::test]
    async fn test_ensure_schema_creates_tables() -> anyhow::Result<()> {
        let pool = create_memory_pool().await?;
        ensure_schema(&pool).await?;

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await?;
        let names: Vec<&str> = rows.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(names, vec!["Attr", "Note", "NoteAttr", "NoteTag", "Space", "Tag"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() -> anyhow::Result<()> {
        let pool = create_memory_pool().await?;
        ensure_schema(&pool).await?;
        ensure_schema(&pool).await?;
        Ok(())
    }
}
