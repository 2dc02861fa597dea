//! Core data models for nota.
//!
//! These types are shared across all nota crates and represent the core
//! domain entities: spaces, notes, tags (each tag is backed by a note),
//! and typed attributes.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::temporal::{decode_timestamp, encode_timestamp};

// =============================================================================
// ENTITY CHANGE TRACKING
// =============================================================================

/// Lifecycle state of an in-memory entity relative to its table row.
///
/// The repository diffs this state on save: `New` inserts, `Dirty` updates,
/// `Deleted` deletes, `Clean` is skipped. Saved entities are marked clean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityState {
    #[default]
    New,
    Clean,
    Dirty,
    Deleted,
}

// =============================================================================
// SPACE
// =============================================================================

/// A namespace scoping tags and attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub state: EntityState,
}

impl Space {
    /// Create a new, not-yet-persisted space.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            state: EntityState::New,
        }
    }
}

// =============================================================================
// TAG
// =============================================================================

/// A tag record backing a note.
///
/// A tag's id always equals the id of the note that owns it; the tag's
/// space is the owning note's space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub space_id: i64,
    #[serde(default)]
    pub state: EntityState,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            space_id: 0,
            state: EntityState::New,
        }
    }
}

// =============================================================================
// ATTRIBUTE
// =============================================================================

/// Declared type of an attribute.
///
/// The integer mapping is the storage encoding of the `Attr.type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttrType {
    Text,
    Number,
    Boolean,
    Date,
}

impl AttrType {
    /// The storage encoding of the type discriminator column.
    pub fn to_db(self) -> i64 {
        match self {
            Self::Text => 1,
            Self::Number => 2,
            Self::Boolean => 3,
            Self::Date => 4,
        }
    }

    /// Decode the type discriminator column.
    pub fn from_db(value: i64) -> Result<Self> {
        match value {
            1 => Ok(Self::Text),
            2 => Ok(Self::Number),
            3 => Ok(Self::Boolean),
            4 => Ok(Self::Date),
            other => Err(Error::InvalidInput(format!(
                "unrecognised attribute type: {other}"
            ))),
        }
    }

    /// The SQL type a stored value of this attribute casts to in queries.
    ///
    /// Booleans and dates are both stored as integers (0/1 and epoch
    /// seconds respectively), so both cast to INTEGER.
    pub fn sql_cast_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Number => "NUMERIC",
            Self::Boolean | Self::Date => "INTEGER",
        }
    }
}

/// An attribute definition: a named, typed value slot scoped to a space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attr {
    pub id: i64,
    pub space_id: i64,
    pub name: String,
    pub attr_type: AttrType,
    #[serde(default)]
    pub state: EntityState,
}

impl Attr {
    pub fn new(space_id: i64, name: impl Into<String>, attr_type: AttrType) -> Self {
        Self {
            id: 0,
            space_id,
            name: name.into(),
            attr_type,
            state: EntityState::New,
        }
    }
}

/// A typed attribute value, convertible to and from the TEXT storage column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(chrono::DateTime<chrono::Utc>),
}

impl AttrValue {
    /// Encode for the storage column: booleans as 0/1, dates as epoch
    /// seconds, numbers and text verbatim.
    pub fn encode(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Boolean(true) => "1".to_string(),
            Self::Boolean(false) => "0".to_string(),
            Self::Date(dt) => encode_timestamp(*dt).to_string(),
        }
    }

    /// Decode a storage column value under the attribute's declared type.
    pub fn decode(attr_type: AttrType, raw: &str) -> Result<Self> {
        match attr_type {
            AttrType::Text => Ok(Self::Text(raw.to_string())),
            AttrType::Number => raw
                .parse::<f64>()
                .map(Self::Number)
                .map_err(|_| Error::InvalidInput(format!("invalid numeric value: {raw}"))),
            AttrType::Boolean => match raw.parse::<i64>() {
                Ok(n) => Ok(Self::Boolean(n > 0)),
                Err(_) => Err(Error::InvalidInput(format!("invalid boolean value: {raw}"))),
            },
            AttrType::Date => {
                let secs = raw
                    .parse::<i64>()
                    .map_err(|_| Error::InvalidInput(format!("invalid date value: {raw}")))?;
                Ok(Self::Date(decode_timestamp(secs)?))
            }
        }
    }
}

// =============================================================================
// NOTE
// =============================================================================

/// A note's relationship to one tag, optionally carrying a JSON data blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteTag {
    pub tag_id: i64,
    pub data: Option<JsonValue>,
    #[serde(default)]
    pub state: EntityState,
}

impl NoteTag {
    pub fn new(tag_id: i64, data: Option<JsonValue>) -> Self {
        Self {
            tag_id,
            data,
            state: EntityState::New,
        }
    }
}

/// An attribute value attached to a note.
///
/// `tag_id` scopes the value to one specific tag relationship on the note;
/// `None` means the value is attached to the note directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteAttr {
    pub attr_id: i64,
    pub tag_id: Option<i64>,
    pub value: AttrValue,
    #[serde(default)]
    pub state: EntityState,
}

impl NoteAttr {
    pub fn new(attr_id: i64, tag_id: Option<i64>, value: AttrValue) -> Self {
        Self {
            attr_id,
            tag_id,
            value,
            state: EntityState::New,
        }
    }
}

/// A note: free-form text with a date, belonging to a space, carrying tag
/// relationships and attribute values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub space_id: i64,
    pub text: String,
    /// Epoch seconds.
    pub date: i64,
    /// Present when this note backs a tag.
    pub own_tag: Option<Tag>,
    pub tags: Vec<NoteTag>,
    pub attrs: Vec<NoteAttr>,
    #[serde(skip)]
    pub tags_pending_deletion: Vec<NoteTag>,
    #[serde(skip)]
    pub attrs_pending_deletion: Vec<NoteAttr>,
    #[serde(default)]
    pub state: EntityState,
}

impl Note {
    /// Create a new, not-yet-persisted note.
    pub fn new(space_id: i64, text: impl Into<String>, date: i64) -> Self {
        Self {
            id: 0,
            space_id,
            text: text.into(),
            date,
            own_tag: None,
            tags: Vec::new(),
            attrs: Vec::new(),
            tags_pending_deletion: Vec::new(),
            attrs_pending_deletion: Vec::new(),
            state: EntityState::New,
        }
    }

    /// Turn this note into a tag by attaching an own-tag record.
    ///
    /// The tag id is synchronized with the note id at save time.
    pub fn set_own_tag(&mut self, name: impl Into<String>) -> &mut Self {
        let mut tag = Tag::new(name);
        tag.id = self.id;
        tag.space_id = self.space_id;
        self.own_tag = Some(tag);
        self
    }

    /// Attach a tag relationship, optionally carrying relationship data.
    pub fn add_tag(&mut self, tag_id: i64, data: Option<JsonValue>) -> &mut Self {
        self.tags.push(NoteTag::new(tag_id, data));
        self
    }

    /// Detach a tag relationship; the removal is applied on save.
    pub fn remove_tag(&mut self, tag_id: i64) -> &mut Self {
        if let Some(pos) = self.tags.iter().position(|nt| nt.tag_id == tag_id) {
            self.tags_pending_deletion.push(self.tags.remove(pos));
        }
        self
    }

    /// Attach an attribute value, optionally scoped to a tag relationship.
    pub fn add_attr(&mut self, attr_id: i64, tag_id: Option<i64>, value: AttrValue) -> &mut Self {
        self.attrs.push(NoteAttr::new(attr_id, tag_id, value));
        self
    }

    /// Remove an attribute value; the removal is applied on save.
    pub fn remove_attr(&mut self, attr_id: i64, tag_id: Option<i64>) -> &mut Self {
        if let Some(pos) = self
            .attrs
            .iter()
            .position(|na| na.attr_id == attr_id && na.tag_id == tag_id)
        {
            self.attrs_pending_deletion.push(self.attrs.remove(pos));
        }
        self
    }

    /// Flag the note row for update on the next save.
    pub fn mark_dirty(&mut self) -> &mut Self {
        if self.state == EntityState::Clean {
            self.state = EntityState::Dirty;
        }
        self
    }

    /// Flag the note row for deletion on the next save.
    pub fn mark_deleted(&mut self) -> &mut Self {
        self.state = EntityState::Deleted;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    #[test]
    fn test_attr_type_db_round_trip() {
        for ty in [
            AttrType::Text,
            AttrType::Number,
            AttrType::Boolean,
            AttrType::Date,
        ] {
            assert_eq!(AttrType::from_db(ty.to_db()).unwrap(), ty);
        }
        assert!(AttrType::from_db(9).is_err());
    }

    #[test]
    fn test_attr_type_sql_cast() {
        assert_eq!(AttrType::Text.sql_cast_type(), "TEXT");
        assert_eq!(AttrType::Number.sql_cast_type(), "NUMERIC");
        assert_eq!(AttrType::Boolean.sql_cast_type(), "INTEGER");
        assert_eq!(AttrType::Date.sql_cast_type(), "INTEGER");
    }

    #[test]
    fn test_attr_value_boolean_encoding() {
        assert_eq!(AttrValue::Boolean(true).encode(), "1");
        assert_eq!(AttrValue::Boolean(false).encode(), "0");
        assert_eq!(
            AttrValue::decode(AttrType::Boolean, "1").unwrap(),
            AttrValue::Boolean(true)
        );
        assert_eq!(
            AttrValue::decode(AttrType::Boolean, "0").unwrap(),
            AttrValue::Boolean(false)
        );
    }

    #[test]
    fn test_attr_value_date_encoding() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 9, 22, 50, 0).unwrap();
        let value = AttrValue::Date(dt);
        assert_eq!(value.encode(), "1717973400");
        assert_eq!(AttrValue::decode(AttrType::Date, "1717973400").unwrap(), value);
    }

    #[test]
    fn test_attr_value_decode_rejects_garbage() {
        assert!(AttrValue::decode(AttrType::Number, "abc").is_err());
        assert!(AttrValue::decode(AttrType::Date, "not-a-date").is_err());
    }

    #[test]
    fn test_note_remove_tag_moves_to_pending() {
        let mut note = Note::new(1, "hello", 0);
        note.add_tag(7, None);
        note.state = EntityState::Clean;
        note.remove_tag(7);
        assert!(note.tags.is_empty());
        assert_eq!(note.tags_pending_deletion.len(), 1);
        assert_eq!(note.tags_pending_deletion[0].tag_id, 7);
    }

    #[test]
    fn test_note_mark_dirty_only_when_clean() {
        let mut note = Note::new(1, "hello", 0);
        note.mark_dirty();
        assert_eq!(note.state, EntityState::New);
        note.state = EntityState::Clean;
        note.mark_dirty();
        assert_eq!(note.state, EntityState::Dirty);
    }
}
