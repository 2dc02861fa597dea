//! Note query compilation.
//!
//! Turns a [`ParsedQuery`] into the single SQL SELECT executed against
//! the note storage schema. Tag references become relationship
//! subqueries (self-joins for two-hop traversal), attribute references
//! become EXISTS tests or typed scalar subqueries, and resolved integer
//! identifiers are inlined directly — they are `i64` end-to-end, so no
//! parameter binding is needed for them. Literal values written by the
//! user inside the template are left untouched.
//!
//! Templates are lexed into text/placeholder tokens and substituted by
//! token, so a substituted expression can never be corrupted by
//! containing another placeholder's literal text. The WHERE and ORDER
//! sections are rendered independently: a tag reference in WHERE becomes
//! a boolean expression, in ORDER BY a scalar sort key.

use once_cell::sync::Lazy;
use regex::Regex;

use nota_core::error::{Error, Result};
use nota_core::query::{ParsedAttr, ParsedQuery, ParsedTag, ParsedTagFilter, SearchDepth};
use nota_core::traits::MetadataResolver;

use crate::literals::rewrite_literals;

/// Fixed projection and join base of every compiled note query. The Tag
/// join is present because a note may itself be a tag and
/// self-referencing predicates rely on it.
const SELECT_BASE: &str = "SELECT n.id, n.spaceId, n.text, n.date FROM Note n LEFT JOIN Tag t ON n.id = t.id";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(tag|attr)(\d+)\}").expect("placeholder pattern"));

static EXP_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{exp(\d+)\}").expect("exp placeholder pattern"));

/// Compile a parsed query into executable SQL.
///
/// `space_id` scopes the result to one space and is the default space
/// for resolving unqualified tag/attribute names; `None` compiles a
/// cross-space query in which unqualified names resolve globally and
/// must be unique.
pub async fn build_notes_query(
    query: &ParsedQuery,
    space_id: Option<i64>,
    resolver: &dyn MetadataResolver,
) -> Result<String> {
    let mut sql = String::from(SELECT_BASE);

    let where_sql = match template_of(&query.where_clause) {
        Some(template) => Some(render_section(query, template, Section::Where, space_id, resolver).await?),
        None => None,
    };
    let order_sql = match template_of(&query.order_clause) {
        Some(template) => Some(render_section(query, template, Section::Order, space_id, resolver).await?),
        None => None,
    };

    let mut predicates = Vec::new();
    if let Some(sid) = space_id {
        predicates.push(format!("n.spaceId = {sid}"));
    }
    if let Some(w) = where_sql {
        predicates.push(format!("({w})"));
    }
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }
    if let Some(o) = order_sql {
        sql.push_str(" ORDER BY ");
        sql.push_str(&o);
    }

    // literals are rewritten over the fully substituted text so both
    // clauses are normalized uniformly
    let mut sql = rewrite_literals(&sql);
    sql.push(';');
    Ok(sql)
}

fn template_of(clause: &Option<String>) -> Option<&str> {
    clause.as_deref().filter(|t| !t.trim().is_empty())
}

/// Which statement section a template is rendered for. Tag placeholders
/// substitute differently in the two sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Where,
    Order,
}

/// One lexed token of a WHERE/ORDER template.
#[derive(Debug, PartialEq, Eq)]
enum TemplateToken<'a> {
    Text(&'a str),
    Tag(usize),
    Attr(usize),
}

fn tokenize_template(template: &str) -> Vec<TemplateToken<'_>> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for m in PLACEHOLDER.find_iter(template) {
        if m.start() > last {
            tokens.push(TemplateToken::Text(&template[last..m.start()]));
        }
        // "{tag<i>}" or "{attr<i>}"
        let body = &template[m.start() + 1..m.end() - 1];
        let token = match body.strip_prefix("tag") {
            Some(digits) => TemplateToken::Tag(digits.parse().unwrap_or(usize::MAX)),
            None => {
                let digits = body.strip_prefix("attr").unwrap_or(body);
                TemplateToken::Attr(digits.parse().unwrap_or(usize::MAX))
            }
        };
        tokens.push(token);
        last = m.end();
    }
    if last < template.len() {
        tokens.push(TemplateToken::Text(&template[last..]));
    }
    tokens
}

async fn render_section(
    query: &ParsedQuery,
    template: &str,
    section: Section,
    space_id: Option<i64>,
    resolver: &dyn MetadataResolver,
) -> Result<String> {
    let mut out = String::new();
    for token in tokenize_template(template) {
        match token {
            TemplateToken::Text(text) => out.push_str(text),
            TemplateToken::Tag(index) => {
                let tag = query.tags.get(index).ok_or_else(|| {
                    Error::InvalidInput(format!("tag placeholder {index} has no tag reference"))
                })?;
                out.push_str(&tag_expression(tag, section, space_id, resolver).await?);
            }
            TemplateToken::Attr(index) => {
                let attr = query.attrs.get(index).ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "attr placeholder {index} has no attribute reference"
                    ))
                })?;
                out.push_str(&attr_expression(attr, space_id, resolver).await?);
            }
        }
    }
    Ok(out)
}

// =============================================================================
// TAG EXPRESSIONS
// =============================================================================

/// Resolve a tag reference to its id: explicit space qualifier first,
/// then the query's default space, then a global lookup that must be
/// unique.
async fn resolve_tag_id(
    tag: &ParsedTag,
    space_id: Option<i64>,
    resolver: &dyn MetadataResolver,
) -> Result<i64> {
    if let Some(space_name) = &tag.space {
        let sid = resolver.resolve_space(space_name).await?;
        return resolver.resolve_tag(&tag.name, sid).await;
    }
    if let Some(sid) = space_id {
        return resolver.resolve_tag(&tag.name, sid).await;
    }
    let matches = resolver.resolve_tags_by_name(&tag.name).await?;
    match matches.as_slice() {
        [] => Err(Error::NotFound(format!("tag '{}'", tag.name))),
        [id] => Ok(*id),
        _ => Err(Error::AmbiguousName(tag.name.clone())),
    }
}

async fn tag_expression(
    tag: &ParsedTag,
    section: Section,
    space_id: Option<i64>,
    resolver: &dyn MetadataResolver,
) -> Result<String> {
    let tag_id = resolve_tag_id(tag, space_id, resolver).await?;
    match section {
        Section::Where => where_tag_expression(tag, tag_id),
        Section::Order => order_tag_expression(tag, tag_id),
    }
}

/// Boolean relationship test for one tag reference. Depths are OR'ed;
/// a multi-depth group is parenthesized so it composes inside the
/// surrounding template.
fn where_tag_expression(tag: &ParsedTag, tag_id: i64) -> Result<String> {
    if tag.search_depths.is_empty() {
        return Err(Error::InvalidInput(format!(
            "tag '{}' has no search depth",
            tag.name
        )));
    }
    let mut parts = Vec::with_capacity(tag.search_depths.len());
    for depth in &tag.search_depths {
        parts.push(depth_expression(*depth, tag_id, tag.filter.as_ref())?);
    }
    if parts.len() == 1 {
        Ok(parts.remove(0))
    } else {
        Ok(format!("({})", parts.join(" OR ")))
    }
}

fn depth_expression(
    depth: SearchDepth,
    tag_id: i64,
    filter: Option<&ParsedTagFilter>,
) -> Result<String> {
    match depth {
        SearchDepth::Own => Ok(format!("n.id = {tag_id}")),
        SearchDepth::Child => {
            let predicate = data_predicate(filter, "nt")?;
            Ok(format!(
                "EXISTS(SELECT 1 FROM NoteTag nt WHERE nt.noteId = n.id AND nt.tagId = {tag_id}{predicate})"
            ))
        }
        SearchDepth::Grandchild => {
            // the data predicate binds to the relationship nearest the
            // queried note (nt1), not the one matching the target tag
            let predicate = data_predicate(filter, "nt1")?;
            Ok(format!(
                "EXISTS(SELECT 1 FROM NoteTag nt1 JOIN NoteTag nt2 ON nt2.noteId = nt1.tagId WHERE nt1.noteId = n.id AND nt2.tagId = {tag_id}{predicate})"
            ))
        }
    }
}

/// Scalar sort key for one tag reference in an ORDER BY template.
/// Exactly one search depth is required; the subquery has the same join
/// shape as the WHERE form but no EXISTS wrapper, so the surrounding
/// template's ASC/DESC applies to it directly.
fn order_tag_expression(tag: &ParsedTag, tag_id: i64) -> Result<String> {
    if tag.search_depths.len() != 1 {
        return Err(Error::InvalidOrder(format!(
            "tag '{}' must use exactly one search depth when ordering",
            tag.name
        )));
    }
    let depth = match tag.search_depths.iter().next() {
        Some(depth) => *depth,
        None => {
            return Err(Error::InvalidOrder(format!(
                "tag '{}' has no search depth",
                tag.name
            )))
        }
    };
    match depth {
        SearchDepth::Own => Ok(format!("n.id = {tag_id}")),
        SearchDepth::Child => {
            let expr = order_select_expression(tag.filter.as_ref(), "nt")?;
            Ok(format!(
                "(SELECT {expr} FROM NoteTag nt WHERE nt.noteId = n.id AND nt.tagId = {tag_id})"
            ))
        }
        SearchDepth::Grandchild => {
            let expr = order_select_expression(tag.filter.as_ref(), "nt1")?;
            Ok(format!(
                "(SELECT {expr} FROM NoteTag nt1 JOIN NoteTag nt2 ON nt2.noteId = nt1.tagId WHERE nt1.noteId = n.id AND nt2.tagId = {tag_id})"
            ))
        }
    }
}

/// What the ORDER BY subquery selects: the rendered relationship-data
/// expression when the reference has one, otherwise the constant 1 so
/// the key degrades to relationship presence (notes without the
/// relationship sort as NULL).
fn order_select_expression(filter: Option<&ParsedTagFilter>, alias: &str) -> Result<String> {
    match filter {
        Some(filter) => render_filter_pattern(filter, alias),
        None => Ok("1".to_string()),
    }
}

/// ` AND (<rendered pattern>)` for a relationship-data predicate, empty
/// when the reference has no filter.
fn data_predicate(filter: Option<&ParsedTagFilter>, alias: &str) -> Result<String> {
    match filter {
        Some(filter) => Ok(format!(" AND ({})", render_filter_pattern(filter, alias)?)),
        None => Ok(String::new()),
    }
}

/// Substitute `{exp<i>}` placeholders in a filter pattern with JSON
/// navigation chains over the given relationship alias.
fn render_filter_pattern(filter: &ParsedTagFilter, alias: &str) -> Result<String> {
    let mut out = String::new();
    let mut last = 0;
    for m in EXP_PLACEHOLDER.find_iter(&filter.pattern) {
        out.push_str(&filter.pattern[last..m.start()]);
        // "{exp<i>}"
        let digits = &filter.pattern[m.start() + 4..m.end() - 1];
        let index: usize = digits.parse().unwrap_or(usize::MAX);
        let path = filter.exps.get(index).ok_or_else(|| {
            Error::InvalidInput(format!("exp placeholder {index} has no expression"))
        })?;
        out.push_str(&json_path_expression(alias, path));
        last = m.end();
    }
    out.push_str(&filter.pattern[last..]);
    Ok(out)
}

/// `a.b.c` over alias `nt` becomes `nt.data->'a'->'b'->>'c'`: JSON
/// navigation on every segment, text extraction on the last.
fn json_path_expression(alias: &str, path: &str) -> String {
    let mut expr = format!("{alias}.data");
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_some() {
            expr.push_str(&format!("->'{segment}'"));
        } else {
            expr.push_str(&format!("->>'{segment}'"));
        }
    }
    expr
}

// =============================================================================
// ATTRIBUTE EXPRESSIONS
// =============================================================================

async fn resolve_attr(
    attr: &ParsedAttr,
    space_id: Option<i64>,
    resolver: &dyn MetadataResolver,
) -> Result<(i64, nota_core::AttrType)> {
    if let Some(space_name) = &attr.space {
        let sid = resolver.resolve_space(space_name).await?;
        return resolver.resolve_attr(&attr.name, sid).await;
    }
    if let Some(sid) = space_id {
        return resolver.resolve_attr(&attr.name, sid).await;
    }
    let matches = resolver.resolve_attrs_by_name(&attr.name).await?;
    match matches.as_slice() {
        [] => Err(Error::NotFound(format!("attr '{}'", attr.name))),
        [found] => Ok(*found),
        _ => Err(Error::AmbiguousName(attr.name.clone())),
    }
}

/// EXISTS test or typed scalar subquery for one attribute reference.
/// With tag filters the match is restricted to values attached through
/// one of the named tags; without them any attachment matches.
async fn attr_expression(
    attr: &ParsedAttr,
    space_id: Option<i64>,
    resolver: &dyn MetadataResolver,
) -> Result<String> {
    let (attr_id, attr_type) = resolve_attr(attr, space_id, resolver).await?;

    let mut tag_ids = Vec::with_capacity(attr.tag_name_filters.len());
    for tag in &attr.tag_name_filters {
        tag_ids.push(resolve_tag_id(tag, space_id, resolver).await?);
    }
    let tag_filter = if tag_ids.is_empty() {
        String::new()
    } else {
        let ids = tag_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!(" AND na.tagId IN ({ids})")
    };

    if attr.exists {
        Ok(format!(
            "EXISTS(SELECT 1 FROM NoteAttr na WHERE na.noteId = n.id AND na.attrId = {attr_id}{tag_filter})"
        ))
    } else {
        Ok(format!(
            "CAST((SELECT na.value FROM NoteAttr na WHERE na.noteId = n.id AND na.attrId = {attr_id}{tag_filter}) AS {})",
            attr_type.sql_cast_type()
        ))
    }
}
