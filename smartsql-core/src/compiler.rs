//! Smart SQL compiler.
//!
//! Rewrites `{soup}` and `{soup:path}` references into physical table and
//! column names, and derives the count, id-only and paged forms of a query.

use crate::error::{SmartSqlError, SmartSqlResult};
use crate::lexer::{self, skip_quoted, Word};
use crate::resolver::{PathTarget, SoupResolver, SoupTarget};

/// Reserved path for the whole document body
pub const SOUP_PATH: &str = "_soup";
/// Reserved path for the entry id
pub const ENTRY_ID_PATH: &str = "_soupEntryId";
/// Reserved path for the creation timestamp
pub const CREATED_PATH: &str = "_soupCreatedDate";
/// Reserved path for the last modification timestamp
pub const LAST_MODIFIED_PATH: &str = "_soupLastModifiedDate";

pub const ID_COLUMN: &str = "id";
pub const SOUP_COLUMN: &str = "soup";
pub const CREATED_COLUMN: &str = "created";
pub const LAST_MODIFIED_COLUMN: &str = "lastModified";

const WRITE_VERBS: &[&str] = &["insert", "update", "delete", "replace"];

/// Keywords that may directly follow a table reference and are not aliases.
const CLAUSE_KEYWORDS: &[&str] = &[
    "where", "order", "group", "limit", "offset", "having", "window", "join", "inner", "left",
    "right", "full", "outer", "cross", "natural", "on", "using", "union", "except", "intersect",
];

/// Is `path` one of the four reserved pseudo-paths?
pub fn is_reserved_path(path: &str) -> bool {
    matches!(
        path,
        SOUP_PATH | ENTRY_ID_PATH | CREATED_PATH | LAST_MODIFIED_PATH
    )
}

/// Output of a successful compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSql {
    pub sql: String,
    /// Distinct soups referenced as tables, in order of first appearance
    pub soup_names: Vec<String>,
    /// Result columns that carry a whole document body, by output position
    pub body_columns: Vec<BodyColumn>,
}

impl CompiledSql {
    /// The body column at output position `index`, if that column is one
    pub fn body_column(&self, index: usize) -> Option<&BodyColumn> {
        self.body_columns.iter().find(|c| c.index == index)
    }
}

/// A top-level select item that is exactly a `{soup:_soup}` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyColumn {
    /// Zero-based output position
    pub index: usize,
    pub soup: String,
    /// The column holds a `{soupName}:{entryId}` placeholder instead of JSON
    pub external_storage: bool,
}

impl BodyColumn {
    /// Entry id carried by an external body placeholder
    pub fn external_entry_id(&self, value: &str) -> Option<i64> {
        if !self.external_storage {
            return None;
        }
        let (soup, id) = value.rsplit_once(':')?;
        if soup != self.soup || id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        id.parse().ok()
    }
}

#[derive(Debug)]
struct Reference<'a> {
    start: usize,
    end: usize,
    soup: &'a str,
    path: Option<&'a str>,
}

/// Compiles Smart SQL against a [`SoupResolver`].
pub struct SmartSqlCompiler<R: SoupResolver> {
    resolver: R,
}

impl<R: SoupResolver> SmartSqlCompiler<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Compile a read-only Smart SQL query into physical SQL.
    pub fn compile(&self, smart_sql: &str) -> SmartSqlResult<CompiledSql> {
        check_read_only(smart_sql)?;
        let references = scan_references(smart_sql)?;

        let mut soup_names: Vec<String> = Vec::new();
        let mut table_tokens = 0;
        for reference in references.iter().filter(|r| r.path.is_none()) {
            // `{soup}.` is a qualifier, not another table in the FROM list
            if !smart_sql[reference.end..].starts_with('.') {
                table_tokens += 1;
            }
            if !soup_names.iter().any(|s| s == reference.soup) {
                soup_names.push(reference.soup.to_string());
            }
        }

        let mut body_columns = Vec::new();
        for (index, reference) in body_items(smart_sql, &references) {
            let target = self
                .resolver
                .resolve_soup(reference.soup)?
                .ok_or_else(|| SmartSqlError::UnknownSoup(reference.soup.to_string()))?;
            body_columns.push(BodyColumn {
                index,
                soup: reference.soup.to_string(),
                external_storage: target.external_storage,
            });
        }

        let mut out = String::with_capacity(smart_sql.len() + 32);
        let mut last = 0;

        for reference in &references {
            out.push_str(&smart_sql[last..reference.start]);
            last = reference.end;

            let target = self
                .resolver
                .resolve_soup(reference.soup)?
                .ok_or_else(|| SmartSqlError::UnknownSoup(reference.soup.to_string()))?;

            match reference.path {
                None => out.push_str(&target.table_name),
                Some(path) => {
                    let qualifier = take_qualifier(&mut out);
                    let rendered = self.render_path(
                        reference.soup,
                        &target,
                        path,
                        qualifier.as_deref(),
                        table_tokens > 1,
                    )?;
                    out.push_str(&rendered);
                }
            }
        }
        out.push_str(&smart_sql[last..]);

        Ok(CompiledSql {
            sql: out,
            soup_names,
            body_columns,
        })
    }

    fn render_path(
        &self,
        soup: &str,
        target: &SoupTarget,
        path: &str,
        qualifier: Option<&str>,
        several_tables: bool,
    ) -> SmartSqlResult<String> {
        let q = qualifier.map(|q| format!("{}.", q)).unwrap_or_default();

        let rendered = match path {
            SOUP_PATH if target.external_storage => format!(
                "('{}' || ':' || {}{})",
                soup.replace('\'', "''"),
                q,
                ID_COLUMN
            ),
            SOUP_PATH => format!("{}{}", q, SOUP_COLUMN),
            ENTRY_ID_PATH => format!("{}{}", q, ID_COLUMN),
            CREATED_PATH => format!("{}{}", q, CREATED_COLUMN),
            LAST_MODIFIED_PATH => format!("{}{}", q, LAST_MODIFIED_COLUMN),
            _ => match self.resolver.resolve_path(soup, path)? {
                Some(PathTarget::Column(column)) => format!("{}{}", q, column),
                Some(PathTarget::Extract(json_path)) => {
                    if qualifier.is_none() && several_tables {
                        return Err(SmartSqlError::AmbiguousBodyReference(format!(
                            "{{{}:{}}}",
                            soup, path
                        )));
                    }
                    format!("json_extract({}{}, '$.{}')", q, SOUP_COLUMN, json_path)
                }
                None => {
                    return Err(SmartSqlError::UnknownPath {
                        soup: soup.to_string(),
                        path: path.to_string(),
                    })
                }
            },
        };

        Ok(rendered)
    }
}

/// Reject statements whose first keyword is a write verb, including the
/// statement that follows a leading `WITH` clause.
pub fn check_read_only(sql: &str) -> SmartSqlResult<()> {
    let words = lexer::words(sql);
    let Some(first) = words.first() else {
        return Ok(());
    };
    if !only_openers(&sql[..first.start]) {
        return Ok(());
    }

    let verb = if first.text == "with" {
        words
            .iter()
            .skip(1)
            .filter(|w| w.depth == first.depth)
            .find(|w| {
                matches!(w.text.as_str(), "select" | "values")
                    || WRITE_VERBS.contains(&w.text.as_str())
            })
    } else {
        Some(first)
    };
    match verb {
        Some(w) if WRITE_VERBS.contains(&w.text.as_str()) => {
            Err(SmartSqlError::WriteStatement(w.text.clone()))
        }
        _ => Ok(()),
    }
}

/// Only whitespace, opening parentheses and comments?
fn only_openers(prefix: &str) -> bool {
    let bytes = prefix.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = lexer::skip_comment(bytes, i) {
            i = next;
            continue;
        }
        if !(bytes[i].is_ascii_whitespace() || bytes[i] == b'(') {
            return false;
        }
        i += 1;
    }
    true
}

fn scan_references(sql: &str) -> SmartSqlResult<Vec<Reference<'_>>> {
    let bytes = sql.as_bytes();
    let mut references = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if let Some(next) = lexer::skip_comment(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'\'' | b'"' => i = skip_quoted(bytes, i, bytes[i]),
            b'{' => {
                let close = sql[i + 1..].find('}').ok_or_else(|| {
                    SmartSqlError::MalformedReference(format!("unclosed '{{' at offset {}", i))
                })?;
                let end = i + 1 + close;
                let inner = &sql[i + 1..end];
                if inner.contains('{') {
                    return Err(SmartSqlError::MalformedReference(format!(
                        "nested '{{' in '{{{}}}'",
                        inner
                    )));
                }

                let (soup, path) = match inner.split_once(':') {
                    Some((soup, path)) => (soup, Some(path)),
                    None => (inner, None),
                };
                if soup.is_empty() || soup.chars().any(char::is_whitespace) {
                    return Err(SmartSqlError::MalformedReference(format!(
                        "invalid soup name in '{{{}}}'",
                        inner
                    )));
                }
                if matches!(path, Some(p) if p.is_empty()) {
                    return Err(SmartSqlError::MalformedReference(format!(
                        "empty path in '{{{}}}'",
                        inner
                    )));
                }

                references.push(Reference {
                    start: i,
                    end: end + 1,
                    soup,
                    path,
                });
                i = end + 1;
            }
            _ => i += 1,
        }
    }

    Ok(references)
}

/// Pops a trailing `identifier.` off `out` and returns the identifier.
fn take_qualifier(out: &mut String) -> Option<String> {
    let without_dot = out.strip_suffix('.')?;
    let ident_start = without_dot
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .last()
        .map(|(idx, _)| idx)?;
    let qualifier = without_dot[ident_start..].to_string();
    out.truncate(ident_start);
    Some(qualifier)
}

/// Top-level select items that are a bare `_soup` reference, with their
/// output position. An optional qualifier and alias are allowed. Positions
/// after a `*` item cannot be known and are not reported.
fn body_items<'a, 'r>(
    sql: &str,
    references: &'r [Reference<'a>],
) -> Vec<(usize, &'r Reference<'a>)> {
    let words = lexer::top_level_words(sql);
    let Some(select_idx) = words.iter().position(|w| w.text == "select") else {
        return Vec::new();
    };
    let mut list_start = words[select_idx].end;
    if let Some(w) = words.get(select_idx + 1) {
        if w.text == "distinct" || w.text == "all" {
            list_start = w.end;
        }
    }
    let list_end = words[select_idx + 1..]
        .iter()
        .find(|w| w.text == "from")
        .map(|w| w.start)
        .unwrap_or(sql.len());

    let mut bounds = vec![list_start];
    for comma in lexer::top_level_commas(sql) {
        if comma > list_start && comma < list_end {
            bounds.push(comma + 1);
        }
    }

    let mut items = Vec::new();
    for (index, &start) in bounds.iter().enumerate() {
        let end = bounds.get(index + 1).map(|b| b - 1).unwrap_or(list_end);
        let item = sql[start..end].trim();
        if item == "*" || item.ends_with(".*") {
            break;
        }

        let inside: Vec<&Reference<'a>> = references
            .iter()
            .filter(|r| r.start >= start && r.end <= end)
            .collect();
        let reference = match inside.as_slice() {
            [reference] => {
                let prefix = sql[start..reference.start].trim();
                let plain = prefix.is_empty()
                    || prefix.strip_suffix('.').is_some_and(|q| {
                        !q.is_empty() && q.chars().all(|c| c.is_alphanumeric() || c == '_')
                    });
                plain.then_some(*reference)
            }
            // `{soup}.{soup:_soup}`
            [qualifier, reference] => {
                let qualified = qualifier.path.is_none()
                    && qualifier.soup == reference.soup
                    && &sql[qualifier.end..reference.start] == "."
                    && sql[start..qualifier.start].trim().is_empty();
                qualified.then_some(*reference)
            }
            _ => None,
        };
        if let Some(reference) = reference.filter(|r| is_body_reference(sql, r, end)) {
            items.push((index, reference));
        }
    }
    items
}

/// `reference` is `_soup`, followed by nothing but an optional alias before `end`
fn is_body_reference(sql: &str, reference: &Reference<'_>, end: usize) -> bool {
    if reference.path != Some(SOUP_PATH) {
        return false;
    }
    let is_alias = |s: &str| {
        s.chars().all(|c| c.is_alphanumeric() || c == '_')
            || (s.len() >= 2 && s.starts_with('"') && s.ends_with('"'))
    };
    let suffix: Vec<&str> = sql[reference.end..end].split_whitespace().collect();
    match suffix.as_slice() {
        [] => true,
        [alias] => is_alias(alias),
        [kw, alias] => kw.eq_ignore_ascii_case("as") && is_alias(alias),
        _ => false,
    }
}

// ==================== Derived Forms ====================

/// Strip a trailing top-level ORDER BY / LIMIT clause.
pub fn strip_order_and_limit(sql: &str) -> &str {
    let words = lexer::top_level_words(sql);
    let cut = words.iter().enumerate().find_map(|(idx, w)| {
        let is_order_by =
            w.text == "order" && words.get(idx + 1).is_some_and(|next| next.text == "by");
        (is_order_by || w.text == "limit").then_some(w.start)
    });
    match cut {
        Some(pos) => sql[..pos].trim_end(),
        None => sql.trim_end(),
    }
}

/// `SELECT count(*)` over the query without its ordering or limit.
pub fn count_sql(sql: &str) -> String {
    format!("SELECT count(*) FROM ({})", strip_order_and_limit(sql))
}

/// Replace the select list of a Smart SQL query with the entry id of `soup`,
/// keeping everything from FROM onwards.
pub fn ids_smart_sql(smart_sql: &str, soup: &str) -> SmartSqlResult<String> {
    let words = lexer::top_level_words(smart_sql);
    let select = words
        .first()
        .filter(|w| w.text == "select")
        .ok_or_else(|| SmartSqlError::MalformedReference("query must start with SELECT".into()))?;
    let from = words
        .iter()
        .find(|w| w.text == "from")
        .ok_or_else(|| SmartSqlError::MalformedReference("query has no FROM clause".into()))?;

    let qualifier = table_alias(smart_sql, &words, from, soup)
        .unwrap_or_else(|| format!("{{{}}}", soup));

    Ok(format!(
        "{} {}.{{{}:{}}} {}",
        &smart_sql[..select.end],
        qualifier,
        soup,
        ENTRY_ID_PATH,
        &smart_sql[from.start..]
    ))
}

fn table_alias(smart_sql: &str, words: &[Word], from: &Word, soup: &str) -> Option<String> {
    let token = format!("{{{}}}", soup);
    let token_end = from.end + smart_sql[from.end..].find(&token)? + token.len();
    let rest = &smart_sql[token_end..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let mut following = words.iter().filter(|w| w.start >= token_end);
    let mut candidate = following.next()?;
    if !smart_sql[token_end..candidate.start].trim().is_empty() {
        return None;
    }
    if candidate.text == "as" {
        candidate = following.next()?;
    }
    if CLAUSE_KEYWORDS.contains(&candidate.text.as_str()) {
        return None;
    }
    Some(smart_sql[candidate.start..candidate.end].to_string())
}

/// Wrap a row-fetch query into a page window.
///
/// Fails when the offset of the page does not fit a SQLite integer.
pub fn page_sql(sql: &str, page_size: usize, page_index: usize) -> SmartSqlResult<String> {
    let offset = page_size
        .checked_mul(page_index)
        .filter(|offset| i64::try_from(*offset).is_ok() && i64::try_from(page_size).is_ok())
        .ok_or(SmartSqlError::PageOutOfRange {
            page_size,
            page_index,
        })?;
    Ok(format!(
        "SELECT * FROM ({}) LIMIT {} OFFSET {}",
        sql, page_size, offset
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::InMemoryResolver;

    fn resolver() -> InMemoryResolver {
        let mut resolver = InMemoryResolver::new();
        resolver
            .add_soup("s", "TABLE_1", false)
            .add_column("s", "a", "TABLE_1_0")
            .add_column("s", "b", "TABLE_1_1")
            .add_extract("s", "meta.kind");
        resolver
            .add_soup("t", "TABLE_2", false)
            .add_column("t", "a", "TABLE_2_0");
        resolver
            .add_soup("ext", "TABLE_3", true)
            .add_column("ext", "key", "TABLE_3_0");
        resolver
    }

    fn compile(sql: &str) -> SmartSqlResult<CompiledSql> {
        SmartSqlCompiler::new(resolver()).compile(sql)
    }

    // ==================== Rewrite Tests ====================

    #[test]
    fn test_simple_select() {
        let compiled = compile("select {s:a},{s:b} from {s} order by {s:b}").unwrap();
        assert_eq!(
            compiled.sql,
            "select TABLE_1_0,TABLE_1_1 from TABLE_1 order by TABLE_1_1"
        );
        assert_eq!(compiled.soup_names, vec!["s".to_string()]);
        assert!(compiled.body_columns.is_empty());
    }

    #[test]
    fn test_reserved_paths() {
        let compiled = compile(
            "select {s:_soup}, {s:_soupEntryId}, {s:_soupCreatedDate}, {s:_soupLastModifiedDate} from {s}",
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "select soup, id, created, lastModified from TABLE_1"
        );
    }

    #[test]
    fn test_table_qualified_path() {
        let compiled = compile("select {s}.{s:a} from {s}, {t} where {s}.{s:a} = {t}.{t:a}")
            .unwrap();
        assert_eq!(
            compiled.sql,
            "select TABLE_1.TABLE_1_0 from TABLE_1, TABLE_2 where TABLE_1.TABLE_1_0 = TABLE_2.TABLE_2_0"
        );
        assert_eq!(compiled.soup_names, vec!["s".to_string(), "t".to_string()]);
    }

    #[test]
    fn test_alias_qualified_extract() {
        let compiled = compile("select x.{s:meta.kind} from {s} x").unwrap();
        assert_eq!(
            compiled.sql,
            "select json_extract(x.soup, '$.meta.kind') from TABLE_1 x"
        );
    }

    #[test]
    fn test_unqualified_extract_single_table() {
        let compiled = compile("select {s:a} from {s} where {s:meta.kind} = 'x'").unwrap();
        assert_eq!(
            compiled.sql,
            "select TABLE_1_0 from TABLE_1 where json_extract(soup, '$.meta.kind') = 'x'"
        );
    }

    #[test]
    fn test_unqualified_extract_in_join_is_ambiguous() {
        let err = compile("select {s:meta.kind} from {s}, {t}").unwrap_err();
        assert!(matches!(err, SmartSqlError::AmbiguousBodyReference(_)));

        // qualified is fine
        let compiled = compile("select {s}.{s:meta.kind} from {s}, {t}").unwrap();
        assert_eq!(
            compiled.sql,
            "select json_extract(TABLE_1.soup, '$.meta.kind') from TABLE_1, TABLE_2"
        );

        // a self join is ambiguous too
        let err = compile("select {s:meta.kind} from {s} x, {s} y").unwrap_err();
        assert!(matches!(err, SmartSqlError::AmbiguousBodyReference(_)));

        // qualifier tokens do not count as extra tables
        let compiled = compile("select {s}.{s:a}, {s:meta.kind} from {s}").unwrap();
        assert_eq!(
            compiled.sql,
            "select TABLE_1.TABLE_1_0, json_extract(soup, '$.meta.kind') from TABLE_1"
        );
    }

    #[test]
    fn test_external_body_placeholder() {
        let compiled = compile("select {ext:_soup} from {ext} where {ext:key} = ?").unwrap();
        assert_eq!(
            compiled.sql,
            "select ('ext' || ':' || id) from TABLE_3 where TABLE_3_0 = ?"
        );
        let body = compiled.body_column(0).unwrap();
        assert!(body.external_storage);
        assert_eq!(body.external_entry_id("ext:42"), Some(42));
        assert_eq!(body.external_entry_id("other:42"), None);
        assert_eq!(body.external_entry_id("ext:4x"), None);
    }

    #[test]
    fn test_body_columns_by_position() {
        let compiled = compile(
            "select {s}.{s:_soup}, {t:a}, x.{s:_soup} as doc, {ext:_soup} from {s}, {t}, {ext}, {s} x",
        )
        .unwrap();
        let positions: Vec<(usize, &str, bool)> = compiled
            .body_columns
            .iter()
            .map(|c| (c.index, c.soup.as_str(), c.external_storage))
            .collect();
        assert_eq!(
            positions,
            vec![(0, "s", false), (2, "s", false), (3, "ext", true)]
        );

        // inline bodies never hand out entry ids
        assert_eq!(compiled.body_column(0).unwrap().external_entry_id("s:1"), None);
    }

    #[test]
    fn test_body_columns_need_a_bare_reference() {
        for sql in [
            "select {s:a} as soup from {s}",
            "select length({s:_soup}) from {s}",
            "select {s:_soup} || 'x' from {s}",
            "select {s:a} from {s} where {s:_soup} is not null",
        ] {
            assert!(compile(sql).unwrap().body_columns.is_empty(), "{}", sql);
        }

        // positions after a star are unknown
        let compiled = compile("select *, {s:_soup} from {s}").unwrap();
        assert!(compiled.body_columns.is_empty());

        let compiled = compile("select distinct {s:a}, {s:_soup} from {s}").unwrap();
        assert_eq!(compiled.body_columns[0].index, 1);

        // commas in calls and literals do not split items
        let compiled =
            compile("select coalesce({s:a}, 'a,b'), {s:_soup} from {s} /* , {s:_soup} */").unwrap();
        assert_eq!(compiled.body_columns.len(), 1);
        assert_eq!(compiled.body_columns[0].index, 1);
    }

    #[test]
    fn test_literals_untouched() {
        let compiled = compile("select {s:a} from {s} where {s:b} = '{s:a}'").unwrap();
        assert_eq!(
            compiled.sql,
            "select TABLE_1_0 from TABLE_1 where TABLE_1_1 = '{s:a}'"
        );
    }

    #[test]
    fn test_suffix_after_table_token() {
        let compiled = compile("select {s:a} from {s}, {s}_fts where {s}_fts match 'x'").unwrap();
        assert_eq!(
            compiled.sql,
            "select TABLE_1_0 from TABLE_1, TABLE_1_fts where TABLE_1_fts match 'x'"
        );
    }

    // ==================== Error Tests ====================

    #[test]
    fn test_write_verbs_rejected() {
        for sql in [
            "insert into {s} values (1)",
            "UPDATE {s} set {s:a} = 1",
            "  delete from {s}",
            "(replace into {s} values (1))",
            "/* c */ delete from {s}",
            "-- note\ndelete from {s}",
            "/* a */ -- b\n ( update {s} set {s:a} = 1)",
            "with x as (select 1) delete from {s}",
        ] {
            let err = compile(sql).unwrap_err();
            assert!(
                matches!(err, SmartSqlError::WriteStatement(_)),
                "{} should be rejected",
                sql
            );
        }
        // a column named like a verb is fine
        assert!(check_read_only("select updated from x").is_ok());
        assert!(check_read_only("/* delete */ select a from x").is_ok());
        assert!(check_read_only("with d as (select 1) select * from d").is_ok());
    }

    #[test]
    fn test_unknown_soup_and_path() {
        assert_eq!(
            compile("select * from {nope}").unwrap_err(),
            SmartSqlError::UnknownSoup("nope".to_string())
        );
        assert_eq!(
            compile("select {s:zzz} from {s}").unwrap_err(),
            SmartSqlError::UnknownPath {
                soup: "s".to_string(),
                path: "zzz".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_references() {
        for sql in [
            "select {s:a from {s}",
            "select {} from {s}",
            "select {s:} from {s}",
            "select {s:{a}} from {s}",
            "select {:a} from {s}",
        ] {
            let err = compile(sql).unwrap_err();
            assert!(
                matches!(err, SmartSqlError::MalformedReference(_)),
                "{} should be malformed, got {:?}",
                sql,
                err
            );
        }
    }

    // ==================== Derived Form Tests ====================

    #[test]
    fn test_count_sql() {
        assert_eq!(
            count_sql("select a from t where b = 1 order by a desc limit 10"),
            "SELECT count(*) FROM (select a from t where b = 1)"
        );
        assert_eq!(
            count_sql("select a from t where b in (select c from u order by c limit 1)"),
            "SELECT count(*) FROM (select a from t where b in (select c from u order by c limit 1))"
        );
    }

    #[test]
    fn test_ids_smart_sql() {
        assert_eq!(
            ids_smart_sql("SELECT {s:_soup} FROM {s} WHERE {s:a} = ? ORDER BY {s:b} ASC", "s")
                .unwrap(),
            "SELECT {s}.{s:_soupEntryId} FROM {s} WHERE {s:a} = ? ORDER BY {s:b} ASC"
        );
        assert_eq!(
            ids_smart_sql("select x.{s:a} from {s} as x where x.{s:b} > 2", "s").unwrap(),
            "select x.{s:_soupEntryId} from {s} as x where x.{s:b} > 2"
        );
        assert_eq!(
            ids_smart_sql("select {s:a} from {s} where {s:b} > 2", "s").unwrap(),
            "select {s}.{s:_soupEntryId} from {s} where {s:b} > 2"
        );
        assert!(ids_smart_sql("with x as (select 1) select * from x", "s").is_err());
    }

    #[test]
    fn test_ids_compile() {
        let ids = ids_smart_sql("select {s:a} from {s} order by {s:b}", "s").unwrap();
        let compiled = compile(&ids).unwrap();
        assert_eq!(
            compiled.sql,
            "select TABLE_1.id from TABLE_1 order by TABLE_1_1"
        );
    }

    #[test]
    fn test_page_sql() {
        assert_eq!(
            page_sql("select a from t", 10, 3).unwrap(),
            "SELECT * FROM (select a from t) LIMIT 10 OFFSET 30"
        );
        assert_eq!(
            page_sql("select a from t", 10, usize::MAX / 2).unwrap_err(),
            SmartSqlError::PageOutOfRange {
                page_size: 10,
                page_index: usize::MAX / 2
            }
        );
        // fits usize but not a SQLite integer
        assert!(page_sql("select a from t", 2, usize::MAX / 2).is_err());
    }
}
