use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartsql_core::{ENTRY_ID_PATH, SOUP_PATH};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        }
    }
}

/// Kind of query a [`QuerySpec`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    All,
    Exact,
    Range,
    Like,
    Match,
    Smart,
}

/// Immutable query description.
///
/// Built through the named constructors, which derive the row-fetch, count and
/// id-only Smart SQL once. Non-smart specs without select paths return whole
/// documents; everything else returns one JSON array per row.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    query_type: QueryType,
    soup_name: Option<String>,
    select_paths: Vec<String>,
    path: Option<String>,
    args: Vec<Value>,
    match_key: Option<String>,
    /// Which range bounds are present: (begin, end)
    range: (bool, bool),
    order_path: Option<String>,
    order: Order,
    page_size: usize,
    smart_sql: String,
    count_smart_sql: String,
    ids_smart_sql: Option<String>,
}

impl QuerySpec {
    // ==================== Constructors ====================

    /// Every document of `soup`
    pub fn all(soup: &str, order_path: Option<&str>, order: Order, page_size: usize) -> Self {
        Self::base(QueryType::All, soup, None, order_path, order, page_size).build()
    }

    /// Documents whose `path` equals `key`
    pub fn exact(
        soup: &str,
        path: &str,
        key: impl Into<Value>,
        order_path: Option<&str>,
        order: Order,
        page_size: usize,
    ) -> Self {
        let mut spec = Self::base(QueryType::Exact, soup, Some(path), order_path, order, page_size);
        spec.args = vec![key.into()];
        spec.build()
    }

    /// Documents whose `path` lies in `[begin, end]`; either bound may be open
    pub fn range(
        soup: &str,
        path: &str,
        begin: Option<Value>,
        end: Option<Value>,
        order_path: Option<&str>,
        order: Order,
        page_size: usize,
    ) -> Self {
        let mut spec = Self::base(QueryType::Range, soup, Some(path), order_path, order, page_size);
        spec.range = (begin.is_some(), end.is_some());
        spec.args = begin.into_iter().chain(end).collect();
        spec.build()
    }

    /// Documents whose `path` matches a SQL LIKE pattern
    pub fn like(
        soup: &str,
        path: &str,
        pattern: &str,
        order_path: Option<&str>,
        order: Order,
        page_size: usize,
    ) -> Self {
        let mut spec = Self::base(QueryType::Like, soup, Some(path), order_path, order, page_size);
        spec.args = vec![Value::String(pattern.to_string())];
        spec.build()
    }

    /// Full-text match, on one full-text path or on all of them
    pub fn matching(
        soup: &str,
        path: Option<&str>,
        match_key: &str,
        order_path: Option<&str>,
        order: Order,
        page_size: usize,
    ) -> Self {
        let mut spec = Self::base(QueryType::Match, soup, path, order_path, order, page_size);
        spec.match_key = Some(match_key.to_string());
        spec.build()
    }

    /// Raw Smart SQL. The id-only form is not available for these.
    pub fn smart(smart_sql: &str, page_size: usize) -> Self {
        let mut spec = Self::base(QueryType::Smart, "", None, None, Order::Ascending, page_size);
        spec.soup_name = None;
        spec.smart_sql = smart_sql.to_string();
        spec.count_smart_sql = smartsql_core::count_sql(smart_sql);
        spec
    }

    /// Same query, returning only `paths` for each row
    pub fn with_select_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.query_type == QueryType::Smart {
            return self;
        }
        self.select_paths = paths.into_iter().map(Into::into).collect();
        self.build()
    }

    fn base(
        query_type: QueryType,
        soup: &str,
        path: Option<&str>,
        order_path: Option<&str>,
        order: Order,
        page_size: usize,
    ) -> Self {
        Self {
            query_type,
            soup_name: Some(soup.to_string()),
            select_paths: Vec::new(),
            path: path.map(str::to_string),
            args: Vec::new(),
            match_key: None,
            range: (false, false),
            order_path: order_path.map(str::to_string),
            order,
            page_size,
            smart_sql: String::new(),
            count_smart_sql: String::new(),
            ids_smart_sql: None,
        }
    }

    fn build(mut self) -> Self {
        let soup = self.soup_name.clone().unwrap_or_default();
        let qualified = self.query_type == QueryType::Match;
        let column = |path: &str| {
            if qualified {
                format!("{{{0}}}.{{{0}:{1}}}", soup, path)
            } else {
                format!("{{{}:{}}}", soup, path)
            }
        };

        let select = if self.select_paths.is_empty() {
            column(SOUP_PATH)
        } else {
            self.select_paths
                .iter()
                .map(|p| column(p))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let from = if qualified {
            format!("{{{0}}}, {{{0}}}_fts", soup)
        } else {
            format!("{{{}}}", soup)
        };

        let path = self.path.as_deref().map(|p| column(p));
        let predicate = match (self.query_type, path) {
            (QueryType::Exact, Some(col)) => Some(format!("{} = ?", col)),
            (QueryType::Like, Some(col)) => Some(format!("{} LIKE ?", col)),
            (QueryType::Range, Some(col)) => match self.range {
                (true, true) => Some(format!("{0} >= ? AND {0} <= ?", col)),
                (true, false) => Some(format!("{} >= ?", col)),
                (false, true) => Some(format!("{} <= ?", col)),
                (false, false) => None,
            },
            (QueryType::Match, _) => Some(format!(
                "{{{0}}}_fts.rowid = {{{0}}}.{{{0}:{1}}} AND {{{0}}}_fts MATCH ?",
                soup, ENTRY_ID_PATH
            )),
            _ => None,
        };

        let mut sql = format!("SELECT {} FROM {}", select, from);
        if let Some(predicate) = predicate {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        if let Some(order_path) = &self.order_path {
            sql.push_str(&format!(" ORDER BY {} {}", column(order_path), self.order.as_sql()));
        }

        self.count_smart_sql = smartsql_core::count_sql(&sql);
        self.ids_smart_sql = smartsql_core::ids_smart_sql(&sql, &soup).ok();
        self.smart_sql = sql;
        self
    }

    // ==================== Accessors ====================

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn soup_name(&self) -> Option<&str> {
        self.soup_name.as_deref()
    }

    pub fn select_paths(&self) -> &[String] {
        &self.select_paths
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn match_key(&self) -> Option<&str> {
        self.match_key.as_deref()
    }

    pub fn order_path(&self) -> Option<&str> {
        self.order_path.as_deref()
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn smart_sql(&self) -> &str {
        &self.smart_sql
    }

    pub fn count_smart_sql(&self) -> &str {
        &self.count_smart_sql
    }

    pub fn ids_smart_sql(&self) -> Option<&str> {
        self.ids_smart_sql.as_deref()
    }

    /// Rows come back as whole documents rather than arrays
    pub fn returns_documents(&self) -> bool {
        self.query_type != QueryType::Smart && self.select_paths.is_empty()
    }
}
