//! Filter/order/limit description for `RecordStore` reads and updates.

use rusqlite::types::Value as SqlValue;

/// A filterable column. `Meta` addresses a top-level key of the JSON metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Id,
    FoldId,
    Agent,
    SessionId,
    MessageType,
    Ts,
    Meta(&'static str),
}

impl Column {
    /// SQL expression for the column. Metadata keys come from code, never from
    /// callers, and are restricted to identifier characters.
    fn sql(&self) -> String {
        match self {
            Column::Id => "id".to_string(),
            Column::FoldId => "fold_id".to_string(),
            Column::Agent => "agent".to_string(),
            Column::SessionId => "session_id".to_string(),
            Column::MessageType => "message_type".to_string(),
            Column::Ts => "ts".to_string(),
            Column::Meta(key) => {
                debug_assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
                format!("json_extract(metadata, '$.{}')", key)
            }
        }
    }
}

/// A single predicate. Predicates in a query are AND-ed.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(Column, SqlValue),
    Gte(Column, SqlValue),
    In(Column, Vec<SqlValue>),
}

/// Result ordering by insertion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Order,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: Column, value: impl Into<SqlValue>) -> Self {
        self.filters.push(Filter::Eq(column, value.into()));
        self
    }

    pub fn gte(mut self, column: Column, value: impl Into<SqlValue>) -> Self {
        self.filters.push(Filter::Gte(column, value.into()));
        self
    }

    pub fn any_of<I, V>(mut self, column: Column, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.filters
            .push(Filter::In(column, values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = Order::OldestFirst;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the WHERE clause (without the keyword) and its positional params.
    /// An empty IN list matches nothing.
    pub(crate) fn where_clause(&self) -> (String, Vec<SqlValue>) {
        let mut clauses = Vec::with_capacity(self.filters.len());
        let mut params = Vec::new();

        for filter in &self.filters {
            match filter {
                Filter::Eq(column, value) => {
                    params.push(value.clone());
                    clauses.push(format!("{} = ?{}", column.sql(), params.len()));
                }
                Filter::Gte(column, value) => {
                    params.push(value.clone());
                    clauses.push(format!("{} >= ?{}", column.sql(), params.len()));
                }
                Filter::In(column, values) => {
                    if values.is_empty() {
                        clauses.push("0".to_string());
                        continue;
                    }
                    let placeholders: Vec<String> = values
                        .iter()
                        .map(|v| {
                            params.push(v.clone());
                            format!("?{}", params.len())
                        })
                        .collect();
                    clauses.push(format!("{} IN ({})", column.sql(), placeholders.join(", ")));
                }
            }
        }

        if clauses.is_empty() {
            ("1".to_string(), params)
        } else {
            (clauses.join(" AND "), params)
        }
    }

    pub(crate) fn order_clause(&self) -> &'static str {
        match self.order {
            Order::NewestFirst => "seq DESC",
            Order::OldestFirst => "seq ASC",
        }
    }
}
