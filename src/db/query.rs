//! Filtering, sorting and paging for list queries.

use sqlx::{QueryBuilder, Sqlite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub column: &'static str,
    pub op: Op,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub predicates: Vec<Predicate>,
    pub sort: Option<(&'static str, SortOrder)>,
    /// Zero based.
    pub offset: i64,
    pub limit: i64,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
            sort: None,
            offset: 0,
            limit: i64::MAX,
        }
    }
}

/// Escape `%`, `_` and the escape character itself for `LIKE ... ESCAPE '\'`.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub(crate) fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, predicates: &[Predicate]) {
    for (i, p) in predicates.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(p.column);
        match p.op {
            Op::Eq => {
                qb.push(" = ");
                qb.push_bind(p.value.clone());
            }
            Op::Contains => {
                qb.push(" LIKE ");
                qb.push_bind(format!("%{}%", escape_like(&p.value)));
                qb.push(" ESCAPE '\\'");
            }
        }
    }
}

pub(crate) fn push_order_and_page(qb: &mut QueryBuilder<'_, Sqlite>, query: &ListQuery) {
    match query.sort {
        Some((column, order)) => {
            qb.push(" ORDER BY ");
            qb.push(column);
            qb.push(match order {
                SortOrder::Ascending => " ASC",
                SortOrder::Descending => " DESC",
            });
            qb.push(", id ASC");
        }
        None => {
            qb.push(" ORDER BY id ASC");
        }
    }
    qb.push(" LIMIT ");
    qb.push_bind(query.limit);
    qb.push(" OFFSET ");
    qb.push_bind(query.offset);
}
