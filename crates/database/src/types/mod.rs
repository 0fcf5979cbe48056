//! Shared types and result types for the database layer

pub mod errors;

pub use errors::DatabaseError;

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Page size used when the caller passes a non-positive limit.
pub const DEFAULT_PAGE_LIMIT: i64 = 10;

/// Normalised offset/limit pair.
///
/// ```
/// use agora_database::Pagination;
///
/// let page = Pagination::new(-5, 0);
/// assert_eq!(page.offset, 0);
/// assert_eq!(page.limit, 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self::with_default(offset, limit, DEFAULT_PAGE_LIMIT)
    }

    pub fn with_default(offset: i64, limit: i64, default_limit: i64) -> Self {
        Self {
            offset: offset.max(0),
            limit: if limit <= 0 { default_limit } else { limit },
        }
    }
}

/// One page of results plus the number of rows matching the whole query.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Paginated<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

/// Parse a caller-supplied identifier, rejecting empty strings first.
pub fn parse_id(field: &'static str, value: &str) -> DatabaseResult<uuid::Uuid> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DatabaseError::ValidationError(format!("{field} must not be empty")));
    }
    uuid::Uuid::parse_str(trimmed).map_err(|_| DatabaseError::InvalidIdentifier {
        field,
        value: value.to_string(),
    })
}

/// Case folding applied to searchable text before it is stored and to queries
/// before they are matched. Full Unicode, unlike SQLite's `LOWER()`.
pub(crate) fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Fold `query` and escape `%`, `_` and `\` so it matches literally inside a
/// LIKE pattern run against a folded column.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in fold_case(query).chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
