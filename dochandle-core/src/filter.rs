//! Declarative filter construction for queries.
//!
//! A [`FilterSpec`] is an immutable predicate tree. Drivers never receive raw database
//! syntax; each one translates the tree through a [`FilterVisitor`].
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides constructors for filter expressions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Array: `any_of`, `none_of`
//! - Logical: `and`, `or`, `all`
//!
//! ```ignore
//! use dochandle::filter::Filter;
//!
//! let in_range = Filter::gte("this", 10).and(Filter::lte("this", 20));
//! ```
//!
//! Field names may be dotted paths (`"address.city"`) to address nested documents.

use std::fmt;

use bson::Bson;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// String contains a substring, or array contains a value.
    Contains,
    /// Negation of [`FieldOp::Contains`].
    NotContains,
    StartsWith,
    EndsWith,
    /// Field value is one of the given values.
    AnyOf,
    /// Field value is none of the given values.
    NoneOf,
}

impl FieldOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::Contains => "$contains",
            FieldOp::NotContains => "$notContains",
            FieldOp::StartsWith => "$startsWith",
            FieldOp::EndsWith => "$endsWith",
            FieldOp::AnyOf => "$in",
            FieldOp::NoneOf => "$nin",
        }
    }
}

/// An immutable filter expression.
///
/// Expressions combine with [`FilterSpec::and`], [`FilterSpec::or`] and [`FilterSpec::not`];
/// each combinator consumes its operands and returns a new tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    /// Logical AND (all must match). An empty list matches every document.
    And(Vec<FilterSpec>),
    /// Logical OR (any must match). An empty list matches nothing.
    Or(Vec<FilterSpec>),
    Not(Box<FilterSpec>),
    /// Checks if a field exists (`true`) or is missing (`false`).
    Exists(String, bool),
    Field {
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl FilterSpec {
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        FilterSpec::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: FilterSpec) -> Self {
        match self {
            FilterSpec::And(mut list) => {
                list.push(other);
                FilterSpec::And(list)
            }
            _ => FilterSpec::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: FilterSpec) -> Self {
        match self {
            FilterSpec::Or(mut list) => {
                list.push(other);
                FilterSpec::Or(list)
            }
            _ => FilterSpec::Or(vec![self, other]),
        }
    }

    pub fn not(self) -> Self {
        FilterSpec::Not(Box::new(self))
    }

    /// Returns `true` when the filter matches every document regardless of content.
    ///
    /// Negations are simplified before deciding, so `Not(Or([]))` and `Exists("_id", true)`
    /// count as unconstrained too.
    pub fn is_unconstrained(&self) -> bool {
        self.truth() == Truth::Always
    }

    fn truth(&self) -> Truth {
        match self {
            FilterSpec::And(list) => list.iter().fold(Truth::Always, |acc, item| match (acc, item.truth()) {
                (Truth::Never, _) | (_, Truth::Never) => Truth::Never,
                (Truth::Always, Truth::Always) => Truth::Always,
                _ => Truth::Depends,
            }),
            FilterSpec::Or(list) => list.iter().fold(Truth::Never, |acc, item| match (acc, item.truth()) {
                (Truth::Always, _) | (_, Truth::Always) => Truth::Always,
                (Truth::Never, Truth::Never) => Truth::Never,
                _ => Truth::Depends,
            }),
            FilterSpec::Not(inner) => match inner.truth() {
                Truth::Always => Truth::Never,
                Truth::Never => Truth::Always,
                Truth::Depends => Truth::Depends,
            },
            // Every stored document carries an `_id`.
            FilterSpec::Exists(field, should_exist) if field == "_id" => {
                if *should_exist {
                    Truth::Always
                } else {
                    Truth::Never
                }
            }
            FilterSpec::Exists(..) | FilterSpec::Field { .. } => Truth::Depends,
        }
    }
}

/// Outcome of a filter that can be decided without looking at any document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Truth {
    Always,
    Never,
    Depends,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Filter::all()
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, op: &str, items: &[FilterSpec]) -> fmt::Result {
            write!(f, "{{{op}: [")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            f.write_str("]}")
        }

        match self {
            FilterSpec::And(items) if items.is_empty() => f.write_str("{}"),
            FilterSpec::And(items) => list(f, "$and", items),
            FilterSpec::Or(items) => list(f, "$or", items),
            FilterSpec::Not(inner) => write!(f, "{{$not: {inner}}}"),
            FilterSpec::Exists(field, should_exist) => {
                write!(f, "{{{field}: {{$exists: {should_exist}}}}}")
            }
            FilterSpec::Field { field, op, value } => {
                write!(f, "{{{field}: {{{}: {value}}}}}", op.as_str())
            }
        }
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>`.
pub struct Filter;

impl Filter {
    /// A filter matching every document.
    pub fn all() -> FilterSpec {
        FilterSpec::And(Vec::new())
    }

    /// Matches the document with the given `_id`.
    pub fn id(value: impl Into<Bson>) -> FilterSpec {
        Self::eq("_id", value)
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::Lte, value.into())
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::StartsWith, value.into())
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// Matches documents where the field (string or array) contains the specified value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> FilterSpec {
        FilterSpec::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> FilterSpec {
        FilterSpec::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = FilterSpec>) -> FilterSpec {
        FilterSpec::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = FilterSpec>) -> FilterSpec {
        FilterSpec::Or(exprs.into_iter().collect())
    }

    /// Matches documents whose field equals any of the given values.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::AnyOf, value.into())
    }

    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> FilterSpec {
        FilterSpec::field(field.into(), FieldOp::NoneOf, value.into())
    }
}

/// A structured find request: filter plus sorting and pagination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Filter expression; `None` matches every document.
    pub filter: Option<FilterSpec>,
    pub limit: Option<usize>,
    /// Number of documents to skip.
    pub offset: Option<usize>,
    pub sort: Option<Sort>,
}

impl Query {
    pub fn new() -> Self {
        Query { filter: None, limit: None, offset: None, sort: None }
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// A query matching what `filter` matches, with no sorting or pagination.
    pub fn filtered(filter: &FilterSpec) -> Self {
        Query { filter: Some(filter.clone()), ..Query::new() }
    }

    pub fn filter_or_all(&self) -> FilterSpec {
        self.filter.clone().unwrap_or_else(Filter::all)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some(filter) => write!(f, "{filter}")?,
            None => f.write_str("{}")?,
        }
        if let Some(sort) = &self.sort {
            write!(f, " sort={}:{:?}", sort.field, sort.direction)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " skip={offset}")?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit={limit}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.query.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort { field: field.into(), direction });
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Walks a [`FilterSpec`] tree. Drivers implement this to translate or evaluate filters.
pub trait FilterVisitor {
    type Output;
    type Error;

    fn visit_and(&mut self, exprs: &[FilterSpec]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[FilterSpec]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &FilterSpec) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_filter(&mut self, expr: &FilterSpec) -> Result<Self::Output, Self::Error> {
        match expr {
            FilterSpec::And(exprs) => self.visit_and(exprs),
            FilterSpec::Or(exprs) => self.visit_or(exprs),
            FilterSpec::Not(expr) => self.visit_not(expr),
            FilterSpec::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            FilterSpec::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_flattens_into_existing_conjunction() {
        let filter = Filter::gte("this", 10)
            .and(Filter::lte("this", 20))
            .and(Filter::exists("that"));

        match filter {
            FilterSpec::And(list) => assert_eq!(list.len(), 3),
            other => panic!("expected AND, got {other:?}"),
        }
    }

    #[test]
    fn detects_unconstrained_filters() {
        assert!(Filter::all().is_unconstrained());
        assert!(Filter::and([Filter::all(), Filter::all()]).is_unconstrained());
        assert!(Filter::or([Filter::eq("a", 1), Filter::all()]).is_unconstrained());
        assert!(!Filter::eq("accountHolder", "A").is_unconstrained());
        assert!(!Filter::or(Vec::new()).is_unconstrained());
        assert!(!Filter::all().not().is_unconstrained());
    }

    #[test]
    fn negations_of_impossible_filters_are_unconstrained() {
        assert!(Filter::or(Vec::new()).not().is_unconstrained());
        assert!(Filter::all().not().not().is_unconstrained());
        assert!(Filter::and([Filter::all().not().not(), Filter::or(Vec::new()).not()]).is_unconstrained());
        assert!(Filter::exists("_id").is_unconstrained());
        assert!(Filter::not_exists("_id").not().is_unconstrained());
        assert!(Filter::or([Filter::eq("a", 1), Filter::exists("_id")]).is_unconstrained());

        assert!(!Filter::exists("accountHolder").is_unconstrained());
        assert!(!Filter::eq("a", 1).not().is_unconstrained());
        assert!(!Filter::and([Filter::all(), Filter::or(Vec::new())]).is_unconstrained());
        assert!(!Filter::or([Filter::eq("a", 1), Filter::all().not()]).is_unconstrained());
        assert!(!Filter::not_exists("_id").is_unconstrained());
    }

    #[test]
    fn combinators_leave_the_original_untouched() {
        let base = Filter::eq("accountHolder", "A");
        let widened = base.clone().or(Filter::eq("accountHolder", "B"));

        assert_eq!(base, Filter::eq("accountHolder", "A"));
        assert_ne!(base, widened);
    }

    #[test]
    fn renders_filters_for_error_context() {
        assert_eq!(Filter::all().to_string(), "{}");
        assert_eq!(
            Filter::eq("accountHolder", "A").to_string(),
            "{accountHolder: {$eq: \"A\"}}"
        );

        let query = Query::builder()
            .filter(Filter::gt("balance", 10))
            .sort("balance", SortDirection::Desc)
            .limit(5)
            .build();
        assert_eq!(query.to_string(), "{balance: {$gt: 10}} sort=balance:Desc limit=5");
    }
}
