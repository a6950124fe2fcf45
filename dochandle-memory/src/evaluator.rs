//! Filter evaluation for in-memory documents.
//!
//! This module evaluates [`FilterSpec`] trees against BSON documents and provides the value
//! ordering used by sorting and by `$min` / `$max` accumulators.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use dochandle_core::{
    error::{DriverError, DriverErrorKind, DriverResult},
    filter::{FieldOp, FilterSpec, FilterVisitor, SortDirection},
};

use crate::path::get_path;

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so that `Int32(1)`, `Int64(1)` and `Double(1.0)`
/// compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Orders two optional values; missing and incomparable values sort first.
pub(crate) fn compare_values(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.map(Comparable::from).unwrap_or(Comparable::Null);

    match (&left, &right) {
        (Comparable::Null, Comparable::Null) => Ordering::Equal,
        (Comparable::Null, _) => Ordering::Less,
        (_, Comparable::Null) => Ordering::Greater,
        _ => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

/// Stable sort by a (possibly dotted) field.
pub(crate) fn sort_documents(documents: &mut [Document], field: &str, direction: SortDirection) {
    documents.sort_by(|a, b| {
        let ordering = compare_values(get_path(a, field), get_path(b, field));

        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn matches(document: &'a Document, filter: &FilterSpec) -> DriverResult<bool> {
        DocumentEvaluator::new(document).visit_filter(filter)
    }

    /// Rejects operands no document could be matched against, whether or not any document
    /// gets evaluated.
    pub fn validate(filter: &FilterSpec) -> DriverResult<()> {
        match filter {
            FilterSpec::And(list) | FilterSpec::Or(list) => list.iter().try_for_each(Self::validate),
            FilterSpec::Not(inner) => Self::validate(inner),
            FilterSpec::Exists(..) => Ok(()),
            FilterSpec::Field { field, op, value } => Self::check_operand(field, op, value),
        }
    }

    fn check_operand(field: &str, op: &FieldOp, value: &Bson) -> DriverResult<()> {
        match (op, value) {
            (FieldOp::StartsWith | FieldOp::EndsWith, Bson::String(_)) => Ok(()),
            (FieldOp::StartsWith | FieldOp::EndsWith, _) => Err(DriverError::new(
                DriverErrorKind::Validation,
                format!("{} on '{field}' requires a string value", op.as_str()),
            )),
            _ => Ok(()),
        }
    }

    fn contains(haystack: &Comparable<'_>, needle: &Comparable<'_>) -> bool {
        match (haystack, needle) {
            (Comparable::Array(array), _) => array.iter().any(|item| item == needle),
            (Comparable::String(left), Comparable::String(right)) => left.contains(right),
            _ => false,
        }
    }

    fn any_of(field_value: &Comparable<'_>, values: &Comparable<'_>) -> bool {
        match (field_value, values) {
            (Comparable::Array(array), Comparable::Array(values)) => {
                values.iter().any(|val| array.iter().any(|item| item == val))
            }
            (Comparable::Array(array), single_value) => array.iter().any(|item| item == single_value),
            (single_value, Comparable::Array(values)) => values.iter().any(|val| val == single_value),
            (left, right) => left == right,
        }
    }
}

impl<'a> FilterVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DriverError;

    fn visit_and(&mut self, exprs: &[FilterSpec]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_filter(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[FilterSpec]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_filter(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &FilterSpec) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_filter(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(get_path(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Self::check_operand(field, op, value)?;
        let expected = Comparable::from(value);

        let Some(field_value) = get_path(self.document, field) else {
            // A missing field only satisfies negative predicates and equality with null.
            return Ok(match op {
                FieldOp::Eq => expected == Comparable::Null,
                FieldOp::Ne => expected != Comparable::Null,
                FieldOp::NotContains | FieldOp::NoneOf => true,
                _ => false,
            });
        };
        let actual = Comparable::from(field_value);

        Ok(match op {
            FieldOp::Eq => actual == expected,
            FieldOp::Ne => actual != expected,
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                match actual.partial_cmp(&expected) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            }
            FieldOp::Contains => Self::contains(&actual, &expected),
            FieldOp::NotContains => !Self::contains(&actual, &expected),
            FieldOp::StartsWith => match (&actual, &expected) {
                (Comparable::String(left), Comparable::String(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::EndsWith => match (&actual, &expected) {
                (Comparable::String(left), Comparable::String(right)) => left.ends_with(right),
                _ => false,
            },
            FieldOp::AnyOf => Self::any_of(&actual, &expected),
            FieldOp::NoneOf => !Self::any_of(&actual, &expected),
        })
    }
}
