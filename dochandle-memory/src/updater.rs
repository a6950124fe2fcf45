//! Application of [`UpdateSpec`] operators to stored documents.

use bson::{Bson, Document};

use dochandle_core::{
    error::{DriverError, DriverErrorKind, DriverResult},
    update::{UpdateOp, UpdateSpec},
};

use crate::path::{get_path, remove_path, set_path};

fn invalid(message: impl Into<String>) -> DriverError {
    DriverError::new(DriverErrorKind::Validation, message)
}

fn add_numbers(current: &Bson, amount: &Bson) -> Option<Bson> {
    Some(match (current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(*a as i64 + *b as i64),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64((*a as i64).checked_add(*b)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(*b as i64)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b)?),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + *b as f64),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        _ => return None,
    })
}

fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

fn apply_op(document: &mut Document, op: &UpdateOp) -> DriverResult<()> {
    if op.field() == "_id" || matches!(op, UpdateOp::Rename(_, to) if to == "_id") {
        return Err(invalid("Performing an update on the path '_id' would modify the immutable field '_id'"));
    }

    match op {
        UpdateOp::Set(field, value) => set_path(document, field, value.clone()).map_err(invalid),
        UpdateOp::Unset(field) => {
            remove_path(document, field);
            Ok(())
        }
        UpdateOp::Inc(field, amount) => {
            if !is_number(amount) {
                return Err(invalid(format!("Cannot increment with non-numeric argument: {{{field}: {amount}}}")));
            }

            let next = match get_path(document, field) {
                None => amount.clone(),
                Some(current) => add_numbers(current, amount).ok_or_else(|| {
                    invalid(format!("Cannot apply $inc to a value of non-numeric type. Field '{field}' has value {current}"))
                })?,
            };

            set_path(document, field, next).map_err(invalid)
        }
        UpdateOp::Push(field, value) => {
            let next = match get_path(document, field) {
                None => vec![value.clone()],
                Some(Bson::Array(items)) => {
                    let mut items = items.clone();
                    items.push(value.clone());
                    items
                }
                Some(other) => {
                    return Err(invalid(format!("The field '{field}' must be an array but is {other}")));
                }
            };

            set_path(document, field, Bson::Array(next)).map_err(invalid)
        }
        UpdateOp::Rename(from, to) => match remove_path(document, from) {
            Some(value) => set_path(document, to, value).map_err(invalid),
            None => Ok(()),
        },
    }
}

/// Applies every operator in order. The document is left untouched when any operator fails.
///
/// Returns whether the document changed.
pub(crate) fn apply(document: &mut Document, update: &UpdateSpec) -> DriverResult<bool> {
    let mut updated = document.clone();

    for op in update.ops() {
        apply_op(&mut updated, op)?;
    }

    if updated == *document {
        return Ok(false);
    }

    *document = updated;
    Ok(true)
}
