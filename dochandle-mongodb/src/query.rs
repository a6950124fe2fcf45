//! Filter translation from [`FilterSpec`] to MongoDB query syntax.

use bson::{Bson, Document, doc};

use dochandle_core::{
    error::{DriverError, DriverErrorKind},
    filter::{FieldOp, FilterSpec, FilterVisitor},
};

/// Translates filter trees into MongoDB query documents.
///
/// String operators compile to anchored, escaped regular expressions so that matching is
/// literal and case-sensitive.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    pub(crate) fn translate(filter: &FilterSpec) -> Result<Document, DriverError> {
        MongoQueryTranslator.visit_filter(filter)
    }

    fn escape(pattern: &str) -> String {
        let mut escaped = String::with_capacity(pattern.len());
        for c in pattern.chars() {
            if "\\^$.|?*+()[]{}".contains(c) {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }

    fn regex(field: &str, op: &FieldOp, value: &Bson) -> Result<Document, DriverError> {
        let Bson::String(s) = value else {
            return Err(DriverError::new(
                DriverErrorKind::Validation,
                format!("{} on '{field}' requires a string value", op.as_str()),
            ));
        };
        let s = Self::escape(s);

        Ok(match op {
            FieldOp::StartsWith => doc! { "$regex": format!("^{s}") },
            FieldOp::EndsWith => doc! { "$regex": format!("{s}$") },
            _ => doc! { "$regex": s },
        })
    }

    fn as_array(value: &Bson) -> Bson {
        match value {
            Bson::Array(_) => value.clone(),
            other => Bson::Array(vec![other.clone()]),
        }
    }
}

impl FilterVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DriverError;

    fn visit_and(&mut self, exprs: &[FilterSpec]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(Document::new());
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_filter(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[FilterSpec]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            // `$or` rejects an empty array; every stored document has an `_id`.
            return Ok(doc! { "_id": { "$exists": false } });
        }

        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_filter(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &FilterSpec) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_filter(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(_) => Self::regex(field, op, value)?,
                    Bson::Array(arr) => doc! { "$all": arr },
                    other => doc! { "$elemMatch": { "$eq": other } },
                },
                FieldOp::NotContains => match value {
                    Bson::String(_) => doc! { "$not": Self::regex(field, op, value)? },
                    Bson::Array(arr) => doc! { "$nin": arr },
                    other => doc! { "$nin": [other] },
                },
                FieldOp::StartsWith | FieldOp::EndsWith => Self::regex(field, op, value)?,
                FieldOp::AnyOf => doc! { "$in": Self::as_array(value) },
                FieldOp::NoneOf => doc! { "$nin": Self::as_array(value) },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dochandle_core::filter::Filter;

    #[test]
    fn translates_range_conjunctions() {
        let filter = Filter::gte("this", 10).and(Filter::lte("this", 20));

        assert_eq!(
            MongoQueryTranslator::translate(&filter).unwrap(),
            doc! { "$and": [{ "this": { "$gte": 10 } }, { "this": { "$lte": 20 } }] }
        );
    }

    #[test]
    fn match_all_is_an_empty_document() {
        assert_eq!(MongoQueryTranslator::translate(&Filter::all()).unwrap(), doc! {});
    }

    #[test]
    fn negation_uses_nor() {
        let filter = Filter::eq("accountHolder", "A").not();

        assert_eq!(
            MongoQueryTranslator::translate(&filter).unwrap(),
            doc! { "$nor": [{ "accountHolder": { "$eq": "A" } }] }
        );
    }

    #[test]
    fn string_operators_escape_regex_syntax() {
        let filter = Filter::starts_with("business_id", "10021-2015.E");

        assert_eq!(
            MongoQueryTranslator::translate(&filter).unwrap(),
            doc! { "business_id": { "$regex": "^10021-2015\\.E" } }
        );
        assert!(MongoQueryTranslator::translate(&Filter::ends_with("n", 1)).is_err());
    }

    #[test]
    fn membership_operators_always_receive_arrays() {
        assert_eq!(
            MongoQueryTranslator::translate(&Filter::any_of("result", "violation")).unwrap(),
            doc! { "result": { "$in": ["violation"] } }
        );
        assert_eq!(
            MongoQueryTranslator::translate(&Filter::none_of("result", vec!["a", "b"])).unwrap(),
            doc! { "result": { "$nin": ["a", "b"] } }
        );
    }
}
