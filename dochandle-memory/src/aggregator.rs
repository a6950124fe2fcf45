//! Pipeline execution over a snapshot of a collection.

use std::cmp::Ordering;

use bson::{Bson, Document};

use dochandle_core::{
    error::{DriverError, DriverErrorKind, DriverResult},
    pipeline::{Accumulator, Stage},
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, compare_values, sort_documents},
    path::{get_path, set_path},
};

/// Runs `pipeline` over `documents`, stage by stage.
pub(crate) fn run(mut documents: Vec<Document>, pipeline: &[Stage]) -> DriverResult<Vec<Document>> {
    for stage in pipeline {
        documents = match stage {
            Stage::Match(filter) => {
                DocumentEvaluator::validate(filter)?;

                let mut matched = Vec::with_capacity(documents.len());
                for document in documents {
                    if DocumentEvaluator::matches(&document, filter)? {
                        matched.push(document);
                    }
                }
                matched
            }
            Stage::Group { key, accumulators } => group(documents, key.as_deref(), accumulators),
            Stage::Sort(field, direction) => {
                sort_documents(&mut documents, field, *direction);
                documents
            }
            Stage::Skip(n) => documents.into_iter().skip(*n).collect(),
            Stage::Limit(n) => documents.into_iter().take(*n).collect(),
            Stage::Project(fields) => documents
                .iter()
                .map(|document| project(document, fields))
                .collect::<DriverResult<_>>()?,
            Stage::Count(field) => {
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let count = i32::try_from(documents.len()).map_or(Bson::Int64(documents.len() as i64), Bson::Int32);
                    let mut counted = Document::new();
                    counted.insert(field.as_str(), count);
                    vec![counted]
                }
            }
        };
    }

    Ok(documents)
}

fn project(document: &Document, fields: &[String]) -> DriverResult<Document> {
    let mut projected = Document::new();

    if let Some(id) = document.get("_id") {
        projected.insert("_id", id.clone());
    }

    for field in fields {
        if let Some(value) = get_path(document, field) {
            set_path(&mut projected, field, value.clone())
                .map_err(|message| DriverError::new(DriverErrorKind::Validation, message))?;
        }
    }

    Ok(projected)
}

/// Groups in first-seen key order. Documents missing the key share the `null` group. Keys are
/// compared like filter values, so `1` and `1.0` land in the same group under the first-seen key.
fn group(documents: Vec<Document>, key: Option<&str>, accumulators: &[(String, Accumulator)]) -> Vec<Document> {
    let mut groups: Vec<(Bson, Vec<Document>)> = Vec::new();

    for document in documents {
        let group_key = key
            .and_then(|key| get_path(&document, key))
            .cloned()
            .unwrap_or(Bson::Null);

        let normalized = Comparable::from(&group_key);
        match groups.iter_mut().find(|(existing, _)| Comparable::from(&*existing) == normalized) {
            Some((_, members)) => members.push(document),
            None => groups.push((group_key, vec![document])),
        }
    }

    groups
        .into_iter()
        .map(|(group_key, members)| {
            let mut output = Document::new();
            output.insert("_id", group_key);

            for (name, accumulator) in accumulators {
                output.insert(name.as_str(), accumulate(&members, accumulator));
            }

            output
        })
        .collect()
}

fn accumulate(members: &[Document], accumulator: &Accumulator) -> Bson {
    let values = move || {
        let field = accumulator.source_field().unwrap_or_default();
        members.iter().filter_map(move |document| get_path(document, field))
    };

    match accumulator {
        Accumulator::Count => i32::try_from(members.len()).map_or(Bson::Int64(members.len() as i64), Bson::Int32),
        Accumulator::Sum(_) => sum(values()),
        Accumulator::Avg(_) => {
            let numbers = values().filter_map(as_f64).collect::<Vec<_>>();

            if numbers.is_empty() {
                Bson::Null
            } else {
                Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Accumulator::Min(_) => extreme(values(), Ordering::Less),
        Accumulator::Max(_) => extreme(values(), Ordering::Greater),
        Accumulator::First(_) => members
            .first()
            .and_then(|document| get_path(document, accumulator.source_field().unwrap_or_default()))
            .cloned()
            .unwrap_or(Bson::Null),
        Accumulator::Push(_) => Bson::Array(values().cloned().collect()),
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Integer sums stay integers (narrowest type that fits); any double makes the sum a double.
fn sum<'a>(values: impl Iterator<Item = &'a Bson>) -> Bson {
    let mut integer: i64 = 0;
    let mut float: f64 = 0.0;
    let mut saw_double = false;
    let mut saw_int64 = false;

    for value in values {
        match value {
            Bson::Int32(n) => integer = integer.saturating_add(*n as i64),
            Bson::Int64(n) => {
                saw_int64 = true;
                integer = integer.saturating_add(*n);
            }
            Bson::Double(n) => {
                saw_double = true;
                float += n;
            }
            _ => {}
        }
    }

    if saw_double {
        return Bson::Double(float + integer as f64);
    }

    match i32::try_from(integer) {
        Ok(n) if !saw_int64 => Bson::Int32(n),
        _ => Bson::Int64(integer),
    }
}

fn extreme<'a>(values: impl Iterator<Item = &'a Bson>, wanted: Ordering) -> Bson {
    values
        .filter(|value| !matches!(value, Bson::Null))
        .fold(None::<&Bson>, |best, value| match best {
            Some(current) if compare_values(Some(value), Some(current)) != wanted => Some(current),
            _ => Some(value),
        })
        .cloned()
        .unwrap_or(Bson::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use dochandle_core::filter::{Filter, SortDirection};

    fn inspections() -> Vec<Document> {
        vec![
            doc! { "business_id": "10021-2015-ENFO", "result": "no violation", "score": 90 },
            doc! { "business_id": "10057-2015-ENFO", "result": "violation", "score": 40 },
            doc! { "business_id": "10084-2015-ENFO", "result": "no violation", "score": 75.5 },
            doc! { "business_id": "10099-2015-ENFO", "result": "closed" },
        ]
    }

    #[test]
    fn groups_in_first_seen_order() {
        let pipeline = vec![
            Stage::group(Some("result"))
                .accumulate("total", Accumulator::Count)
                .accumulate("score", Accumulator::Sum("score".into()))
                .accumulate("best", Accumulator::Max("score".into()))
                .accumulate("ids", Accumulator::Push("business_id".into())),
        ];

        let output = run(inspections(), &pipeline).unwrap();

        assert_eq!(output.len(), 3);
        assert_eq!(output[0].get("_id"), Some(&Bson::String("no violation".into())));
        assert_eq!(output[0].get("total"), Some(&Bson::Int32(2)));
        assert_eq!(output[0].get("score"), Some(&Bson::Double(165.5)));
        assert_eq!(output[0].get("best"), Some(&Bson::Int32(90)));
        assert_eq!(
            output[0].get("ids"),
            Some(&Bson::Array(vec!["10021-2015-ENFO".into(), "10084-2015-ENFO".into()]))
        );
        assert_eq!(output[2].get("score"), Some(&Bson::Int32(0)));
        assert_eq!(output[2].get("best"), Some(&Bson::Null));
    }

    #[test]
    fn numeric_keys_of_different_types_share_a_group() {
        let documents = vec![
            doc! { "tier": 1_i32, "balance": 10 },
            doc! { "tier": 1_i64, "balance": 20 },
            doc! { "tier": 1.0, "balance": 30 },
            doc! { "tier": 2_i64, "balance": 40 },
        ];
        let pipeline = vec![Stage::group(Some("tier")).accumulate("total", Accumulator::Sum("balance".into()))];

        let output = run(documents, &pipeline).unwrap();

        assert_eq!(output, vec![doc! { "_id": 1_i32, "total": 60 }, doc! { "_id": 2_i64, "total": 40 }]);
    }

    #[test]
    fn match_stages_reject_non_string_prefixes() {
        let err = run(inspections(), &[Stage::Match(Filter::starts_with("business_id", 10021))]).unwrap_err();

        assert_eq!(err.kind, DriverErrorKind::Validation);
    }

    #[test]
    fn averages_and_minimums_over_the_whole_stream() {
        let pipeline = vec![
            Stage::group(None)
                .accumulate("avg", Accumulator::Avg("score".into()))
                .accumulate("min", Accumulator::Min("score".into()))
                .accumulate("first", Accumulator::First("business_id".into())),
        ];

        let output = run(inspections(), &pipeline).unwrap();

        assert_eq!(output.len(), 1);
        assert_eq!(output[0].get("_id"), Some(&Bson::Null));
        assert_eq!(output[0].get("min"), Some(&Bson::Int32(40)));
        assert_eq!(output[0].get("first"), Some(&Bson::String("10021-2015-ENFO".into())));
        match output[0].get("avg") {
            Some(Bson::Double(avg)) => assert!((avg - 68.5).abs() < f64::EPSILON),
            other => panic!("unexpected average {other:?}"),
        }
    }

    #[test]
    fn chains_match_sort_skip_limit_and_project() {
        let pipeline = vec![
            Stage::Match(Filter::exists("score")),
            Stage::Sort("score".into(), SortDirection::Desc),
            Stage::Skip(1),
            Stage::Limit(1),
            Stage::Project(vec!["business_id".into()]),
        ];

        let output = run(inspections(), &pipeline).unwrap();

        assert_eq!(output, vec![doc! { "business_id": "10084-2015-ENFO" }]);
    }

    #[test]
    fn count_emits_nothing_for_an_empty_stream() {
        let counted = run(inspections(), &[Stage::Count("n".into())]).unwrap();
        assert_eq!(counted, vec![doc! { "n": 4 }]);

        let empty = run(
            inspections(),
            &[Stage::Match(Filter::eq("result", "missing")), Stage::Count("n".into())],
        )
        .unwrap();
        assert!(empty.is_empty());
    }
}
