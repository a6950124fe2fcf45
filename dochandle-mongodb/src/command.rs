//! Update and pipeline translation to MongoDB operator documents.

use bson::{Bson, Document, doc};

use dochandle_core::{
    error::DriverError,
    filter::SortDirection,
    pipeline::{Accumulator, Stage},
    update::{UpdateOp, UpdateSpec},
};

use crate::query::MongoQueryTranslator;

/// Merges `field: value` into the sub-document of `operator`, creating it on first use.
fn merge(update: &mut Document, operator: &str, field: &str, value: Bson) {
    if let Some(Bson::Document(fields)) = update.get_mut(operator) {
        fields.insert(field, value);
        return;
    }

    let mut fields = Document::new();
    fields.insert(field, value);
    update.insert(operator, fields);
}

/// Groups update operators by their MongoDB operator (`$set`, `$inc`, ...).
pub(crate) fn translate_update(update: &UpdateSpec) -> Document {
    let mut translated = Document::new();

    for op in update.ops() {
        match op {
            UpdateOp::Set(field, value) => merge(&mut translated, "$set", field, value.clone()),
            UpdateOp::Unset(field) => merge(&mut translated, "$unset", field, Bson::String(String::new())),
            UpdateOp::Inc(field, amount) => merge(&mut translated, "$inc", field, amount.clone()),
            UpdateOp::Push(field, value) => merge(&mut translated, "$push", field, value.clone()),
            UpdateOp::Rename(field, new) => merge(&mut translated, "$rename", field, Bson::String(new.clone())),
        }
    }

    translated
}

fn direction(direction: SortDirection) -> i32 {
    match direction {
        SortDirection::Asc => 1,
        SortDirection::Desc => -1,
    }
}

pub(crate) fn translate_sort(field: &str, sort: SortDirection) -> Document {
    doc! { field: direction(sort) }
}

fn translate_stage(stage: &Stage) -> Result<Document, DriverError> {
    Ok(match stage {
        Stage::Match(filter) => doc! { "$match": MongoQueryTranslator::translate(filter)? },
        Stage::Group { key, accumulators } => {
            let mut group = Document::new();
            group.insert("_id", key.as_ref().map_or(Bson::Null, |key| Bson::String(format!("${key}"))));

            for (name, accumulator) in accumulators {
                let source = match accumulator {
                    Accumulator::Count => Bson::Int32(1),
                    _ => Bson::String(format!("${}", accumulator.source_field().unwrap_or_default())),
                };
                group.insert(name.as_str(), doc! { accumulator.operator(): source });
            }

            doc! { "$group": group }
        }
        Stage::Sort(field, sort) => doc! { "$sort": translate_sort(field, *sort) },
        Stage::Skip(n) => doc! { "$skip": *n as i64 },
        Stage::Limit(n) => doc! { "$limit": *n as i64 },
        Stage::Project(fields) => doc! {
            "$project": fields
                .iter()
                .map(|field| (field.clone(), Bson::Int32(1)))
                .collect::<Document>(),
        },
        Stage::Count(field) => doc! { "$count": field.as_str() },
    })
}

pub(crate) fn translate_pipeline(pipeline: &[Stage]) -> Result<Vec<Document>, DriverError> {
    pipeline.iter().map(translate_stage).collect()
}
