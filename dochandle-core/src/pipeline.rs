//! Aggregation pipeline stages.
//!
//! A pipeline is an ordered slice of [`Stage`]s; each stage consumes the documents produced
//! by the previous one.

use std::fmt;

use crate::filter::{FilterSpec, SortDirection};

/// A group accumulator computed over the documents sharing a group key.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Sum of a numeric field. Non-numeric values are ignored.
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
    /// Value of the field in the first document of the group.
    First(String),
    /// All values of the field, in document order.
    Push(String),
    /// Number of documents in the group.
    Count,
}

impl Accumulator {
    pub fn operator(&self) -> &'static str {
        match self {
            Accumulator::Sum(_) | Accumulator::Count => "$sum",
            Accumulator::Avg(_) => "$avg",
            Accumulator::Min(_) => "$min",
            Accumulator::Max(_) => "$max",
            Accumulator::First(_) => "$first",
            Accumulator::Push(_) => "$push",
        }
    }

    pub fn source_field(&self) -> Option<&str> {
        match self {
            Accumulator::Sum(field)
            | Accumulator::Avg(field)
            | Accumulator::Min(field)
            | Accumulator::Max(field)
            | Accumulator::First(field)
            | Accumulator::Push(field) => Some(field),
            Accumulator::Count => None,
        }
    }
}

/// One stage of an aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(FilterSpec),
    /// Groups documents by the value of `key` (or all together when `None`). The output
    /// documents carry the key in `_id` plus one field per named accumulator.
    Group {
        key: Option<String>,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(String, SortDirection),
    Skip(usize),
    Limit(usize),
    /// Keeps only the listed fields (and `_id`).
    Project(Vec<String>),
    /// Replaces the stream with a single document holding the document count in the named field.
    Count(String),
}

impl Stage {
    pub fn group(key: Option<&str>) -> Self {
        Stage::Group { key: key.map(str::to_string), accumulators: Vec::new() }
    }

    /// Adds an accumulator to a [`Stage::Group`]; other stages are returned unchanged.
    pub fn accumulate(self, name: impl Into<String>, accumulator: Accumulator) -> Self {
        match self {
            Stage::Group { key, mut accumulators } => {
                accumulators.push((name.into(), accumulator));
                Stage::Group { key, accumulators }
            }
            other => other,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Match(filter) => write!(f, "{{$match: {filter}}}"),
            Stage::Group { key, accumulators } => {
                match key {
                    Some(key) => write!(f, "{{$group: {{_id: ${key}")?,
                    None => f.write_str("{$group: {_id: null")?,
                }
                for (name, acc) in accumulators {
                    match acc.source_field() {
                        Some(field) => write!(f, ", {name}: {{{}: ${field}}}", acc.operator())?,
                        None => write!(f, ", {name}: {{{}: 1}}", acc.operator())?,
                    }
                }
                f.write_str("}}")
            }
            Stage::Sort(field, direction) => write!(f, "{{$sort: {{{field}: {direction:?}}}}}"),
            Stage::Skip(n) => write!(f, "{{$skip: {n}}}"),
            Stage::Limit(n) => write!(f, "{{$limit: {n}}}"),
            Stage::Project(fields) => write!(f, "{{$project: {fields:?}}}"),
            Stage::Count(field) => write!(f, "{{$count: {field}}}"),
        }
    }
}

/// Renders a whole pipeline for error context.
pub fn describe(pipeline: &[Stage]) -> String {
    let stages = pipeline.iter().map(Stage::to_string).collect::<Vec<_>>();
    format!("[{}]", stages.join(", "))
}
