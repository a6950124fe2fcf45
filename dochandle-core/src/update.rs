//! Declarative update descriptions.
//!
//! An [`UpdateSpec`] is an ordered list of [`UpdateOp`]s applied to each matched document.
//! Like filters, updates are immutable once built and are translated by each driver.

use std::fmt;

use bson::Bson;

/// A single field mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Sets a field, creating it if missing.
    Set(String, Bson),
    /// Removes a field.
    Unset(String),
    /// Increments a numeric field by the given amount. A missing field starts at zero.
    Inc(String, Bson),
    /// Appends a value to an array field, creating the array if missing.
    Push(String, Bson),
    /// Renames a field. Documents without the field are left unchanged.
    Rename(String, String),
}

impl UpdateOp {
    pub fn field(&self) -> &str {
        match self {
            UpdateOp::Set(field, _)
            | UpdateOp::Unset(field)
            | UpdateOp::Inc(field, _)
            | UpdateOp::Push(field, _)
            | UpdateOp::Rename(field, _) => field,
        }
    }
}

/// An immutable, ordered set of field mutations.
///
/// ```ignore
/// use dochandle::update::Update;
///
/// let deposit = Update::inc("balance", 50).set("lastTransaction", "deposit");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    ops: Vec<UpdateOp>,
}

impl UpdateSpec {
    pub fn new(ops: Vec<UpdateOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn with(mut self, op: UpdateOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn set(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with(UpdateOp::Set(field.into(), value.into()))
    }

    pub fn unset(self, field: impl Into<String>) -> Self {
        self.with(UpdateOp::Unset(field.into()))
    }

    pub fn inc(self, field: impl Into<String>, amount: impl Into<Bson>) -> Self {
        self.with(UpdateOp::Inc(field.into(), amount.into()))
    }

    pub fn push(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with(UpdateOp::Push(field.into(), value.into()))
    }

    pub fn rename(self, field: impl Into<String>, new: impl Into<String>) -> Self {
        self.with(UpdateOp::Rename(field.into(), new.into()))
    }
}

impl fmt::Display for UpdateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match op {
                UpdateOp::Set(field, value) => write!(f, "$set: {{{field}: {value}}}")?,
                UpdateOp::Unset(field) => write!(f, "$unset: {field}")?,
                UpdateOp::Inc(field, value) => write!(f, "$inc: {{{field}: {value}}}")?,
                UpdateOp::Push(field, value) => write!(f, "$push: {{{field}: {value}}}")?,
                UpdateOp::Rename(field, new) => write!(f, "$rename: {{{field}: {new}}}")?,
            }
        }
        f.write_str("}")
    }
}

/// Constructors starting a new [`UpdateSpec`].
pub struct Update;

impl Update {
    pub fn set(field: impl Into<String>, value: impl Into<Bson>) -> UpdateSpec {
        UpdateSpec::default().set(field, value)
    }

    pub fn unset(field: impl Into<String>) -> UpdateSpec {
        UpdateSpec::default().unset(field)
    }

    pub fn inc(field: impl Into<String>, amount: impl Into<Bson>) -> UpdateSpec {
        UpdateSpec::default().inc(field, amount)
    }

    pub fn push(field: impl Into<String>, value: impl Into<Bson>) -> UpdateSpec {
        UpdateSpec::default().push(field, value)
    }

    pub fn rename(field: impl Into<String>, new: impl Into<String>) -> UpdateSpec {
        UpdateSpec::default().rename(field, new)
    }
}
