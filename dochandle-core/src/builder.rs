//! Small helpers for assembling BSON documents.

use bson::{Bson, Document, oid::ObjectId};
use serde::Serialize;

use crate::error::DocumentStoreResult;

/// Fluent construction of a [`Document`], appending fields in order.
///
/// ```ignore
/// let account = DocumentBuilder::new()
///     .with_object_id()
///     .append("accountHolder", "A")
///     .append("balance", 100)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes any `Serialize` value into a builder, for further appends.
    pub fn from_serializable<T: Serialize>(value: &T) -> DocumentStoreResult<Self> {
        Ok(Self { document: bson::serialize_to_document(value)? })
    }

    /// Pins a freshly generated `ObjectId` as `_id`.
    pub fn with_object_id(self) -> Self {
        self.append("_id", ObjectId::new())
    }

    pub fn append(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.document.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Document {
        self.document
    }

    /// A sample inspection record with a generated `_id`.
    pub fn inspection(business_id: &str, result: &str) -> Document {
        Self::new()
            .with_object_id()
            .append("business_id", business_id)
            .append("result", result)
            .build()
    }
}
