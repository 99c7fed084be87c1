use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use super::models::{Document, ValueType};
use super::reference::DocumentReference;
use super::value::{decode_fields, decode_value};
use super::FirestoreError;

/// A point-in-time read of a single document.
///
/// Absence is data, not an error: a snapshot for a missing document reports
/// `exists() == false` and `data()` of `None`. Snapshots never change after
/// creation; every fetch produces a fresh one.
#[derive(Clone)]
pub struct DocumentSnapshot<'a> {
    pub(crate) id: String,
    pub(crate) reference: DocumentReference<'a>,
    pub(crate) document: Option<Document>,
    pub(crate) read_time: Option<DateTime<Utc>>,
}

impl<'a> DocumentSnapshot<'a> {
    /// The ID of the document.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The `DocumentReference` the snapshot was read through.
    pub fn reference(&self) -> &DocumentReference<'a> {
        &self.reference
    }

    /// Returns `true` if the document exists.
    pub fn exists(&self) -> bool {
        self.document.is_some()
    }

    /// The time the document was created, if it exists.
    pub fn create_time(&self) -> Option<DateTime<Utc>> {
        self.document
            .as_ref()
            .and_then(|d| d.create_time.as_deref())
            .and_then(parse_time)
    }

    /// The time the document was last updated, if it exists.
    pub fn update_time(&self) -> Option<DateTime<Utc>> {
        self.document
            .as_ref()
            .and_then(|d| d.update_time.as_deref())
            .and_then(parse_time)
    }

    /// The time this snapshot was read, when the store reported one.
    pub fn read_time(&self) -> Option<DateTime<Utc>> {
        self.read_time
    }

    /// All fields of the document as a deserialized value.
    ///
    /// Returns `Ok(None)` if the document does not exist. Use
    /// `serde_json::Map<String, serde_json::Value>` for the raw field map.
    pub fn data<T: DeserializeOwned>(&self) -> Result<Option<T>, FirestoreError> {
        match &self.document {
            Some(doc) => {
                let json = decode_fields(doc.fields.clone())?;
                Ok(Some(serde_json::from_value(json)?))
            }
            None => Ok(None),
        }
    }

    /// A single field, with dot-path traversal into nested maps
    /// (e.g. `"address.city"`). Returns `Ok(None)` when the document or the
    /// field is absent.
    pub fn get_field<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, FirestoreError> {
        let Some(doc) = &self.document else {
            return Ok(None);
        };

        let mut segments = path.split('.');
        let mut current = segments.next().and_then(|first| doc.fields.get(first));
        for segment in segments {
            current = current.and_then(|value| match &value.value_type {
                ValueType::MapValue(map) => map.fields.get(segment),
                _ => None,
            });
        }

        match current {
            Some(value) => {
                let json = decode_value(value.clone())?;
                Ok(Some(serde_json::from_value(json)?))
            }
            None => Ok(None),
        }
    }

    /// The first present field among several names.
    ///
    /// Stored data accumulated under evolving field names; readers pass every
    /// observed variant (e.g. `&["customerName", "customer", "fullName"]`)
    /// instead of assuming a canonical one.
    pub fn get_any<T: DeserializeOwned>(
        &self,
        paths: &[&str],
    ) -> Result<Option<T>, FirestoreError> {
        for path in paths {
            if let Some(value) = self.get_field(path)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// An ordered set of [`DocumentSnapshot`]s produced by executing a query.
#[derive(Clone)]
pub struct QuerySnapshot<'a> {
    pub(crate) documents: Vec<DocumentSnapshot<'a>>,
    pub(crate) read_time: Option<DateTime<Utc>>,
}

impl<'a> QuerySnapshot<'a> {
    /// The documents in this snapshot, in result order.
    pub fn docs(&self) -> &[DocumentSnapshot<'a>] {
        &self.documents
    }

    /// Returns `true` if the query matched nothing.
    pub fn empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The number of documents in the snapshot.
    pub fn size(&self) -> usize {
        self.documents.len()
    }

    /// The time this snapshot was read.
    pub fn read_time(&self) -> Option<DateTime<Utc>> {
        self.read_time
    }

    /// Iterates over the document snapshots.
    pub fn iter(&self) -> std::slice::Iter<'_, DocumentSnapshot<'a>> {
        self.documents.iter()
    }

    /// Calls `visitor` once per document, in result order.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&DocumentSnapshot<'a>),
    {
        for doc in &self.documents {
            visitor(doc);
        }
    }
}

impl<'a> IntoIterator for &'a QuerySnapshot<'a> {
    type Item = &'a DocumentSnapshot<'a>;
    type IntoIter = std::slice::Iter<'a, DocumentSnapshot<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

/// The outcome of a write operation.
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// The time the write was applied, when the store reported one.
    pub update_time: Option<DateTime<Utc>>,
}

pub(crate) fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
