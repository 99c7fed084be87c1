use rand::Rng;
use reqwest::{header, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use std::collections::HashMap;

use super::models::{
    CommitRequest, CommitResponse, Direction, Document, DocumentMask, FieldOperator,
    FieldTransform, Precondition, RunQueryRequest, RunQueryResponse, Value, Write,
    WriteOperation,
};
use super::query::Query;
use super::snapshot::{parse_time, DocumentSnapshot, QuerySnapshot, WriteResult};
use super::value::encode_write_payload;
use super::FirestoreError;
use crate::core::parse_error_response;

const AUTO_ID_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const AUTO_ID_LEN: usize = 20;

/// Fresh document identifier, generated the way the platform SDKs do it.
pub(crate) fn auto_id() -> String {
    let mut rng = rand::thread_rng();
    (0..AUTO_ID_LEN)
        .map(|_| AUTO_ID_CHARS[rng.gen_range(0..AUTO_ID_CHARS.len())] as char)
        .collect()
}

/// Options for [`DocumentReference::set_with_options`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SetOptions {
    /// When set, only the fields present in the payload are replaced; other
    /// stored fields are left untouched.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        SetOptions { merge: true }
    }
}

/// A collection plus the query constraints accumulated so far.
///
/// Every constraint method borrows the receiver and returns a new handle, so
/// a reference captured by calling code keeps producing the same result set
/// no matter what is later derived from it.
#[derive(Clone)]
pub struct CollectionReference<'a> {
    pub(crate) client: &'a ClientWithMiddleware,
    pub(crate) root_url: String,
    pub(crate) parent_url: String,
    pub(crate) query: Query,
}

impl<'a> CollectionReference<'a> {
    /// The collection ID (last path segment).
    pub fn id(&self) -> &str {
        &self.query.collection_id
    }

    /// Returns a new handle with `field op value` appended to the filters.
    ///
    /// Filters compound: `.where_filter(a)?.where_filter(b)?` matches
    /// documents satisfying both `a` AND `b`. The filter is not executed
    /// until [`get`](Self::get).
    pub fn where_filter<T: Serialize>(
        &self,
        field: &str,
        op: FieldOperator,
        value: T,
    ) -> Result<Self, FirestoreError> {
        Ok(self.with_query(self.query.clone().where_filter(field, op, value)?))
    }

    /// Returns a new handle sorted by `field` in the given direction.
    pub fn order_by(&self, field: &str, direction: Direction) -> Self {
        self.with_query(self.query.clone().order_by(field, direction))
    }

    /// Returns a new handle capped at `limit` results.
    pub fn limit(&self, limit: i32) -> Self {
        self.with_query(self.query.clone().limit(limit))
    }

    /// A reference to the document `document_id` within this collection.
    pub fn doc(&self, document_id: &str) -> DocumentReference<'a> {
        DocumentReference {
            client: self.client,
            root_url: self.root_url.clone(),
            url: format!(
                "{}/{}/{}",
                self.parent_url, self.query.collection_id, document_id
            ),
            id: document_id.to_string(),
        }
    }

    /// A reference to a not-yet-written document under a fresh identifier.
    pub fn doc_auto_id(&self) -> DocumentReference<'a> {
        self.doc(&auto_id())
    }

    /// Creates a new document under an automatically assigned identifier and
    /// returns the reference carrying it. One remote write.
    pub async fn add<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<DocumentReference<'a>, FirestoreError> {
        let doc_ref = self.doc_auto_id();
        doc_ref.create(value).await?;
        Ok(doc_ref)
    }

    /// Executes the accumulated constraints and returns the matching
    /// documents. Failures propagate unchanged; there is no retry.
    pub async fn get(&self) -> Result<QuerySnapshot<'a>, FirestoreError> {
        let url = format!("{}:runQuery", self.parent_url);
        let request = RunQueryRequest {
            structured_query: self.query.structured.clone(),
        };

        log::debug!("running query on {}", self.query.collection_id);
        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response, "Run query failed").await);
        }

        let responses: Vec<RunQueryResponse> = response.json().await?;

        let mut documents = Vec::new();
        let mut read_time = None;

        for res in responses {
            if let Some(rt) = res.read_time.as_deref().and_then(parse_time) {
                read_time = Some(rt);
            }

            if let Some(doc) = res.document {
                let name = doc.name.clone();
                let id = name.rsplit('/').next().unwrap_or_default().to_string();

                let reference = DocumentReference {
                    client: self.client,
                    root_url: self.root_url.clone(),
                    url: url_for_name(&self.root_url, &name),
                    id: id.clone(),
                };

                documents.push(DocumentSnapshot {
                    id,
                    reference,
                    document: Some(doc),
                    read_time,
                });
            }
        }

        Ok(QuerySnapshot {
            documents,
            read_time,
        })
    }

    fn with_query(&self, query: Query) -> Self {
        Self {
            client: self.client,
            root_url: self.root_url.clone(),
            parent_url: self.parent_url.clone(),
            query,
        }
    }
}

/// A single document within a collection.
#[derive(Clone)]
pub struct DocumentReference<'a> {
    pub(crate) client: &'a ClientWithMiddleware,
    pub(crate) root_url: String,
    pub(crate) url: String,
    pub(crate) id: String,
}

impl<'a> DocumentReference<'a> {
    /// The document ID (last path segment).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The slash-separated document path under the database root,
    /// e.g. `"customers/c1/vehicles/v2"`.
    pub fn path(&self) -> &str {
        match self.url.find("/documents/") {
            Some(idx) => &self.url[idx + "/documents/".len()..],
            None => &self.url,
        }
    }

    /// A handle on a sub-collection of this document.
    pub fn collection(&self, collection_id: &str) -> CollectionReference<'a> {
        CollectionReference {
            client: self.client,
            root_url: self.root_url.clone(),
            parent_url: self.url.clone(),
            query: Query::new(collection_id),
        }
    }

    /// Fetches the document. A missing document is not an error: the
    /// snapshot reports `exists() == false`.
    pub async fn get(&self) -> Result<DocumentSnapshot<'a>, FirestoreError> {
        log::debug!("fetching document {}", self.path());
        let response = self.client.get(&self.url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(DocumentSnapshot {
                id: self.id.clone(),
                reference: self.clone(),
                document: None,
                read_time: None,
            });
        }

        if !response.status().is_success() {
            return Err(error_for_status(response, "Get document failed").await);
        }

        let doc: Document = response.json().await?;
        Ok(DocumentSnapshot {
            id: self.id.clone(),
            reference: self.clone(),
            document: Some(doc),
            read_time: None,
        })
    }

    /// Overwrites the document, creating it if absent.
    pub async fn set<T: Serialize>(&self, value: &T) -> Result<WriteResult, FirestoreError> {
        self.set_with_options(value, SetOptions::default()).await
    }

    /// Overwrites or, with [`SetOptions::merge`], merges into the document.
    pub async fn set_with_options<T: Serialize>(
        &self,
        value: &T,
        options: SetOptions,
    ) -> Result<WriteResult, FirestoreError> {
        let (fields, transforms) = encode_write_payload(value)?;
        let update_mask = options.merge.then(|| DocumentMask {
            field_paths: sorted_paths(&fields),
        });
        let write = Write {
            update_mask,
            update_transforms: non_empty(transforms),
            current_document: None,
            operation: WriteOperation::Update(self.wire_document(fields)),
        };
        self.commit(write, "Set document failed").await
    }

    /// Updates the given fields of an existing document. Fails with
    /// [`FirestoreError::NotFound`] if the document does not exist.
    pub async fn update<T: Serialize>(&self, value: &T) -> Result<WriteResult, FirestoreError> {
        let (fields, transforms) = encode_write_payload(value)?;
        let write = Write {
            update_mask: Some(DocumentMask {
                field_paths: sorted_paths(&fields),
            }),
            update_transforms: non_empty(transforms),
            current_document: Some(Precondition { exists: Some(true) }),
            operation: WriteOperation::Update(self.wire_document(fields)),
        };
        self.commit(write, "Update document failed").await
    }

    /// Deletes the document. Idempotent: deleting an absent document
    /// succeeds.
    pub async fn delete(&self) -> Result<WriteResult, FirestoreError> {
        let write = Write {
            update_mask: None,
            update_transforms: None,
            current_document: None,
            operation: WriteOperation::Delete(self.resource_name()),
        };
        self.commit(write, "Delete document failed").await
    }

    /// Creates the document, failing if it already exists. Backs
    /// [`CollectionReference::add`].
    pub(crate) async fn create<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<WriteResult, FirestoreError> {
        let (fields, transforms) = encode_write_payload(value)?;
        let write = Write {
            update_mask: None,
            update_transforms: non_empty(transforms),
            current_document: Some(Precondition {
                exists: Some(false),
            }),
            operation: WriteOperation::Update(self.wire_document(fields)),
        };
        self.commit(write, "Create document failed").await
    }

    async fn commit(&self, write: Write, context: &str) -> Result<WriteResult, FirestoreError> {
        let database_url = self
            .root_url
            .strip_suffix("/documents")
            .unwrap_or(&self.root_url);
        let url = format!("{}:commit", database_url);
        let request = CommitRequest {
            writes: vec![write],
        };

        log::debug!("committing write for {}", self.path());
        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response, context).await);
        }

        let result: CommitResponse = response.json().await?;
        let commit_time = result.commit_time.as_deref().and_then(parse_time);
        let update_time = result
            .write_results
            .into_iter()
            .next()
            .and_then(|w| w.update_time)
            .as_deref()
            .and_then(parse_time)
            .or(commit_time);

        Ok(WriteResult { update_time })
    }

    fn wire_document(&self, fields: HashMap<String, Value>) -> Document {
        Document {
            name: self.resource_name(),
            fields,
            create_time: None,
            update_time: None,
        }
    }

    fn resource_name(&self) -> String {
        match self.url.find("projects/") {
            Some(idx) => self.url[idx..].to_string(),
            None => self.url.clone(),
        }
    }
}

/// Full request URL for a document resource name returned by the store.
fn url_for_name(root_url: &str, name: &str) -> String {
    match root_url.find("projects/") {
        Some(idx) => format!("{}{}", &root_url[..idx], name),
        None => format!("{}/{}", root_url, name),
    }
}

fn sorted_paths(fields: &HashMap<String, Value>) -> Vec<String> {
    let mut paths: Vec<String> = fields.keys().cloned().collect();
    paths.sort();
    paths
}

fn non_empty(transforms: Vec<FieldTransform>) -> Option<Vec<FieldTransform>> {
    if transforms.is_empty() {
        None
    } else {
        Some(transforms)
    }
}

/// Maps a non-success response onto the error taxonomy: 404 is `NotFound`,
/// 400 is `Validation`, anything else surfaces as `Api` with the parsed
/// error payload message.
pub(crate) async fn error_for_status(
    response: reqwest::Response,
    context: &str,
) -> FirestoreError {
    let status = response.status();
    let message = parse_error_response(response, context).await;
    log::warn!("{} (HTTP {}): {}", context, status, message);
    match status {
        StatusCode::NOT_FOUND => FirestoreError::NotFound(message),
        StatusCode::BAD_REQUEST => FirestoreError::Validation(message),
        _ => FirestoreError::Api(message),
    }
}
