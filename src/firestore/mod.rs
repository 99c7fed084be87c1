//! Chained query-builder facade over Cloud Firestore.
//!
//! The surface mirrors the legacy web SDK shape existing callers were
//! written against: `collection(name)` handles accumulate
//! `where`/`orderBy`/`limit` constraints immutably and execute with
//! `get()`; `doc(id)` handles expose `get`/`set`/`update`/`delete` plus
//! sub-collections. All persistence, ordering and conflict semantics are
//! the remote store's own; this module adapts its REST surface and adds no
//! caching, retrying, or locking of its own.

pub mod field_value;
pub mod models;
pub mod query;
pub mod reference;
pub mod snapshot;

mod value;

#[cfg(test)]
mod tests;

use std::path::Path;

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use thiserror::Error;
use yup_oauth2::ServiceAccountKey;

use self::query::Query;
use self::reference::{CollectionReference, DocumentReference};
use crate::core::middleware::AuthMiddleware;

const FIRESTORE_V1_API: &str =
    "https://firestore.googleapis.com/v1/projects/{project_id}/databases/(default)/documents";

/// Errors surfaced by Firestore operations.
///
/// Failures propagate to the caller unchanged, with no retry and no
/// partial application. A missing document is only an error for `update`; reads
/// signal absence through the snapshot instead.
#[derive(Error, Debug)]
pub enum FirestoreError {
    /// Network-level failure reaching the platform.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Failure inside the middleware stack (e.g. token acquisition).
    #[error("middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
    /// `update()` against a document that does not exist.
    #[error("document not found: {0}")]
    NotFound(String),
    /// Payload rejected before or by the store's type-checked write path.
    #[error("invalid data: {0}")]
    Validation(String),
    /// Any other error status returned by the store.
    #[error("API error: {0}")]
    Api(String),
    /// Local (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Failure loading service-account credentials.
    #[error("credentials error: {0}")]
    Credentials(#[from] std::io::Error),
}

/// Client for one Firestore database.
///
/// Constructed explicitly and passed to whatever needs it; there is no
/// process-global instance. Handles borrow the client, so they are cheap to
/// create per call site and to discard.
pub struct Firestore {
    client: ClientWithMiddleware,
    base_url: String,
}

impl Firestore {
    /// Creates a client for the project named in the service-account key.
    pub fn new(key: ServiceAccountKey) -> Self {
        let project_id = key.project_id.clone().unwrap_or_default();
        let base_url = FIRESTORE_V1_API.replace("{project_id}", &project_id);
        Self::with_base_url(key, base_url)
    }

    /// Creates a client against a custom endpoint (e.g. the emulator).
    pub fn with_base_url(key: ServiceAccountKey, base_url: impl Into<String>) -> Self {
        let client = ClientBuilder::new(Client::new())
            .with(AuthMiddleware::new(key))
            .build();

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Creates a client from a service-account JSON key file.
    pub async fn from_service_account_file(
        path: impl AsRef<Path>,
    ) -> Result<Self, FirestoreError> {
        let key = yup_oauth2::read_service_account_key(path.as_ref()).await?;
        Ok(Self::new(key))
    }

    #[cfg(test)]
    pub(crate) fn with_client(client: ClientWithMiddleware, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// A handle on the root collection `collection_id`.
    pub fn collection(&self, collection_id: &str) -> CollectionReference<'_> {
        CollectionReference {
            client: &self.client,
            root_url: self.base_url.clone(),
            parent_url: self.base_url.clone(),
            query: Query::new(collection_id),
        }
    }

    /// A reference to the document at the slash-separated `document_path`
    /// (e.g. `"customers/c1"` or `"customers/c1/vehicles/v2"`).
    pub fn doc(&self, document_path: &str) -> DocumentReference<'_> {
        let path = document_path.trim_matches('/');
        let id = path.rsplit('/').next().unwrap_or(path).to_string();
        DocumentReference {
            client: &self.client,
            root_url: self.base_url.clone(),
            url: format!("{}/{}", self.base_url, path),
            id,
        }
    }
}
