//! Legacy chained query-builder facade over Cloud Firestore.
//!
//! Existing callers talk to the document store through the old web-SDK
//! shape: `collection(name).where(...).orderBy(...).limit(n).get()` for
//! queries and `collection(name).doc(id).get()/set()/update()/delete()` for
//! single documents. This crate presents exactly that surface on top of the
//! Firestore v1 REST API. Query handles are immutable: every constraint
//! call returns a new handle, so a captured handle's result set can never
//! change behind the caller's back. All durable state lives remotely.
//!
//! # Example
//!
//! ```no_run
//! use firestore_compat::{Direction, FieldValue, Firestore};
//!
//! # async fn run() -> Result<(), firestore_compat::FirestoreError> {
//! let db = Firestore::from_service_account_file("service-account.json").await?;
//!
//! let open = db
//!     .collection("todos")
//!     .where_filter("completed", "==".parse()?, false)?
//!     .order_by("text", Direction::Ascending)
//!     .limit(10)
//!     .get()
//!     .await?;
//! open.for_each(|doc| println!("{}", doc.id()));
//!
//! db.collection("todos")
//!     .doc("wash-car")
//!     .update(&serde_json::json!({
//!         "completed": true,
//!         "completedAt": FieldValue::server_timestamp(),
//!     }))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod firestore;

pub use firestore::field_value::FieldValue;
pub use firestore::models::{Direction, FieldOperator};
pub use firestore::reference::{CollectionReference, DocumentReference, SetOptions};
pub use firestore::snapshot::{DocumentSnapshot, QuerySnapshot, WriteResult};
pub use firestore::{Firestore, FirestoreError};
