//! The storage backend seam.
//!
//! Handlers only talk to `dyn Backend`. `gcs_backend` talks to Cloud Storage;
//! `object_store_backend` adapts any `object_store` implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::object::{ObjectAttributes, ObjectReader, ObjectRef};

/// Failures reported by the backend. Messages are the backend's own text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The object (or its bucket) does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Anything else: permissions, network, malformed responses.
    #[error("{0}")]
    Other(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Read-only access to a remote object store.
///
/// Implementations are shared by every in-flight request and must be
/// internally thread-safe.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the object's attribute record.
    async fn attributes(&self, object: &ObjectRef) -> BackendResult<ObjectAttributes>;

    /// Open a byte stream over the object's content, honoring
    /// `ObjectRef::read_compressed`.
    async fn open_reader(&self, object: &ObjectRef) -> BackendResult<ObjectReader>;
}
