//! Represents an object as reported by the storage backend.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;

use crate::services::backend::BackendError;

/// Addresses a single object inside a bucket.
///
/// Carries the client's gzip preference so the backend can decide whether a
/// stored `Content-Encoding: gzip` object is served compressed or transcoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,

    /// Object name; may contain `/`.
    pub name: String,

    pub read_compressed: bool,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            read_compressed: false,
        }
    }

    /// Ask the backend to hand out stored gzip bytes as-is.
    pub fn read_compressed(mut self, enabled: bool) -> Self {
        self.read_compressed = enabled;
        self
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.name)
    }
}

/// Immutable snapshot of an object's attributes, fetched once per request.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectAttributes {
    /// Object name within its bucket.
    pub name: String,

    pub content_type: Option<String>,
    pub content_language: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,

    /// Last modification time as reported by the backend.
    pub updated: DateTime<Utc>,

    /// Stored size in bytes.
    pub size: u64,

    /// User metadata. Keys are ASCII-lowercased, values untouched.
    pub metadata: HashMap<String, String>,
}

impl ObjectAttributes {
    /// Look up a metadata value. Missing keys read as the empty string.
    pub fn metadata_value(&self, key: &str) -> &str {
        self.metadata.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Attributes of an opened read stream. These can differ from the object's
/// stored attributes when the backend transcodes gzip content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReaderAttributes {
    pub content_encoding: Option<String>,
    pub size: u64,
}

/// An opened object body.
pub struct ObjectReader {
    pub attrs: ReaderAttributes,
    pub stream: BoxStream<'static, Result<Bytes, BackendError>>,
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("attrs", &self.attrs)
            .finish_non_exhaustive()
    }
}
