//! `Backend` implementation on top of any `object_store` store, such as
//! `InMemory` or `LocalFileSystem`.
//!
//! `object_store` clients are bound to a single bucket, while the gateway
//! serves whatever bucket the request names. `ObjectStoreBackend` therefore
//! owns one client per (bucket, read mode) pair, built by a caller-supplied
//! factory and kept for the life of the process. No object data or
//! attributes are retained.
//!
//! Names go through `object_store::path::Path`, which percent-encodes some
//! characters and collapses empty segments. Cloud Storage is served by
//! `gcs_backend` instead, which keeps names verbatim.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::{Attribute, AttributeValue, Attributes, GetOptions, ObjectStore, path::Path};
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, PoisonError, RwLock},
};
use tracing::debug;

use super::backend::{Backend, BackendError, BackendResult};
use crate::models::object::{ObjectAttributes, ObjectReader, ObjectRef, ReaderAttributes};

type Connect = dyn Fn(&str, bool) -> object_store::Result<Arc<dyn ObjectStore>> + Send + Sync;

impl From<object_store::Error> for BackendError {
    fn from(err: object_store::Error) -> Self {
        if matches!(err, object_store::Error::NotFound { .. }) {
            BackendError::NotFound(err.to_string())
        } else {
            BackendError::Other(err.to_string())
        }
    }
}

pub struct ObjectStoreBackend {
    stores: RwLock<HashMap<(String, bool), Arc<dyn ObjectStore>>>,
    connect: Box<Connect>,
}

impl ObjectStoreBackend {
    /// Build a backend from a client factory. The factory receives the bucket
    /// name and whether stored gzip content should be served compressed.
    pub fn new<F>(connect: F) -> Self
    where
        F: Fn(&str, bool) -> object_store::Result<Arc<dyn ObjectStore>> + Send + Sync + 'static,
    {
        Self {
            stores: RwLock::new(HashMap::new()),
            connect: Box::new(connect),
        }
    }

    /// Run `op` against the client for `bucket`, creating it if needed.
    ///
    /// A freshly built client is kept once a call through it succeeds or
    /// reports `NotFound`, so repeated misses reuse it. Any other failure
    /// (bad credentials, unreachable store) discards it and the next request
    /// builds again.
    async fn with_store<T, F, Fut>(
        &self,
        bucket: &str,
        read_compressed: bool,
        op: F,
    ) -> BackendResult<T>
    where
        F: FnOnce(Arc<dyn ObjectStore>) -> Fut,
        Fut: Future<Output = object_store::Result<T>>,
    {
        let key = (bucket.to_string(), read_compressed);
        let cached = self
            .stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();

        let (store, fresh) = match cached {
            Some(store) => (store, false),
            None => {
                debug!(bucket, read_compressed, "building object store client");
                ((self.connect)(bucket, read_compressed)?, true)
            }
        };

        let output = op(Arc::clone(&store)).await;

        let usable = matches!(output, Ok(_) | Err(object_store::Error::NotFound { .. }));
        if fresh && usable {
            self.stores
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key)
                .or_insert(store);
        }

        output.map_err(BackendError::from)
    }
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    async fn attributes(&self, object: &ObjectRef) -> BackendResult<ObjectAttributes> {
        let location = Path::from(object.name.as_str());
        let options = GetOptions {
            head: true,
            ..Default::default()
        };

        // Stored attributes do not depend on the read mode.
        let result = self
            .with_store(&object.bucket, false, |store| async move {
                store.get_opts(&location, options).await
            })
            .await?;

        let attributes = &result.attributes;
        Ok(ObjectAttributes {
            name: result.meta.location.to_string(),
            content_type: text(attributes, &Attribute::ContentType),
            content_language: text(attributes, &Attribute::ContentLanguage),
            cache_control: text(attributes, &Attribute::CacheControl),
            content_disposition: text(attributes, &Attribute::ContentDisposition),
            content_encoding: text(attributes, &Attribute::ContentEncoding),
            updated: result.meta.last_modified,
            size: result.meta.size,
            metadata: user_metadata(attributes),
        })
    }

    async fn open_reader(&self, object: &ObjectRef) -> BackendResult<ObjectReader> {
        let location = Path::from(object.name.as_str());

        let result = self
            .with_store(&object.bucket, object.read_compressed, |store| async move {
                store.get_opts(&location, GetOptions::default()).await
            })
            .await?;

        let attrs = ReaderAttributes {
            content_encoding: text(&result.attributes, &Attribute::ContentEncoding),
            size: result.meta.size,
        };
        let stream = result.into_stream().map_err(BackendError::from).boxed();

        Ok(ObjectReader { attrs, stream })
    }
}

fn as_text(value: &AttributeValue) -> String {
    AsRef::<str>::as_ref(value).to_string()
}

fn text(attributes: &Attributes, key: &Attribute) -> Option<String> {
    attributes
        .get(key)
        .map(as_text)
        .filter(|value| !value.is_empty())
}

/// Metadata header names are case-insensitive on the wire, so keys are
/// normalised to lowercase.
fn user_metadata(attributes: &Attributes) -> HashMap<String, String> {
    attributes
        .iter()
        .filter_map(|(key, value)| match key {
            Attribute::Metadata(name) => Some((name.to_ascii_lowercase(), as_text(value))),
            _ => None,
        })
        .collect()
}
