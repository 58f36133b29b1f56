//! `Backend` implementation speaking the Cloud Storage JSON API.
//!
//! Object names are sent exactly as stored. The name becomes a single
//! percent-encoded path segment, so `~`, `#`, `%` and repeated slashes reach
//! GCS unchanged. One HTTP client and one credential provider serve every
//! bucket; nothing is created per bucket or per read mode.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use object_store::{
    CredentialProvider,
    gcp::{GcpCredentialProvider, GoogleCloudStorageBuilder},
};
use reqwest::{
    Client, RequestBuilder, Response, StatusCode, Url,
    header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, HeaderMap, HeaderName},
};
use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, warn};

use super::backend::{Backend, BackendError, BackendResult};
use crate::models::object::{ObjectAttributes, ObjectReader, ObjectRef, ReaderAttributes};

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

// The builder refuses to build without a bucket. Only its credential
// provider is kept, and that is not bucket-bound.
const CREDENTIALS_BUCKET: &str = "gcs-gateway-credentials";

/// Object resource as returned by `GET /storage/v1/b/{bucket}/o/{name}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    content_type: Option<String>,
    content_language: Option<String>,
    cache_control: Option<String>,
    content_disposition: Option<String>,
    content_encoding: Option<String>,
    updated: DateTime<Utc>,
    /// Decimal string, per the JSON API.
    size: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct GcsBackend {
    client: Client,
    endpoint: Url,
    credentials: Option<GcpCredentialProvider>,
}

impl GcsBackend {
    /// Build a backend against `endpoint`. Requests carry a bearer token from
    /// `credentials` when one is given and are anonymous otherwise.
    pub fn new(
        client: Client,
        endpoint: &str,
        credentials: Option<GcpCredentialProvider>,
    ) -> BackendResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| BackendError::Other(format!("invalid endpoint `{endpoint}`: {err}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(BackendError::Other(format!("invalid endpoint `{endpoint}`")));
        }

        Ok(Self {
            client,
            endpoint,
            credentials,
        })
    }

    /// Backend for real GCS or an emulator.
    ///
    /// Against the default endpoint the credentials come from the key file at
    /// `credentials`, else the environment and application default
    /// credentials. A custom `endpoint` (an emulator) is anonymous unless a
    /// key file is named.
    pub fn from_config(
        endpoint: Option<&str>,
        credentials: Option<PathBuf>,
        timeout: Option<Duration>,
    ) -> BackendResult<Self> {
        let mut client = Client::builder();
        if let Some(timeout) = timeout {
            client = client.timeout(timeout);
        }
        let client = client
            .build()
            .map_err(|err| BackendError::Other(format!("failed to create HTTP client: {err}")))?;

        let provider = if endpoint.is_none() || credentials.is_some() {
            let mut builder =
                GoogleCloudStorageBuilder::from_env().with_bucket_name(CREDENTIALS_BUCKET);
            if let Some(path) = &credentials {
                builder = builder.with_service_account_path(path.to_string_lossy());
            }
            Some(Arc::clone(builder.build()?.credentials()))
        } else {
            None
        };

        Self::new(client, endpoint.unwrap_or(DEFAULT_ENDPOINT), provider)
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o/{name}`, the name encoded once as
    /// one segment.
    fn object_url(&self, object: &ObjectRef) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "storage",
                "v1",
                "b",
                object.bucket.as_str(),
                "o",
                object.name.as_str(),
            ]);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        let request = match &self.credentials {
            Some(provider) => {
                let credential = provider.get_credential().await?;
                request.bearer_auth(&credential.bearer)
            }
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|err| BackendError::Other(format!("request to GCS failed: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = error_message(response).await;
        if status == StatusCode::NOT_FOUND {
            Err(BackendError::NotFound(message))
        } else {
            warn!("GCS returned {}: {}", status, message);
            Err(BackendError::Other(format!("{status}: {message}")))
        }
    }
}

#[async_trait]
impl Backend for GcsBackend {
    async fn attributes(&self, object: &ObjectRef) -> BackendResult<ObjectAttributes> {
        let url = self.object_url(object);
        debug!("fetching attributes from {}", url);

        let resource: ObjectResource = self
            .send(self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|err| BackendError::Other(format!("invalid object resource: {err}")))?;

        let size = match resource.size.as_deref() {
            Some(size) => size
                .parse::<u64>()
                .map_err(|_| BackendError::Other(format!("invalid object size `{size}`")))?,
            None => 0,
        };

        Ok(ObjectAttributes {
            name: resource.name,
            content_type: non_empty(resource.content_type),
            content_language: non_empty(resource.content_language),
            cache_control: non_empty(resource.cache_control),
            content_disposition: non_empty(resource.content_disposition),
            content_encoding: non_empty(resource.content_encoding),
            updated: resource.updated,
            size,
            metadata: resource
                .metadata
                .into_iter()
                .map(|(key, value)| (key.to_ascii_lowercase(), value))
                .collect(),
        })
    }

    async fn open_reader(&self, object: &ObjectRef) -> BackendResult<ObjectReader> {
        let mut url = self.object_url(object);
        url.query_pairs_mut().append_pair("alt", "media");
        debug!("opening {} (compressed: {})", url, object.read_compressed);

        // Without this header GCS transcodes gzip objects on the fly.
        let mut request = self.client.get(url);
        if object.read_compressed {
            request = request.header(ACCEPT_ENCODING, "gzip");
        }

        let response = self.send(request).await?;
        let attrs = reader_attributes(response.headers());
        let stream = response
            .bytes_stream()
            .map_err(|err| BackendError::Other(format!("reading object body: {err}")))
            .boxed();

        Ok(ObjectReader { attrs, stream })
    }
}

/// Transcoded responses are chunked and carry no `Content-Length`; the size
/// then reads as 0 and no length is advertised downstream.
fn reader_attributes(headers: &HeaderMap) -> ReaderAttributes {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
    };

    ReaderAttributes {
        content_encoding: header(CONTENT_ENCODING).map(str::to_string),
        size: header(CONTENT_LENGTH)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0),
    }
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}
