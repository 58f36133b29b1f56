//! HTTP handler for `GET|HEAD /{bucket}/{*object}`.
//!
//! Pipeline: fetch attributes, apply the block rule, evaluate
//! `If-Modified-Since`, then translate headers and stream the body.
//! Every step short-circuits with its own status; nothing is retried.

use crate::{
    errors::AppError,
    models::{
        object::{ObjectAttributes, ObjectRef, ReaderAttributes},
        policy::PassthroughSet,
    },
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SubsecRound, Utc};
use std::time::SystemTime;
use tracing::{debug, info};

// 9999-12-31T23:59:59Z
const LAST_HTTP_SECOND: i64 = 253_402_300_799;

/// Serve an object's content (GET) or just its headers (HEAD).
pub async fn serve_object(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if !is_valid_bucket(&bucket) {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    let verbose = state.config.verbose;
    let handle = ObjectRef::new(bucket, object).read_compressed(accepts_gzip(&headers));

    let attrs = state.backend.attributes(&handle).await?;

    if let Some(rule) = state.config.block_rule()? {
        if rule.matches(&attrs) {
            if verbose {
                info!("Object {} is blocked", attrs.name);
            }
            return Err(AppError::blocked());
        }
    }

    if is_not_modified(&headers, attrs.updated, verbose) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let reader = state.backend.open_reader(&handle).await?;
    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from_stream(reader.stream)
    };

    let mut response = Response::new(body);
    set_object_headers(
        response.headers_mut(),
        &attrs,
        &reader.attrs,
        &state.config.passthrough(),
    );

    Ok(response)
}

/// Bucket names are restricted to `[0-9A-Za-z_.-]+`.
pub fn is_valid_bucket(bucket: &str) -> bool {
    !bucket.is_empty()
        && bucket
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Token-aware `Accept-Encoding` check: `gzip` listed with a non-zero weight.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|coding| {
            let (name, params) = coding.split_once(';').unwrap_or((coding, ""));
            name.trim().eq_ignore_ascii_case("gzip") && !params.split(';').any(is_zero_weight)
        })
}

fn is_zero_weight(param: &str) -> bool {
    let param = param.trim();
    param
        .strip_prefix("q=")
        .or_else(|| param.strip_prefix("Q="))
        .and_then(|q| q.trim().parse::<f32>().ok())
        .is_some_and(|q| q == 0.0)
}

/// True when the client's copy, dated by `If-Modified-Since`, is still fresh.
///
/// An unparsable date is ignored, as if the header were absent.
pub fn is_not_modified(headers: &HeaderMap, updated: DateTime<Utc>, verbose: bool) -> bool {
    let Some(raw) = headers.get(header::IF_MODIFIED_SINCE) else {
        return false;
    };

    let since = match raw
        .to_str()
        .map_err(|err| err.to_string())
        .and_then(|value| httpdate::parse_http_date(value).map_err(|err| err.to_string()))
    {
        Ok(since) => DateTime::<Utc>::from(since),
        Err(err) => {
            if verbose {
                info!("could not parse If-Modified-Since: {}", err);
            }
            return false;
        }
    };

    updated.trunc_subsecs(0) <= since
}

/// IMF-fixdate, e.g. `Mon, 02 Jan 2006 15:04:05 GMT`. Times outside what
/// the format can carry are clamped to 1970 and 9999.
pub fn http_date(time: DateTime<Utc>) -> String {
    let latest = DateTime::from_timestamp(LAST_HTTP_SECOND, 0).unwrap_or(DateTime::UNIX_EPOCH);
    let time = time.clamp(DateTime::UNIX_EPOCH, latest);
    httpdate::fmt_http_date(SystemTime::from(time))
}

/// Translate object and reader attributes into response headers.
///
/// Empty strings and zero sizes are skipped. Metadata is only exposed for
/// keys in `passthrough`.
pub fn set_object_headers(
    headers: &mut HeaderMap,
    attrs: &ObjectAttributes,
    reader: &ReaderAttributes,
    passthrough: &PassthroughSet,
) {
    set_str_header(
        headers,
        header::LAST_MODIFIED,
        Some(http_date(attrs.updated).as_str()),
    );
    set_str_header(headers, header::CONTENT_TYPE, attrs.content_type.as_deref());
    set_str_header(headers, header::CONTENT_LANGUAGE, attrs.content_language.as_deref());
    set_str_header(headers, header::CACHE_CONTROL, attrs.cache_control.as_deref());
    set_str_header(headers, header::CONTENT_ENCODING, reader.content_encoding.as_deref());
    set_str_header(
        headers,
        header::CONTENT_DISPOSITION,
        attrs.content_disposition.as_deref(),
    );
    if reader.size > 0 {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(reader.size));
    }

    for (name, value) in passthrough.headers(attrs) {
        match HeaderName::try_from(name.as_str()) {
            Ok(name) => set_str_header(headers, name, Some(value)),
            Err(err) => debug!("skipping metadata header {}: {}", name, err),
        }
    }
}

fn set_str_header(headers: &mut HeaderMap, name: HeaderName, value: Option<&str>) {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return;
    };
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(err) => debug!("skipping header {}: {}", name, err),
    }
}
