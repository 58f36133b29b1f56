//! Tracing setup and the access log.
//!
//! The access log line is written once per request, after the response body
//! has been fully sent or abandoned, so the elapsed time covers streaming.

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use http_body::{Frame, SizeHint};
use std::{
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

/// Install the global `fmt` subscriber. `RUST_LOG` wins when set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Middleware writing one access line per request when verbose.
pub async fn access_log(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config.verbose {
        return next.run(request).await;
    }

    let start = Instant::now();
    let addr = client_addr(&request);
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let record = AccessRecord {
        addr,
        method,
        uri,
        status: response.status(),
        start,
    };
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(LoggedBody::new(body, record)))
}

/// First `X-Forwarded-For` value, else the peer address.
fn client_addr(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        return forwarded.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".into())
}

#[derive(Debug)]
struct AccessRecord {
    addr: String,
    method: Method,
    uri: Uri,
    status: StatusCode,
    start: Instant,
}

impl AccessRecord {
    fn line(&self, elapsed: Duration) -> String {
        format!(
            "[{}] {:.3} {} {} {}",
            self.addr,
            elapsed.as_secs_f64(),
            self.status.as_u16(),
            self.method,
            self.uri
        )
    }
}

/// Response body that emits its access line exactly once: at end of
/// stream, on a body error, or when dropped early.
struct LoggedBody {
    inner: Body,
    record: Option<AccessRecord>,
}

impl LoggedBody {
    fn new(inner: Body, record: AccessRecord) -> Self {
        Self {
            inner,
            record: Some(record),
        }
    }

    fn finish(&mut self) {
        if let Some(record) = self.record.take() {
            info!("{}", record.line(record.start.elapsed()));
        }
    }
}

impl http_body::Body for LoggedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let polled = Pin::new(&mut self.inner).poll_frame(cx);
        if matches!(polled, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            self.finish();
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for LoggedBody {
    fn drop(&mut self) {
        self.finish();
    }
}
