//! HTTP gateway serving Google Cloud Storage objects as plain GET/HEAD
//! resources, with a metadata block rule and metadata passthrough headers.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use config::GatewayConfig;
pub use routes::routes::app;
pub use services::{
    backend::{Backend, BackendError},
    gcs_backend::GcsBackend,
    object_store_backend::ObjectStoreBackend,
};
pub use state::AppState;
