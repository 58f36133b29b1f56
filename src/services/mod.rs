pub mod backend;
pub mod gcs_backend;
pub mod object_store_backend;
