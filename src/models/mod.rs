//! Core data models for the gateway.
//!
//! `object` holds what the backend reports about an object, `policy` holds
//! the configuration-derived rules applied to it on every request.

pub mod object;
pub mod policy;
