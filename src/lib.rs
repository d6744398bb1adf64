//! Chunked migration of objects from a Zenko (S3-compatible) store into a
//! Storj-style capability-secured destination network.

pub mod config;
pub mod destination;
pub mod errors;
pub mod models;
pub mod services;
pub mod source;
