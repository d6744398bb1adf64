//! Core data models for the transfer pipeline.
//!
//! These entities describe what is read from the source store, the windows
//! it is cut into, where each window lands on the destination network and
//! what a session remembers for the verification pass.

pub mod bucket;
pub mod key;
pub mod object;
pub mod session;
