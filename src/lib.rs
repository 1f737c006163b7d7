//! Multipart object upload simulator.
//!
//! A payload is split into parts, each part is hashed and pushed through a
//! simulated transport by a bounded worker pool, and the session completes
//! with a composite ETag. Presigned tokens gate every part submission, and
//! the stored parts can be re-verified (or tampered with) afterwards.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
