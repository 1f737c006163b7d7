//! Core data models for the multipart upload simulator.
//!
//! These entities describe sessions, parts, tokens and the diagnostic
//! outputs handed to the presentation layer. They serialize naturally as
//! JSON via `serde`.

pub mod etag;
pub mod inspection;
pub mod multipart;
pub mod token;
pub mod verification;
