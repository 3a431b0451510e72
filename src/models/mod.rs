//! Core data models for the album art store.
//!
//! A `ClientId` keys a bucket directory; an `ObjectName` is a sanitized file
//! name inside that bucket.

pub mod client;
pub mod object;
