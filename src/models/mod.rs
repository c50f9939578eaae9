//! Core data models for the bucket lifecycle service.
//!
//! These entities describe what *should* exist. Whether the underlying
//! containers actually exist is always answered by probing object storage.

pub mod actor;
pub mod bucket;
pub mod lifecycle_rules;
