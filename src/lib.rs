//! Self-healing bucket provisioning.
//!
//! Records describe which buckets should exist and how they are configured;
//! the reconciler keeps real storage in line with them, recreating buckets
//! that vanish unless their deletion was meant to be final.

pub mod app;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
mod testing;
