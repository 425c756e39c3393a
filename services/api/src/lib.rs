//! services/api/src/lib.rs
//!
//! The watch-progress HTTP service: configuration, error type, the Postgres
//! adapter and the axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
