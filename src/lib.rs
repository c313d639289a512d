//! driftwood: a personal blog backend.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
