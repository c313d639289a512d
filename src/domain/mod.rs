//! Domain layer types and invariants.

pub mod api_keys;
pub mod email;
pub mod entities;
pub mod error;
pub mod slug;
pub mod types;
