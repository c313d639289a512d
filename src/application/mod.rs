//! Application services layer.

pub mod ai_chat;
pub mod api_keys;
pub mod email;
pub mod error;
pub mod friend_links;
pub mod jobs;
pub mod logs;
pub mod markdown;
pub mod operation_log;
pub mod pagination;
pub mod posts;
pub mod repos;
pub mod system_config;
