use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the driftwood binary.
#[derive(Debug, Parser)]
#[command(name = "driftwood", version, about = "driftwood blog backend")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DRIFTWOOD_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public and admin HTTP services plus the job scheduler.
    Serve(Box<ServeArgs>),
    /// Mint an API key and print its token once.
    #[command(name = "issue-key")]
    IssueKey(IssueKeyArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct IssueKeyArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Human-readable label stored with the key; also the author name for posts.
    #[arg(long, value_name = "NAME")]
    pub name: String,

    /// Role granted to the key (admin|author).
    #[arg(long, value_name = "ROLE", default_value = "author")]
    pub role: String,

    /// Days until the key expires; omitted means it never expires.
    #[arg(long = "expires-in-days", value_name = "DAYS")]
    pub expires_in_days: Option<u32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the API rate limit window size.
    #[arg(long = "api-rate-limit-window-seconds", value_name = "SECONDS")]
    pub api_rate_limit_window_seconds: Option<u64>,

    /// Override the API rate limit request ceiling.
    #[arg(long = "api-rate-limit-max-requests", value_name = "COUNT")]
    pub api_rate_limit_max_requests: Option<u64>,

    /// Override the DeepSeek API key.
    #[arg(long = "deepseek-api-key", value_name = "KEY")]
    pub deepseek_api_key: Option<String>,

    /// Override the DeepSeek base URL.
    #[arg(long = "deepseek-base-url", value_name = "URL")]
    pub deepseek_base_url: Option<String>,

    /// Override the DeepSeek model name.
    #[arg(long = "deepseek-model", value_name = "MODEL")]
    pub deepseek_model: Option<String>,

    /// Override the address that receives owner notices.
    #[arg(long = "mail-owner-address", value_name = "EMAIL")]
    pub mail_owner_address: Option<String>,

    /// Override how late a job may fire before it counts as misfired.
    #[arg(long = "scheduler-misfire-threshold-seconds", value_name = "SECONDS")]
    pub scheduler_misfire_threshold_seconds: Option<u64>,
}
