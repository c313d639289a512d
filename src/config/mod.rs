//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::*;

use std::{net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use cron::Schedule;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "driftwood";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_API_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_API_RATE_LIMIT_MAX_REQUESTS: u64 = 120;
const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_DEEPSEEK_CHAT_PATH: &str = "/v1/chat/completions";
const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-chat";
const DEFAULT_DEEPSEEK_TEMPERATURE: f64 = 0.7;
const DEFAULT_DEEPSEEK_MAX_TOKENS: u32 = 2048;
const DEFAULT_DEEPSEEK_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DEEPSEEK_READ_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the content assistant of a personal technical blog. \
Recommend relevant articles, summarize topics, and answer reading questions concisely and accurately. \
If you do not know something, say so instead of inventing content.";
const DEFAULT_MAIL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAIL_CODE_TTL_SECS: u64 = 300;
const DEFAULT_MAIL_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_MAIL_RATE_LIMIT_MAX_REQUESTS: u64 = 5;
const DEFAULT_MISFIRE_THRESHOLD_SECS: u64 = 5;
const DEFAULT_MAINTENANCE_CRON: &str = "0 0 * * * *";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub api_rate_limit: ApiRateLimitSettings,
    pub deepseek: DeepSeekSettings,
    pub mail: MailSettings,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct ApiRateLimitSettings {
    pub window_seconds: NonZeroU32,
    pub max_requests: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct DeepSeekSettings {
    pub api_key: Option<String>,
    pub base_url: Url,
    pub chat_path: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: NonZeroU32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub system_prompt: String,
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    pub timeout: Duration,
    pub code_ttl: Duration,
    pub owner_address: Option<String>,
    /// Per-client budget for the public code and verify routes.
    pub rate_limit: ApiRateLimitSettings,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub misfire_threshold: Duration,
    pub maintenance_schedule: Schedule,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("DRIFTWOOD").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::IssueKey(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    api_rate_limit: RawApiRateLimitSettings,
    deepseek: RawDeepSeekSettings,
    mail: RawMailSettings,
    scheduler: RawSchedulerSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(window) = overrides.api_rate_limit_window_seconds {
            self.api_rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.api_rate_limit_max_requests {
            self.api_rate_limit.max_requests = Some(max);
        }
        if let Some(key) = overrides.deepseek_api_key.as_ref() {
            self.deepseek.api_key = Some(key.clone());
        }
        if let Some(url) = overrides.deepseek_base_url.as_ref() {
            self.deepseek.base_url = Some(url.clone());
        }
        if let Some(model) = overrides.deepseek_model.as_ref() {
            self.deepseek.model = Some(model.clone());
        }
        if let Some(address) = overrides.mail_owner_address.as_ref() {
            self.mail.owner_address = Some(address.clone());
        }
        if let Some(seconds) = overrides.scheduler_misfire_threshold_seconds {
            self.scheduler.misfire_threshold_seconds = Some(seconds);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            api_rate_limit,
            deepseek,
            mail,
            scheduler,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            api_rate_limit: build_api_rate_limit_settings(api_rate_limit)?,
            deepseek: build_deepseek_settings(deepseek)?,
            mail: build_mail_settings(mail)?,
            scheduler: build_scheduler_settings(scheduler)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);

    Ok(ServerSettings {
        public_addr,
        admin_addr,
        graceful_shutdown: non_zero_secs(graceful_secs, "server.graceful_shutdown_seconds")?,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url: non_blank(database.url),
        max_connections: non_zero_u32(max_connections.into(), "database.max_connections")?,
    })
}

fn build_api_rate_limit_settings(
    rate_limit: RawApiRateLimitSettings,
) -> Result<ApiRateLimitSettings, LoadError> {
    let window_seconds = rate_limit
        .window_seconds
        .unwrap_or(DEFAULT_API_RATE_LIMIT_WINDOW_SECS);
    let max_requests = rate_limit
        .max_requests
        .unwrap_or(DEFAULT_API_RATE_LIMIT_MAX_REQUESTS);

    Ok(ApiRateLimitSettings {
        window_seconds: non_zero_u32(window_seconds, "api_rate_limit.window_seconds")?,
        max_requests: non_zero_u32(max_requests, "api_rate_limit.max_requests")?,
    })
}

fn build_deepseek_settings(deepseek: RawDeepSeekSettings) -> Result<DeepSeekSettings, LoadError> {
    let base_url_raw = deepseek
        .base_url
        .unwrap_or_else(|| DEFAULT_DEEPSEEK_BASE_URL.to_string());
    let base_url = Url::parse(base_url_raw.trim())
        .map_err(|err| LoadError::invalid("deepseek.base_url", err.to_string()))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "deepseek.base_url",
            "scheme must be http or https",
        ));
    }

    let chat_path = deepseek
        .chat_path
        .unwrap_or_else(|| DEFAULT_DEEPSEEK_CHAT_PATH.to_string());
    if chat_path.trim().is_empty() {
        return Err(LoadError::invalid(
            "deepseek.chat_path",
            "path must not be empty",
        ));
    }

    let model = non_blank(deepseek.model).unwrap_or_else(|| DEFAULT_DEEPSEEK_MODEL.to_string());

    let temperature = deepseek
        .temperature
        .unwrap_or(DEFAULT_DEEPSEEK_TEMPERATURE);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(LoadError::invalid(
            "deepseek.temperature",
            "must be between 0.0 and 2.0",
        ));
    }

    let max_tokens = deepseek.max_tokens.unwrap_or(DEFAULT_DEEPSEEK_MAX_TOKENS);
    let connect_secs = deepseek
        .connect_timeout_seconds
        .unwrap_or(DEFAULT_DEEPSEEK_CONNECT_TIMEOUT_SECS);
    let read_secs = deepseek
        .read_timeout_seconds
        .unwrap_or(DEFAULT_DEEPSEEK_READ_TIMEOUT_SECS);

    Ok(DeepSeekSettings {
        api_key: non_blank(deepseek.api_key),
        base_url,
        chat_path,
        model,
        temperature,
        max_tokens: non_zero_u32(max_tokens.into(), "deepseek.max_tokens")?,
        connect_timeout: non_zero_secs(connect_secs, "deepseek.connect_timeout_seconds")?,
        read_timeout: non_zero_secs(read_secs, "deepseek.read_timeout_seconds")?,
        system_prompt: non_blank(deepseek.system_prompt)
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
    })
}

fn build_mail_settings(mail: RawMailSettings) -> Result<MailSettings, LoadError> {
    let timeout = mail.timeout_seconds.unwrap_or(DEFAULT_MAIL_TIMEOUT_SECS);
    let code_ttl = mail.code_ttl_seconds.unwrap_or(DEFAULT_MAIL_CODE_TTL_SECS);

    let owner_address = non_blank(mail.owner_address);
    if let Some(address) = owner_address.as_deref()
        && !crate::domain::email::is_valid_email(address)
    {
        return Err(LoadError::invalid(
            "mail.owner_address",
            format!("`{address}` is not a valid email address"),
        ));
    }

    let window_seconds = mail
        .rate_limit_window_seconds
        .unwrap_or(DEFAULT_MAIL_RATE_LIMIT_WINDOW_SECS);
    let max_requests = mail
        .rate_limit_max_requests
        .unwrap_or(DEFAULT_MAIL_RATE_LIMIT_MAX_REQUESTS);

    Ok(MailSettings {
        timeout: non_zero_secs(timeout, "mail.timeout_seconds")?,
        code_ttl: non_zero_secs(code_ttl, "mail.code_ttl_seconds")?,
        owner_address,
        rate_limit: ApiRateLimitSettings {
            window_seconds: non_zero_u32(window_seconds, "mail.rate_limit_window_seconds")?,
            max_requests: non_zero_u32(max_requests, "mail.rate_limit_max_requests")?,
        },
    })
}

fn build_scheduler_settings(
    scheduler: RawSchedulerSettings,
) -> Result<SchedulerSettings, LoadError> {
    let threshold = scheduler
        .misfire_threshold_seconds
        .unwrap_or(DEFAULT_MISFIRE_THRESHOLD_SECS);
    let cron = scheduler
        .maintenance_cron
        .unwrap_or_else(|| DEFAULT_MAINTENANCE_CRON.to_string());
    let maintenance_schedule = crate::application::jobs::cron_expr::parse(&cron)
        .map_err(|err| LoadError::invalid("scheduler.maintenance_cron", err.to_string()))?;

    Ok(SchedulerSettings {
        misfire_threshold: non_zero_secs(threshold, "scheduler.misfire_threshold_seconds")?,
        maintenance_schedule,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDeepSeekSettings {
    api_key: Option<String>,
    base_url: Option<String>,
    chat_path: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    connect_timeout_seconds: Option<u64>,
    read_timeout_seconds: Option<u64>,
    system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMailSettings {
    timeout_seconds: Option<u64>,
    code_ttl_seconds: Option<u64>,
    owner_address: Option<String>,
    rate_limit_window_seconds: Option<u64>,
    rate_limit_max_requests: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulerSettings {
    misfire_threshold_seconds: Option<u64>,
    maintenance_cron: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests;
