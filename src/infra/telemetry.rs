use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "driftwood_mail_sent_total",
            Unit::Count,
            "Emails handed to the SMTP relay successfully."
        );
        describe_counter!(
            "driftwood_mail_failed_total",
            Unit::Count,
            "Emails that could not be delivered or were skipped for missing configuration."
        );
        describe_counter!(
            "driftwood_ai_chat_requests_total",
            Unit::Count,
            "Chat completions forwarded to the language model, labelled by outcome."
        );
        describe_counter!(
            "driftwood_job_runs_total",
            Unit::Count,
            "Scheduled job executions, labelled by outcome."
        );
        describe_histogram!(
            "driftwood_job_run_ms",
            Unit::Milliseconds,
            "Wall-clock duration of scheduled job executions."
        );
        describe_gauge!(
            "driftwood_jobs_scheduled",
            Unit::Count,
            "Jobs currently registered with the in-process scheduler."
        );
    });
}
