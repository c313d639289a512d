use std::{net::SocketAddr, process, sync::Arc, time::Duration as StdDuration};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use driftwood::{
    application::{
        ai_chat::AiChatService,
        api_keys::ApiKeyService,
        email::EmailService,
        error::AppError,
        friend_links::FriendLinkService,
        jobs::{
            JobScheduler, JobService, JobTargetRegistry, MAINTENANCE_ALIAS, MAINTENANCE_BEAN,
            MaintenanceContext, MaintenanceTarget, process_maintenance_job,
        },
        logs::{AdminLogService, ExceptionLogService},
        operation_log::OperationLogService,
        posts::PostService,
        repos::{
            AdminLogsRepo, ApiKeysRepo, ExceptionLogsRepo, FriendLinksRepo, JobLogsRepo, JobsRepo,
            PostsRepo, SystemConfigRepo,
        },
        system_config::SystemConfigService,
    },
    config,
    domain::{api_keys::ApiRole, error::DomainError},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiRateLimiter, ApiState},
        llm::DeepSeekClient,
        mail::LettreTransportFactory,
        telemetry,
    },
};
use driftwood_api_types::ApiKeyIssuedView;
use time::{Duration, OffsetDateTime};
use tokio::{sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::IssueKey(args) => run_issue_key(settings, args).await,
    }
}

async fn init_repositories(settings: &config::Settings) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn run_issue_key(
    settings: config::Settings,
    args: config::IssueKeyArgs,
) -> Result<(), AppError> {
    let role: ApiRole = args.role.parse()?;
    let repositories = init_repositories(&settings).await?;
    let api_keys_repo: Arc<dyn ApiKeysRepo> = repositories;
    let api_keys = ApiKeyService::new(api_keys_repo);

    let expires_at = args
        .expires_in_days
        .map(|days| {
            OffsetDateTime::now_utc()
                .checked_add(Duration::days(i64::from(days)))
                .ok_or_else(|| DomainError::validation("expires-in-days", "expiry is out of range"))
        })
        .transpose()?;
    let issued = api_keys
        .issue(&args.name, role, expires_at)
        .await
        .map_err(|err| AppError::unexpected(format!("failed to issue api key: {err}")))?;

    let view = ApiKeyIssuedView::from(issued);
    let rendered = serde_json::to_string_pretty(&view)
        .map_err(|err| AppError::unexpected(format!("failed to render api key: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn rate_limiter_from(settings: &config::ApiRateLimitSettings) -> ApiRateLimiter {
    ApiRateLimiter::new(
        StdDuration::from_secs(u64::from(settings.window_seconds.get())),
        settings.max_requests.get(),
    )
}

struct ApplicationContext {
    api_state: ApiState,
    maintenance: MaintenanceContext,
}

async fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let friend_links_repo: Arc<dyn FriendLinksRepo> = repositories.clone();
    let admin_logs_repo: Arc<dyn AdminLogsRepo> = repositories.clone();
    let exception_logs_repo: Arc<dyn ExceptionLogsRepo> = repositories.clone();
    let system_config_repo: Arc<dyn SystemConfigRepo> = repositories.clone();
    let jobs_repo: Arc<dyn JobsRepo> = repositories.clone();
    let job_logs_repo: Arc<dyn JobLogsRepo> = repositories.clone();
    let api_keys_repo: Arc<dyn ApiKeysRepo> = repositories.clone();

    let email = EmailService::new(
        system_config_repo.clone(),
        Arc::new(LettreTransportFactory::new(settings.mail.timeout)),
        settings.mail.clone(),
    );
    email.init().await;

    let admin_logs = AdminLogService::new(admin_logs_repo);
    let exception_logs = ExceptionLogService::new(exception_logs_repo);
    let api_keys = ApiKeyService::new(api_keys_repo);

    let deepseek = DeepSeekClient::new(&settings.deepseek)?;
    info!(target = "driftwood::llm", endpoint = deepseek.endpoint(), "chat backend ready");
    let ai_chat = AiChatService::new(Arc::new(deepseek), settings.deepseek.clone());

    let mut registry = JobTargetRegistry::new();
    registry.register(
        MAINTENANCE_BEAN,
        Some(MAINTENANCE_ALIAS),
        Arc::new(MaintenanceTarget::new(
            admin_logs.clone(),
            exception_logs.clone(),
            job_logs_repo.clone(),
            email.clone(),
        )),
    );
    let scheduler = JobScheduler::new(
        Arc::new(registry),
        job_logs_repo.clone(),
        settings.scheduler.misfire_threshold,
    );
    let jobs = JobService::new(jobs_repo, job_logs_repo, scheduler);
    jobs.init().await.map_err(|err| {
        AppError::unexpected(format!("failed to schedule stored jobs: {err}"))
    })?;

    let rate_limiter = Arc::new(rate_limiter_from(&settings.api_rate_limit));
    let email_rate_limiter = Arc::new(rate_limiter_from(&settings.mail.rate_limit));

    let api_state = ApiState {
        api_keys: api_keys.clone(),
        posts: PostService::new(posts_repo),
        friend_links: FriendLinkService::new(friend_links_repo, email.clone()),
        email: email.clone(),
        ai_chat,
        jobs,
        operation_log: OperationLogService::new(admin_logs.clone(), exception_logs.clone()),
        admin_logs,
        exception_logs,
        system_config: SystemConfigService::new(system_config_repo, email.clone()),
        rate_limiter,
        email_rate_limiter,
        health: repositories,
    };

    Ok(ApplicationContext {
        api_state,
        maintenance: MaintenanceContext { api_keys, email },
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings).await?;
    let jobs = app.api_state.jobs.clone();

    let monitor_handle = spawn_maintenance_monitor(app.maintenance, &settings.scheduler);
    let result = serve_http(&settings, app.api_state).await;

    jobs.scheduler().shutdown();
    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

fn spawn_maintenance_monitor(
    context: MaintenanceContext,
    scheduler: &config::SchedulerSettings,
) -> tokio::task::JoinHandle<()> {
    let maintenance_worker = WorkerBuilder::new("maintenance-worker")
        .data(context)
        .backend(CronStream::new(scheduler.maintenance_schedule.clone()))
        .build_fn(process_maintenance_job);

    let monitor = Monitor::new().register(maintenance_worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(target = "driftwood::jobs", error = %err, "job monitor stopped");
        }
    })
}

async fn serve_http(settings: &config::Settings, api_state: ApiState) -> Result<(), AppError> {
    let public_router = http::build_public_router(api_state.clone());
    let admin_router = http::build_admin_router(api_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(InfraError::from)?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "driftwood::http",
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!(target = "driftwood::http", "shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                warn!(target = "driftwood::http", error = %err, "cannot listen for shutdown signal");
                // keep the sender alive so the servers are not told to stop
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    let public_server = axum::serve(
        public_listener,
        public_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_rx.clone()));
    let admin_server = axum::serve(
        admin_listener,
        admin_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_rx.clone()));

    let grace = settings.server.graceful_shutdown;
    let deadline = async move {
        shutdown_signal(shutdown_rx).await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        served = async { try_join!(public_server, admin_server) } => {
            served.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = deadline => {
            warn!(
                target = "driftwood::http",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
