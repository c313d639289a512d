use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        public_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_cover_every_section() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), DEFAULT_PUBLIC_PORT);
    assert_eq!(settings.server.admin_addr.port(), DEFAULT_ADMIN_PORT);
    assert_eq!(settings.database.max_connections.get(), 8);
    assert!(settings.database.url.is_none());
    assert_eq!(settings.api_rate_limit.max_requests.get(), 120);
    assert_eq!(settings.deepseek.model, "deepseek-chat");
    assert_eq!(settings.deepseek.chat_path, "/v1/chat/completions");
    assert!(settings.deepseek.api_key.is_none());
    assert_eq!(settings.mail.code_ttl, Duration::from_secs(300));
    assert_eq!(settings.mail.rate_limit.window_seconds.get(), 60);
    assert_eq!(settings.mail.rate_limit.max_requests.get(), 5);
    assert_eq!(settings.scheduler.misfire_threshold, Duration::from_secs(5));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn blank_api_key_counts_as_missing() {
    let mut raw = RawSettings::default();
    raw.deepseek.api_key = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.deepseek.api_key.is_none());
}

#[test]
fn deepseek_overrides_apply() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        deepseek_api_key: Some("sk-test".to_string()),
        deepseek_base_url: Some("http://127.0.0.1:9999".to_string()),
        deepseek_model: Some("deepseek-reasoner".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.deepseek.api_key.as_deref(), Some("sk-test"));
    assert_eq!(settings.deepseek.base_url.as_str(), "http://127.0.0.1:9999/");
    assert_eq!(settings.deepseek.model, "deepseek-reasoner");
}

#[test]
fn temperature_out_of_range_is_rejected() {
    let mut raw = RawSettings::default();
    raw.deepseek.temperature = Some(3.5);

    let err = Settings::from_raw(raw).expect_err("temperature should be rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "deepseek.temperature",
            ..
        }
    ));
}

#[test]
fn zero_rate_limit_is_rejected() {
    let mut raw = RawSettings::default();
    raw.api_rate_limit.max_requests = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero limit should be rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "api_rate_limit.max_requests",
            ..
        }
    ));
}

#[test]
fn invalid_owner_address_is_rejected() {
    let mut raw = RawSettings::default();
    raw.mail.owner_address = Some("not-an-email".to_string());

    let err = Settings::from_raw(raw).expect_err("address should be rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "mail.owner_address",
            ..
        }
    ));
}

#[test]
fn maintenance_cron_accepts_question_mark() {
    let mut raw = RawSettings::default();
    raw.scheduler.maintenance_cron = Some("0 30 2 * * ?".to_string());

    Settings::from_raw(raw).expect("quartz-style expression should parse");
}

#[test]
fn malformed_maintenance_cron_is_rejected() {
    let mut raw = RawSettings::default();
    raw.scheduler.maintenance_cron = Some("every hour".to_string());

    let err = Settings::from_raw(raw).expect_err("cron should be rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "scheduler.maintenance_cron",
            ..
        }
    ));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["driftwood"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_arguments() {
    let args = CliArgs::parse_from([
        "driftwood",
        "serve",
        "--server-public-port",
        "8080",
        "--log-json",
        "yes",
        "--deepseek-model",
        "deepseek-chat",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.public_port, Some(8080));
            assert_eq!(serve.overrides.log_json, Some(true));
            assert_eq!(
                serve.overrides.deepseek_model.as_deref(),
                Some("deepseek-chat")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_issue_key_arguments() {
    let args = CliArgs::parse_from([
        "driftwood",
        "issue-key",
        "--database-url",
        "postgres://example",
        "--name",
        "alice",
        "--role",
        "admin",
        "--expires-in-days",
        "30",
    ]);

    match args.command.expect("issue-key command") {
        Command::IssueKey(issue) => {
            assert_eq!(
                issue.database.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(issue.name, "alice");
            assert_eq!(issue.role, "admin");
            assert_eq!(issue.expires_in_days, Some(30));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn issue_key_role_defaults_to_author() {
    let args = CliArgs::parse_from(["driftwood", "issue-key", "--name", "bob"]);

    match args.command.expect("issue-key command") {
        Command::IssueKey(issue) => {
            assert_eq!(issue.role, "author");
            assert!(issue.expires_in_days.is_none());
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn database_override_applies_for_issue_key() {
    let mut raw = RawSettings::default();
    raw.apply_database_override(&DatabaseOverride {
        database_url: Some("postgres://override".to_string()),
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.database.url.as_deref(), Some("postgres://override"));
}
