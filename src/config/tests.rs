use super::*;

fn raw_from_toml(toml: &str) -> RawSettings {
    Config::builder()
        .add_source(File::from_str(toml, config::FileFormat::Toml))
        .build()
        .expect("config")
        .try_deserialize()
        .expect("raw settings")
}

#[test]
fn defaults_produce_valid_settings() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.cache.enabled);
    assert!(settings.cache.single_flight);
    assert_eq!(settings.site.base_url.as_str(), DEFAULT_BASE_URL);
    assert_eq!(settings.site.active_locale, "en");
    assert_eq!(settings.site.fallback_locale, "en");
    assert!(settings.sitemaps.is_empty());
    assert!(!settings.cache.warm_on_start);
    assert!(settings.admin.token.is_none());
    assert_eq!(settings.admin.url.as_str(), "http://127.0.0.1:3000/");
}

#[test]
fn admin_url_follows_the_listener_unless_configured() {
    let raw = raw_from_toml(
        r#"
        [server]
        host = "0.0.0.0"
        port = 8080

        [admin]
        token = "  "
        "#,
    );
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.admin.url.as_str(), "http://127.0.0.1:8080/");
    assert!(settings.admin.token.is_none());

    let mut raw = raw_from_toml(
        r#"
        [admin]
        token = "from-file"
        url = "https://sitemaps.internal:9000/"
        "#,
    );
    raw.apply_global_overrides(&GlobalOverrides {
        admin_token: Some("from-cli".to_string()),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.admin.token.as_deref(), Some("from-cli"));
    assert_eq!(settings.admin.url.as_str(), "https://sitemaps.internal:9000/");
    assert!(!format!("{:?}", settings.admin).contains("from-cli"));
}

#[test]
fn non_http_admin_url_is_rejected() {
    let raw = raw_from_toml(
        r#"
        [admin]
        url = "ftp://example.com/"
        "#,
    );
    assert!(matches!(
        Settings::from_raw(raw).unwrap_err(),
        LoadError::Invalid {
            key: "admin.url",
            ..
        }
    ));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = raw_from_toml(
        r#"
        [server]
        port = 4000

        [logging]
        level = "info"
        "#,
    );

    raw.apply_global_overrides(&GlobalOverrides {
        log_level: Some("debug".to_string()),
        ..Default::default()
    });
    raw.apply_serve_overrides(&ServeOverrides {
        server_port: Some(4321),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_global_overrides(&GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_cache_capacity_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.capacity = Some(0);

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(err, LoadError::Invalid { key: "cache.capacity", .. }));
}

#[test]
fn relative_base_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.site.base_url = Some("/just/a/path".to_string());

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(err, LoadError::Invalid { key: "site.base_url", .. }));
}

#[test]
fn fallback_locale_defaults_to_active() {
    let mut raw = RawSettings::default();
    raw.site.active_locale = Some("ar".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.site.fallback_locale, "ar");
}

#[test]
fn sitemaps_and_routes_are_read_from_tables() {
    let raw = raw_from_toml(
        r#"
        [routes]
        post = "/blog/{year}/{slug}"

        [sitemap_defaults]
        latest_limit = 200

        [sitemaps.posts]
        table = "posts"
        split_strategy = "year"
        route_name = "post"

        [sitemaps.products]
        table = "products"
        split_by_range = true
        range_size = 500
        "#,
    );
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(
        settings.routes.get("post").map(String::as_str),
        Some("/blog/{year}/{slug}")
    );

    let posts = &settings.sitemaps["posts"];
    assert!(posts.split_by_year);
    assert_eq!(posts.route_name.as_deref(), Some("post"));
    assert_eq!(posts.latest_limit, 200);

    let products = &settings.sitemaps["products"];
    assert!(products.split_by_range);
    assert_eq!(products.range_size, 500);
}

#[test]
fn bad_sitemap_tables_name_the_sitemap() {
    let raw = raw_from_toml(
        r#"
        [sitemaps.posts]
        changefreq = "sometimes"
        "#,
    );

    match Settings::from_raw(raw).unwrap_err() {
        LoadError::Sitemap { name, source } => {
            assert_eq!(name, "posts");
            assert_eq!(
                source,
                ConfigurationError::UnknownChangefreq("sometimes".to_string())
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unbalanced_route_templates_are_rejected() {
    let raw = raw_from_toml(
        r#"
        [routes]
        post = "/blog/{slug"
        "#,
    );

    assert!(matches!(
        Settings::from_raw(raw).unwrap_err(),
        LoadError::Invalid { key: "routes", .. }
    ));
}

#[test]
fn default_command_is_none() {
    let args = CliArgs::parse_from(["sitemill"]);
    assert!(args.command.is_none());
}

#[test]
fn parse_clear_and_warmup_targets() {
    let args = CliArgs::parse_from([
        "sitemill",
        "clear",
        "posts",
        "--admin-url",
        "http://10.0.0.5:3000/",
    ]);
    assert_eq!(
        args.overrides.admin_url.as_deref(),
        Some("http://10.0.0.5:3000/")
    );
    match args.command.expect("clear command") {
        Command::Clear(target) => assert_eq!(target.sitemap.as_deref(), Some("posts")),
        _ => panic!("wrong command parsed"),
    }

    let args = CliArgs::parse_from(["sitemill", "warmup", "--log-level", "warn"]);
    match args.command.expect("warmup command") {
        Command::Warmup(target) => assert!(target.sitemap.is_none()),
        _ => panic!("wrong command parsed"),
    }
    assert_eq!(args.overrides.log_level.as_deref(), Some("warn"));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "sitemill",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--cache-enabled",
        "false",
        "--cache-warm-on-start",
        "true",
    ]);

    assert_eq!(
        args.overrides.database_url.as_deref(),
        Some("postgres://override")
    );
    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.cache_enabled, Some(false));
            assert_eq!(serve.overrides.cache_warm_on_start, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn config_file_layers_over_defaults() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    std::io::Write::write_all(
        &mut file,
        br#"
        [site]
        base_url = "https://example.com/"

        [sitemaps.pages]
        table = "pages"
        "#,
    )
    .expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = CliArgs::parse_from(["sitemill", "--config-file", path.as_str(), "warmup"]);
    let settings = load(&args).expect("settings");

    assert_eq!(settings.site.base_url.as_str(), "https://example.com/");
    assert!(settings.sitemaps.contains_key("pages"));
    assert!(settings.cache.enabled);
}
