use std::{process, sync::Arc};

use sitemill::{
    application::{
        error::{AppError, SitemapError},
        manager::{SitemapManager, WarmupEvent},
        registry::SitemapRegistry,
        router::RouteTable,
        source::DataSource,
        url::{LocaleSettings, UrlResolver},
    },
    cache::{CacheConfig, CacheStore, MemoryCacheStore, NoopCacheStore},
    config,
    domain::error::ConfigurationError,
    infra::{
        admin_client::AdminClient,
        db::PostgresDataSource,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
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

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Clear(target) => run_clear(settings, target).await,
        config::Command::Warmup(target) => run_warmup(settings, target).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let manager = Arc::new(build_manager(&settings).await?);
    info!(
        target = "sitemill::serve",
        sitemaps = manager.registry().len(),
        base_url = %settings.site.base_url,
        admin_routes = settings.admin.token.is_some(),
        "Starting sitemap server"
    );

    if settings.cache.warm_on_start {
        spawn_startup_warmup(Arc::clone(&manager));
    }

    let state = HttpState::new(manager).with_admin_token(settings.admin.token.clone());
    http::serve(settings.server.addr, state, settings.server.graceful_shutdown).await?;
    Ok(())
}

fn spawn_startup_warmup(manager: Arc<SitemapManager>) {
    tokio::spawn(async move {
        match manager.warmup(None, |_| {}).await {
            Ok(report) => info!(
                target = "sitemill::serve",
                sitemaps = report.sitemaps.len(),
                partitions = report.partitions,
                "Startup cache warmup finished"
            ),
            Err(err) => warn!(
                target = "sitemill::serve",
                error = %err,
                "Startup cache warmup failed; partitions load on demand"
            ),
        }
    });
}

async fn run_clear(
    settings: config::Settings,
    target: config::TargetArgs,
) -> Result<(), AppError> {
    ensure_registered(&settings, &target)?;
    let report = admin_client(&settings)?
        .invalidate(target.sitemap.as_deref())
        .await
        .map_err(InfraError::from)?;

    println!(
        "Cleared {} cache key(s) for {}",
        report.cleared.len(),
        target.sitemap.as_deref().unwrap_or("all sitemaps")
    );
    if !report.is_complete() {
        return Err(AppError::unexpected(format!(
            "failed to clear {} cache key(s): {}",
            report.failed.len(),
            report.failed.join(", ")
        )));
    }
    Ok(())
}

async fn run_warmup(
    settings: config::Settings,
    target: config::TargetArgs,
) -> Result<(), AppError> {
    ensure_registered(&settings, &target)?;
    let summary = admin_client(&settings)?
        .warmup(target.sitemap.as_deref())
        .await
        .map_err(InfraError::from)?;
    summary.events.into_iter().for_each(print_warmup_progress);

    let report = summary.report;
    println!(
        "Warmed {} partition(s) across {} sitemap(s)",
        report.partitions,
        report.sitemaps.len()
    );
    Ok(())
}

/// `clear` and `warmup` act on the cache of the running server through its admin routes.
fn admin_client(settings: &config::Settings) -> Result<AdminClient, AppError> {
    let token = settings.admin.token.as_deref().ok_or_else(|| {
        InfraError::configuration(
            "admin.token (or SITEMILL_ADMIN_TOKEN) must be set for the server and this command",
        )
    })?;
    AdminClient::new(settings.admin.url.clone(), token)
        .map_err(|err| AppError::from(InfraError::from(err)))
}

/// Reject unknown sitemap names before contacting the server.
fn ensure_registered(
    settings: &config::Settings,
    target: &config::TargetArgs,
) -> Result<(), AppError> {
    match target.sitemap.as_deref() {
        Some(name) if !settings.sitemaps.contains_key(name) => Err(AppError::from(
            SitemapError::from(ConfigurationError::UnknownSitemap(name.to_string())),
        )),
        _ => Ok(()),
    }
}

fn print_warmup_progress(event: WarmupEvent) {
    match event {
        WarmupEvent::Started { sitemap } => println!("Warming `{sitemap}`"),
        WarmupEvent::Latest { items, .. } => println!("  latest: {items} item(s)"),
        WarmupEvent::Year { year, items, .. } => println!("  {year}: {items} item(s)"),
        WarmupEvent::Chunk { chunk, chunks, .. } => println!("  chunk {chunk}/{chunks}"),
        WarmupEvent::Full { items, .. } => println!("  full: {items} item(s)"),
        WarmupEvent::Finished {
            sitemap,
            partitions,
        } => println!("Finished `{sitemap}` ({partitions} partitions)"),
    }
}

async fn build_manager(settings: &config::Settings) -> Result<SitemapManager, AppError> {
    let registry = Arc::new(SitemapRegistry::new());
    for (name, definition) in &settings.sitemaps {
        registry
            .register(name, definition.clone())
            .map_err(SitemapError::from)?;
    }
    if registry.is_empty() {
        info!(target = "sitemill::bootstrap", "No sitemaps configured");
    }

    let source = init_data_source(settings).await?;

    let cache_config = CacheConfig::from(&settings.cache);
    let cache: Arc<dyn CacheStore> = if cache_config.enabled {
        Arc::new(MemoryCacheStore::new(&cache_config))
    } else {
        Arc::new(NoopCacheStore)
    };

    let routes = settings.routes.iter().fold(
        RouteTable::new(settings.site.base_url.clone()),
        |table, (name, template)| table.with_route(name, template),
    );
    let urls = UrlResolver::new(
        settings.site.base_url.clone(),
        LocaleSettings {
            active: settings.site.active_locale.clone(),
            fallback: settings.site.fallback_locale.clone(),
        },
    )
    .with_router(Arc::new(routes));

    Ok(SitemapManager::new(registry, source, cache, urls)
        .with_single_flight(cache_config.single_flight))
}

async fn init_data_source(settings: &config::Settings) -> Result<Arc<dyn DataSource>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresDataSource::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let source = PostgresDataSource::new(pool, settings.site.active_locale.clone());
    source
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(source))
}
