use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the sitemill binary.
#[derive(Debug, Parser)]
#[command(name = "sitemill", version, about = "Partitioned, cached sitemap server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SITEMILL_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve the sitemap index and partition files over HTTP.
    Serve(Box<ServeArgs>),
    /// Forget cached partitions of one sitemap, or of every sitemap and the index.
    Clear(TargetArgs),
    /// Populate the cache for one sitemap, or for every sitemap.
    Warmup(TargetArgs),
}

#[derive(Debug, Args, Clone)]
pub struct TargetArgs {
    /// Registered sitemap name; omit to process all of them.
    #[arg(value_name = "TYPE")]
    pub sitemap: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

/// Overrides accepted by every command.
#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the public base URL used for absolute sitemap links.
    #[arg(long = "site-base-url", value_name = "URL", global = true)]
    pub site_base_url: Option<String>,

    /// Base URL of the running server that `clear` and `warmup` talk to.
    #[arg(long = "admin-url", value_name = "URL", global = true)]
    pub admin_url: Option<String>,

    /// Bearer token guarding the admin routes.
    #[arg(
        long = "admin-token",
        env = "SITEMILL_ADMIN_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true,
        global = true
    )]
    pub admin_token: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the HTTP database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Enable or disable the in-memory partition cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the maximum number of cached partitions.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<u64>,

    /// Warm every sitemap in the background after startup.
    #[arg(
        long = "cache-warm-on-start",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_warm_on_start: Option<bool>,
}
