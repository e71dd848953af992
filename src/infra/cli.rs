use crate::infra::configuration::DatabaseUrl;
use clap::Parser;

/// dirsync keeps local user accounts in step with directory servers.
#[derive(Debug, Parser, Clone)]
#[clap(version, author)]
pub struct CliOpts {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Parser, Clone)]
pub enum Command {
    /// Run the sync server.
    #[clap(name = "run")]
    Run(RunOpts),
    /// Create database schema.
    #[clap(name = "create_schema")]
    CreateSchema(RunOpts),
    /// Check whether the sync server is up.
    #[clap(name = "healthcheck")]
    HealthCheck(RunOpts),
    /// Probe a directory server with one-off credentials.
    #[clap(name = "test_connection")]
    TestConnection(TestConnectionOpts),
}

#[derive(Debug, Parser, Clone)]
pub struct GeneralConfigOpts {
    /// Change config file name.
    #[clap(
        short,
        long,
        default_value = "dirsync_config.toml",
        env = "DIRSYNC_CONFIG_FILE"
    )]
    pub config_file: String,

    /// Set verbose logging.
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct RunOpts {
    #[clap(flatten)]
    pub general_config: GeneralConfigOpts,

    /// Change HTTP port. Default: 8210
    #[clap(long, env = "DIRSYNC_HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Change HTTP host. Default: 0.0.0.0
    #[clap(long, env = "DIRSYNC_HTTP_HOST")]
    pub http_host: Option<String>,

    /// Database connection URL.
    #[clap(long, env = "DIRSYNC_DATABASE_URL")]
    pub database_url: Option<DatabaseUrl>,

    /// Cron expression for the periodic due-sync check.
    #[clap(long, env = "DIRSYNC_SYNC_SCHEDULE")]
    pub sync_schedule: Option<String>,
}

#[derive(Debug, Parser, Clone)]
pub struct TestConnectionOpts {
    #[clap(flatten)]
    pub general_config: GeneralConfigOpts,

    /// Directory server host name or IP address.
    #[clap(long)]
    pub server_address: String,

    /// Active Directory domain, e.g. "corp.example.com".
    #[clap(long)]
    pub domain: String,

    /// Administrator account name, without the domain suffix.
    #[clap(long)]
    pub admin_username: String,

    /// Administrator password.
    #[clap(long, env = "DIRSYNC_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: String,

    /// Directory port. Defaults to 636 with TLS, 389 without.
    #[clap(long)]
    pub port: Option<u16>,

    /// Connect with TLS (LDAPS).
    #[clap(long)]
    pub use_tls: bool,
}

pub fn init() -> CliOpts {
    CliOpts::parse()
}
