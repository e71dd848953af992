#![forbid(unsafe_code)]
#![forbid(non_ascii_idents)]

mod domain;
mod infra;

use crate::{
    domain::{sql_backend_handler::SqlBackendHandler, sql_tables},
    infra::{
        cli::{Command, RunOpts, TestConnectionOpts},
        configuration::{self, Configuration, DatabaseUrl},
        connection_tester::{ConnectionTestParams, ConnectionTester},
        healthcheck,
        ldap::LdapDirectorySearcher,
        logging,
        orchestrator::SyncOrchestrator,
        scheduler::Scheduler,
        tcp_server,
    },
};
use actix::Actor;
use anyhow::{bail, Context, Result};
use sea_orm::Database;
use secstr::SecUtf8;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument};

async fn setup_sql_tables(database_url: &DatabaseUrl) -> Result<sql_tables::DbConnection> {
    let sql_pool = {
        let num_connections = if database_url.db_type() == "sqlite" {
            1
        } else {
            5
        };
        let mut sql_opt = sea_orm::ConnectOptions::new(database_url.to_string());
        sql_opt
            .max_connections(num_connections)
            .sqlx_logging(true)
            .sqlx_logging_level(log::LevelFilter::Debug);
        Database::connect(sql_opt).await?
    };
    sql_tables::init_table(&sql_pool)
        .await
        .context("while creating base tables")?;
    Ok(sql_pool)
}

#[instrument(skip_all)]
async fn set_up_server(
    config: Configuration,
) -> Result<(actix_web::dev::Server, sql_tables::DbConnection)> {
    info!("Starting dirsync version {}", env!("CARGO_PKG_VERSION"));

    let sql_pool = setup_sql_tables(&config.database_url).await?;
    let store = SqlBackendHandler::new(sql_pool.clone());
    let orchestrator = Arc::new(SyncOrchestrator::new(store, LdapDirectorySearcher));
    let tester = Arc::new(ConnectionTester::new(LdapDirectorySearcher));
    let server = tcp_server::build_tcp_server(&config, orchestrator.clone(), tester)
        .context("while binding the HTTP server")?;
    let scheduler = Scheduler::new(&config.sync_schedule, orchestrator);
    scheduler.start();
    Ok((server, sql_pool))
}

async fn run_server_command(opts: RunOpts) -> Result<()> {
    debug!("CLI: {:#?}", &opts);

    let config = configuration::init(opts)?;
    logging::init(&config)?;

    let (server, sql_pool) = set_up_server(config).await?;

    let result = server.await.context("while starting the server");
    if let Err(e) = sql_pool.close().await {
        error!("Error closing database connection pool: {}", e);
    }
    result
}

async fn run_healthcheck(opts: RunOpts) -> Result<()> {
    debug!("CLI: {:#?}", &opts);
    let config = configuration::init(opts)?;
    logging::init(&config)?;

    info!("Starting healthchecks");

    use tokio::time::timeout;
    let delay = Duration::from_millis(3000);
    match timeout(delay, healthcheck::check_api("localhost", config.http_port)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("Error running the health check: {:#}", e);
            bail!("Healthcheck failed")
        }
        Err(_) => {
            error!("Health check timed out");
            bail!("Healthcheck failed")
        }
    }
}

async fn create_schema_command(opts: RunOpts) -> Result<()> {
    debug!("CLI: {:#?}", &opts);
    let config = configuration::init(opts)?;
    logging::init(&config)?;
    let sql_pool = setup_sql_tables(&config.database_url).await?;
    info!("Schema created successfully.");
    if let Err(e) = sql_pool.close().await {
        error!("Error closing database connection pool: {}", e);
    }
    Ok(())
}

async fn test_connection_command(opts: TestConnectionOpts) -> Result<()> {
    let config = configuration::init(opts.clone())?;
    logging::init(&config)?;

    let port = opts.port.unwrap_or(if opts.use_tls { 636 } else { 389 });
    let params = ConnectionTestParams {
        server_address: opts.server_address,
        domain: opts.domain,
        admin_username: opts.admin_username,
        admin_password: SecUtf8::from(opts.admin_password),
        port,
        use_tls: opts.use_tls,
    };
    match ConnectionTester::new(LdapDirectorySearcher).test(params).await {
        Ok(report) => {
            println!(
                "Connected to {} as {}. {} users visible.",
                report.base_dn, report.bind_dn, report.users_count
            );
            for user in &report.sample_users {
                println!("  {} <{}>", user.display_name, user.email);
            }
            Ok(())
        }
        Err(e) => bail!("{}", e.user_message()),
    }
}

#[actix::main]
async fn main() -> Result<()> {
    let cli_opts = infra::cli::init();
    match cli_opts.command {
        Command::Run(opts) => run_server_command(opts).await,
        Command::HealthCheck(opts) => run_healthcheck(opts).await,
        Command::CreateSchema(opts) => create_schema_command(opts).await,
        Command::TestConnection(opts) => test_connection_command(opts).await,
    }
}
