use crate::{
    domain::{
        error::DomainError,
        handler::{SyncConfigHandler, UserStoreHandler},
    },
    infra::{
        configuration::Configuration,
        connection_tester::{ConnectionTestParams, ConnectionTestReport, ConnectionTester},
        ldap::DirectorySearcher,
        logging::CustomRootSpanBuilder,
        orchestrator::SyncOrchestrator,
    },
};
use actix_web::{dev::Server, web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(thiserror::Error, Debug)]
pub enum TcpError {
    #[error("`{0}`")]
    DomainError(#[from] DomainError),
    #[error("Bad request: `{0}`")]
    BadRequest(String),
}

pub type TcpResult<T> = std::result::Result<T, TcpError>;

pub(crate) fn error_to_http_response(error: TcpError) -> HttpResponse {
    match error {
        TcpError::DomainError(ref de) => match de {
            DomainError::DatabaseError(_)
            | DomainError::InternalError(_)
            | DomainError::DirectoryError(_) => HttpResponse::InternalServerError(),
            DomainError::EntityNotFound(_) => HttpResponse::BadRequest(),
        },
        TcpError::BadRequest(_) => HttpResponse::BadRequest(),
    }
    .body(error.to_string())
}

pub(crate) struct AppState<Store, Searcher> {
    pub orchestrator: Arc<SyncOrchestrator<Store, Searcher>>,
    pub tester: Arc<ConnectionTester<Searcher>>,
}

/// Body returned by the connection test endpoint. Directory failures are
/// part of the normal response, not HTTP errors.
#[derive(Serialize)]
struct ConnectionTestResponse {
    success: bool,
    #[serde(flatten)]
    report: Option<ConnectionTestReport>,
    error: Option<String>,
}

async fn run_due_syncs<Store, Searcher>(
    data: &web::Data<AppState<Store, Searcher>>,
) -> TcpResult<HttpResponse>
where
    Store: UserStoreHandler + SyncConfigHandler + Send + Sync + 'static,
    Searcher: DirectorySearcher + 'static,
{
    let outcome = data.orchestrator.run_due_configurations().await?;
    Ok(HttpResponse::Ok().json(outcome))
}

async fn run_due_syncs_handler<Store, Searcher>(
    data: web::Data<AppState<Store, Searcher>>,
) -> HttpResponse
where
    Store: UserStoreHandler + SyncConfigHandler + Send + Sync + 'static,
    Searcher: DirectorySearcher + 'static,
{
    run_due_syncs(&data)
        .await
        .unwrap_or_else(error_to_http_response)
}

async fn test_connection<Store, Searcher>(
    data: &web::Data<AppState<Store, Searcher>>,
    request: web::Json<ConnectionTestParams>,
) -> TcpResult<HttpResponse>
where
    Store: UserStoreHandler + SyncConfigHandler + Send + Sync + 'static,
    Searcher: DirectorySearcher + 'static,
{
    if request.server_address.trim().is_empty() || request.domain.trim().is_empty() {
        return Err(TcpError::BadRequest(
            "server_address and domain are required".to_owned(),
        ));
    }
    let response = match data.tester.test(request.into_inner()).await {
        Ok(report) => ConnectionTestResponse {
            success: true,
            report: Some(report),
            error: None,
        },
        Err(error) => ConnectionTestResponse {
            success: false,
            report: None,
            error: Some(error.user_message()),
        },
    };
    Ok(HttpResponse::Ok().json(response))
}

async fn test_connection_handler<Store, Searcher>(
    data: web::Data<AppState<Store, Searcher>>,
    request: web::Json<ConnectionTestParams>,
) -> HttpResponse
where
    Store: UserStoreHandler + SyncConfigHandler + Send + Sync + 'static,
    Searcher: DirectorySearcher + 'static,
{
    test_connection(&data, request)
        .await
        .unwrap_or_else(error_to_http_response)
}

fn http_config<Store, Searcher>(
    cfg: &mut web::ServiceConfig,
    orchestrator: Arc<SyncOrchestrator<Store, Searcher>>,
    tester: Arc<ConnectionTester<Searcher>>,
) where
    Store: UserStoreHandler + SyncConfigHandler + Send + Sync + 'static,
    Searcher: DirectorySearcher + 'static,
{
    cfg.app_data(web::Data::new(AppState::<Store, Searcher> {
        orchestrator,
        tester,
    }))
    .route(
        "/health",
        web::get().to(|| async { HttpResponse::Ok().finish() }),
    )
    // API endpoint.
    .service(
        web::scope("/api/sync")
            .route("/run", web::post().to(run_due_syncs_handler::<Store, Searcher>))
            .route(
                "/test-connection",
                web::post().to(test_connection_handler::<Store, Searcher>),
            ),
    );
}

pub fn build_tcp_server<Store, Searcher>(
    config: &Configuration,
    orchestrator: Arc<SyncOrchestrator<Store, Searcher>>,
    tester: Arc<ConnectionTester<Searcher>>,
) -> Result<Server>
where
    Store: UserStoreHandler + SyncConfigHandler + Send + Sync + 'static,
    Searcher: DirectorySearcher + 'static,
{
    let verbose = config.verbose;
    info!("Starting the API server on port {}", config.http_port);
    Ok(HttpServer::new(move || {
        let orchestrator = orchestrator.clone();
        let tester = tester.clone();
        App::new()
            .wrap(actix_web::middleware::Condition::new(
                verbose,
                tracing_actix_web::TracingLogger::<CustomRootSpanBuilder>::new(),
            ))
            .configure(move |cfg| http_config(cfg, orchestrator, tester))
    })
    .workers(1)
    .bind((config.http_host.clone(), config.http_port))
    .with_context(|| {
        format!(
            "While bringing up the HTTP server with port {}",
            config.http_port
        )
    })?
    .run())
}
