//! One connection, bind, search, unbind cycle against a directory server.

use std::{io, time::Duration};

use ldap3::{
    adapters::PagedResults, Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry,
    SearchOptions,
};
use secstr::SecUtf8;
use tracing::{debug, instrument, warn};

use crate::domain::{
    error::{BindCause, ConnectionCause, DirectoryError},
    types::SyncConfig,
};

const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Watchdog for sessions opened by the scheduled sync.
pub const SCHEDULED_WATCHDOG: Duration = Duration::from_secs(30);
/// Watchdog for sessions opened by an interactive connection test.
pub const INTERACTIVE_WATCHDOG: Duration = Duration::from_secs(5);

/// How long teardown waits for the server to acknowledge the unbind
/// before dropping the handle, which closes the socket outright.
const TEARDOWN_GRACE: Duration = Duration::from_secs(1);

/// Connection and bind parameters of one session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub bind_dn: String,
    pub bind_secret: SecUtf8,
    pub watchdog: Duration,
}

impl SessionParams {
    pub fn from_config(config: &SyncConfig, watchdog: Duration) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            use_tls: config.use_tls,
            bind_dn: config.bind_dn.clone(),
            bind_secret: config.bind_secret.clone(),
            watchdog,
        }
    }

    fn url(&self) -> String {
        let scheme = if self.use_tls { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// One subtree search, paginated and optionally bounded.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base: String,
    pub filter: String,
    pub attributes: Vec<String>,
    pub page_size: i32,
    pub size_limit: Option<i32>,
}

/// Entries delivered by a settled search. `truncated` is set when the
/// server cut the result off at its size limit; the entries received up
/// to that point are still valid.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub entries: Vec<SearchEntry>,
    pub truncated: bool,
}

/// Single-assignment terminal state of a session. The first settlement
/// wins; later events are observed and dropped.
#[derive(Debug, Default)]
struct Settlement {
    outcome: Option<Result<SearchOutcome, DirectoryError>>,
}

impl Settlement {
    fn settle(&mut self, outcome: Result<SearchOutcome, DirectoryError>) {
        if self.outcome.is_some() {
            debug!("Dropping a late session event, the session is already settled");
            return;
        }
        self.outcome = Some(outcome);
    }

    fn into_outcome(self) -> Result<SearchOutcome, DirectoryError> {
        self.outcome.unwrap_or_else(|| {
            Err(DirectoryError::Search {
                detail: "session ended without an outcome".to_owned(),
            })
        })
    }
}

/// Owns the socket for exactly one connect, bind, search, unbind cycle.
/// Every exit path, the watchdog included, funnels into one settlement
/// and one teardown.
pub struct LdapSession {
    params: SessionParams,
    ldap: Option<Ldap>,
}

impl LdapSession {
    pub fn new(params: SessionParams) -> Self {
        Self { params, ldap: None }
    }

    /// Runs the full cycle under the session watchdog and returns its
    /// single outcome. The connection is closed before this returns, on
    /// the success, error and timeout paths alike.
    #[instrument(skip_all, level = "debug", fields(host = %self.params.host, port = self.params.port))]
    pub async fn run(mut self, search: SearchRequest) -> Result<SearchOutcome, DirectoryError> {
        let watchdog = self.params.watchdog;
        let mut settlement = Settlement::default();
        let completion = tokio::time::timeout(watchdog, self.execute(&search)).await;
        match completion {
            Ok(outcome) => settlement.settle(outcome),
            Err(_elapsed) => {
                warn!(
                    seconds = watchdog.as_secs(),
                    "Session watchdog fired, forcing teardown"
                );
                settlement.settle(Err(DirectoryError::WatchdogTimeout {
                    seconds: watchdog.as_secs(),
                }));
            }
        }
        self.teardown().await;
        settlement.into_outcome()
    }

    async fn execute(&mut self, search: &SearchRequest) -> Result<SearchOutcome, DirectoryError> {
        let mut ldap = self.connect().await?;
        self.bind(&mut ldap).await?;
        self.search(&mut ldap, search).await
    }

    async fn connect(&mut self) -> Result<Ldap, DirectoryError> {
        let url = self.params.url();
        debug!(%url, "Connecting to the directory");
        // Encryption is still negotiated; the server certificate is
        // accepted without chain validation.
        let settings = LdapConnSettings::new().set_no_tls_verify(true);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(classify_connect_error)?;
        tokio::spawn(async move {
            if let Err(error) = conn.drive().await {
                warn!(%error, "Connection driver error");
            }
        });
        // The original handle stays with the session so teardown can
        // reach the connection after a cancelled operation.
        self.ldap = Some(ldap.clone());
        Ok(ldap)
    }

    async fn bind(&mut self, ldap: &mut Ldap) -> Result<(), DirectoryError> {
        debug!(bind_dn = %self.params.bind_dn, "Binding");
        ldap.simple_bind(&self.params.bind_dn, self.params.bind_secret.unsecure())
            .await
            .map_err(classify_bind_error)?
            .success()
            .map_err(classify_bind_error)?;
        Ok(())
    }

    async fn search(
        &mut self,
        ldap: &mut Ldap,
        search: &SearchRequest,
    ) -> Result<SearchOutcome, DirectoryError> {
        if let Some(limit) = search.size_limit {
            ldap.with_search_options(SearchOptions::new().sizelimit(limit));
        }
        let mut stream = ldap
            .streaming_search_with(
                PagedResults::new(search.page_size),
                &search.base,
                Scope::Subtree,
                &search.filter,
                search.attributes.clone(),
            )
            .await
            .map_err(classify_search_error)?;

        let mut entries = Vec::new();
        let mut truncated = false;
        loop {
            match stream.next().await {
                Ok(Some(entry)) => entries.push(SearchEntry::construct(entry)),
                Ok(None) => break,
                // The server cut the search off at its size limit. Keep
                // what was received; the session completes normally.
                Err(LdapError::LdapResult { result })
                    if result.rc == RC_SIZE_LIMIT_EXCEEDED =>
                {
                    truncated = true;
                    break;
                }
                Err(error) => return Err(classify_search_error(error)),
            }
        }
        let result = stream.finish().await;
        if result.rc == RC_SIZE_LIMIT_EXCEEDED {
            truncated = true;
        } else if result.rc != 0 && !truncated {
            return Err(DirectoryError::Search {
                detail: format!("result code {}: {}", result.rc, result.text),
            });
        }
        if truncated {
            debug!(
                entries = entries.len(),
                "Server size limit reached, keeping the entries received so far"
            );
        }
        debug!(entries = entries.len(), "Search settled");
        Ok(SearchOutcome { entries, truncated })
    }

    async fn teardown(&mut self) {
        if let Some(mut ldap) = self.ldap.take() {
            // Dropping the handle closes the connection should the server
            // not answer the unbind within the grace period.
            match tokio::time::timeout(TEARDOWN_GRACE, ldap.unbind()).await {
                Ok(Err(error)) => debug!(%error, "Ignoring an unbind failure during teardown"),
                Ok(Ok(())) | Err(_) => (),
            }
        }
    }
}

fn classify_connect_error(error: LdapError) -> DirectoryError {
    let detail = error.to_string();
    let cause = match &error {
        LdapError::Io { source } => connection_cause_from_io(source),
        LdapError::Timeout { .. } => ConnectionCause::RefusedOrTimedOut,
        LdapError::EndOfStream => ConnectionCause::Reset,
        _ => ConnectionCause::Other,
    };
    DirectoryError::Connection { cause, detail }
}

fn classify_bind_error(error: LdapError) -> DirectoryError {
    let detail = error.to_string();
    match &error {
        LdapError::LdapResult { result } if result.rc == RC_INVALID_CREDENTIALS => {
            DirectoryError::Authentication {
                cause: BindCause::InvalidCredentials,
                detail,
            }
        }
        LdapError::Timeout { .. } => DirectoryError::Authentication {
            cause: BindCause::Timeout,
            detail,
        },
        // A socket failure during the bind is a connection problem, not a
        // credential problem.
        LdapError::Io { source } => DirectoryError::Connection {
            cause: connection_cause_from_io(source),
            detail,
        },
        LdapError::EndOfStream => DirectoryError::Connection {
            cause: ConnectionCause::Reset,
            detail,
        },
        _ => DirectoryError::Authentication {
            cause: BindCause::Other,
            detail,
        },
    }
}

fn classify_search_error(error: LdapError) -> DirectoryError {
    DirectoryError::Search {
        detail: error.to_string(),
    }
}

fn connection_cause_from_io(source: &io::Error) -> ConnectionCause {
    match source.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut => {
            ConnectionCause::RefusedOrTimedOut
        }
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ConnectionCause::Reset,
        io::ErrorKind::NotFound => ConnectionCause::HostNotFound,
        _ => {
            // Resolver failures come through as uncategorized I/O errors
            // and are only recognizable by their message.
            let text = source.to_string();
            if text.contains("lookup") || text.contains("resolve") {
                ConnectionCause::HostNotFound
            } else {
                ConnectionCause::Other
            }
        }
    }
}
