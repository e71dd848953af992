use thiserror::Error;

/// How a failed connection attempt should be reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionCause {
    HostNotFound,
    RefusedOrTimedOut,
    Reset,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindCause {
    InvalidCredentials,
    Timeout,
    Other,
}

/// Fatal outcomes of one directory session. Size-limit truncation is not an
/// error and is reported through the search outcome instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Connection error: `{detail}`")]
    Connection {
        cause: ConnectionCause,
        detail: String,
    },
    #[error("Authentication error: `{detail}`")]
    Authentication { cause: BindCause, detail: String },
    #[error("Search error: `{detail}`")]
    Search { detail: String },
    #[error("Directory operation exceeded {seconds} seconds")]
    WatchdogTimeout { seconds: u64 },
}

impl DirectoryError {
    /// Message shown to the administrator running an interactive
    /// connection test.
    pub fn user_message(&self) -> String {
        match self {
            DirectoryError::Connection { cause, detail } => match cause {
                ConnectionCause::HostNotFound => {
                    "Server not found. Check the server address.".to_owned()
                }
                ConnectionCause::RefusedOrTimedOut => {
                    "Could not connect. Check the server address and port.".to_owned()
                }
                ConnectionCause::Reset => {
                    "Connection closed during handshake. Check the port and TLS setting."
                        .to_owned()
                }
                ConnectionCause::Other => format!("Connection failed: {detail}"),
            },
            DirectoryError::Authentication { cause, detail } => match cause {
                BindCause::InvalidCredentials => {
                    "The directory rejected the credentials. Check the username and password."
                        .to_owned()
                }
                BindCause::Timeout => "The directory did not answer the bind in time.".to_owned(),
                BindCause::Other => format!("Bind failed: {detail}"),
            },
            DirectoryError::Search { detail } => format!("Search failed: {detail}"),
            DirectoryError::WatchdogTimeout { seconds } => {
                format!("The directory did not respond within {seconds} seconds.")
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Database error: `{0}`")]
    DatabaseError(#[from] sea_orm::DbErr),
    #[error("Entity not found: `{0}`")]
    EntityNotFound(String),
    #[error("Internal error: `{0}`")]
    InternalError(String),
    #[error("{0}")]
    DirectoryError(#[from] DirectoryError),
}

pub type Result<T> = std::result::Result<T, DomainError>;
