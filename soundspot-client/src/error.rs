use thiserror::Error;

use crate::{StorageError, TransportError};

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Which session a token belonged to.
/// A rejected token only ever tears down its own session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScope {
    User,
    Admin,
}

/// Every error the client surfaces. The display strings are shown to users as they are.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    /// The request never got a response
    #[error("Unable to reach the server. Please check your connection and try again.")]
    Network(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    /// The server rejected the token, and the session it belonged to was ended
    #[error("Your session has expired. Please log in again.")]
    Unauthorized(AuthScope),
    /// The request was rejected as invalid. Server messages are passed through verbatim.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    /// Regular login or signup returned a privileged account
    #[error("Admin and reviewer accounts must sign in through the admin login")]
    AdminAccount,
    /// Admin login returned an account without admin or reviewer privileges
    #[error("This account does not have admin or reviewer privileges")]
    NotAdmin,
    #[error("You need to be logged in to do that")]
    NotLoggedIn,
    #[error("You need to be logged in as an admin or reviewer to do that")]
    AdminNotLoggedIn,
    #[error("{0}")]
    NotFound(String),
    /// A review targeted something that is not waiting for review
    #[error("{resource} {id} is not pending review")]
    NotPending { resource: &'static str, id: String },
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("Received an unexpected response from the server: {0}")]
    Parse(String),
    #[error("Could not access local storage: {0}")]
    Storage(String),
    /// The caller went away before the request finished
    #[error("The request was cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::NotLoggedIn | Self::AdminNotLoggedIn
        )
    }
}

impl From<TransportError> for ClientError {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Network(e) => Self::Network(e),
            TransportError::InvalidRequest(e) => Self::Validation(e),
        }
    }
}

impl From<StorageError> for ClientError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}
