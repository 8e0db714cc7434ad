use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RemoteError>;

#[derive(Error, Debug)]
pub enum RemoteError {
    /// The server answered with a non-success status. `message` is the
    /// server's own explanation when the body carried one, otherwise the
    /// status line.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error("invalid server URL `{0}`")]
    InvalidHost(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}
