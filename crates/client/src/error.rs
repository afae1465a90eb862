use thiserror::Error;

use famreport_core::DomainError;
use famreport_core::export::ExportError;

use crate::prefs::StorageError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("backend error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    /// A 2xx body without `success: true` where the caller needs real data.
    #[error("backend returned no data for {0}")]
    NoData(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}
