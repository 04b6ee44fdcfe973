//! Error types for the route controller

use thiserror::Error;

use crate::appliance::ApplianceError;

#[derive(Error, Debug)]
pub enum Error {
    /// A management API call failed
    #[error(transparent)]
    Appliance(#[from] ApplianceError),

    /// Building the HTTP client failed
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// scp or ssh did not complete
    #[error("File transfer failed: {0}")]
    TransferError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An SNI table has no entry for the route being removed
    #[error("Route {route} not found in {table}")]
    RouteNotFound { route: String, table: String },

    /// TLS routes need an SSH key to stage certificates
    #[error("Cannot configure TLS for route {0}: no SSH private key configured")]
    TlsUnavailable(String),

    /// A node address cannot be turned into a VTEP record
    #[error("Invalid VTEP address {0}: {1}")]
    InvalidVtep(String, String),
}

impl Error {
    /// Whether this is an appliance 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Appliance(e) if e.is_not_found())
    }

    /// Whether this is an appliance 409
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Appliance(e) if e.is_conflict())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
