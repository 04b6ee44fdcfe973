//! Error types for iControl REST calls

use thiserror::Error;

/// Failure of a single management API call.
///
/// Every variant records the HTTP verb and URL so that a log line alone is
/// enough to find the offending call.
#[derive(Error, Debug)]
pub enum ApplianceError {
    /// The request never produced a response
    #[error("{verb} {url} failed: {source}")]
    Transport {
        verb: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A success response whose body could not be decoded
    #[error("{verb} {url} returned an undecodable body: {reason}")]
    Decode {
        verb: String,
        url: String,
        reason: String,
    },

    /// HTTP 404
    #[error("{verb} {url} not found: {message}")]
    NotFound {
        verb: String,
        url: String,
        message: String,
    },

    /// HTTP 409
    #[error("{verb} {url} conflicts with an existing object: {message}")]
    Conflict {
        verb: String,
        url: String,
        message: String,
    },

    /// Any other status >= 400 with a JSON `{code, message}` body
    #[error("{verb} {url} rejected with status {code}: {message}")]
    ApplianceRejected {
        verb: String,
        url: String,
        code: u16,
        message: String,
    },

    /// Status >= 400 with a body that is not JSON (the appliance sometimes
    /// answers with an HTML error page)
    #[error("{verb} {url} rejected with status {code}")]
    OpaqueRejected { verb: String, url: String, code: u16 },
}

impl ApplianceError {
    pub(crate) fn from_status(verb: &str, url: &str, code: u16, message: Option<String>) -> Self {
        let verb = verb.to_string();
        let url = url.to_string();
        match (code, message) {
            (404, message) => ApplianceError::NotFound {
                verb,
                url,
                message: message.unwrap_or_default(),
            },
            (409, message) => ApplianceError::Conflict {
                verb,
                url,
                message: message.unwrap_or_default(),
            },
            (code, Some(message)) => ApplianceError::ApplianceRejected {
                verb,
                url,
                code,
                message,
            },
            (code, None) => ApplianceError::OpaqueRejected { verb, url, code },
        }
    }

    /// HTTP status of the response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApplianceError::NotFound { .. } => Some(404),
            ApplianceError::Conflict { .. } => Some(409),
            ApplianceError::ApplianceRejected { code, .. }
            | ApplianceError::OpaqueRejected { code, .. } => Some(*code),
            ApplianceError::Transport { .. } | ApplianceError::Decode { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApplianceError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApplianceError::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, ApplianceError>;
