// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

/// Errors reported by the network function management API.
///
/// Every variant names the operation and the resource it was applied to.
#[derive(Debug, thiserror::Error)]
pub enum ManagementApiError {
    /// The configured base URL cannot carry resource paths.
    #[error("invalid management api base url {0:?}")]
    BaseUrl(String),
    /// The request never got an answer.
    #[error("{operation} {resource}: request failed: {source}")]
    Transport {
        /// The operation attempted.
        operation: &'static str,
        /// The resource path.
        resource: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The management daemon answered with a non-success status.
    #[error("{operation} {resource}: rejected with status {status}: {body}")]
    Rejected {
        /// The operation attempted.
        operation: &'static str,
        /// The resource path.
        resource: String,
        /// The HTTP status code.
        status: u16,
        /// The response body, usually a message from the daemon.
        body: String,
    },
    /// The answer could not be decoded.
    #[error("{operation} {resource}: undecodable response: {detail}")]
    Decode {
        /// The operation attempted.
        operation: &'static str,
        /// The resource path.
        resource: String,
        /// What failed to decode.
        detail: String,
    },
}

impl ManagementApiError {
    /// The HTTP status of a rejected request.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ManagementApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
