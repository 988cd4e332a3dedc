use axum::http::{StatusCode, header};
use axum_core::response::{IntoResponse as AxumCoreIntoResponse, Response};
use std::error::Error;

use crate::kvform::{self, KvFormError};
use crate::signing::Algorithm;

/// Errors raised by the signing authority.
///
/// Only caller contract violations and store failures surface here. A
/// relying party presenting an unknown, expired or forged handle is normal
/// traffic and is reported through `None` / `false` instead.
#[derive(Debug, thiserror::Error)]
pub enum SignatoryError {
    #[error("association handle must not be empty")]
    MissingHandle,
    #[error("smart associations require a provider request context")]
    MissingProviderContext,
    #[error("request is missing required argument `{0}`")]
    MissingArgument(&'static str),
    #[error("unsupported association type: {0}")]
    UnsupportedAlgorithm(String),
    #[error("{algorithm} requires a {expected}-byte secret, got {actual}")]
    SecretLength {
        algorithm: Algorithm,
        expected: usize,
        actual: usize,
    },
    #[error("stored association secret is not valid base64: {0}")]
    SecretEncoding(#[from] base64::DecodeError),
    #[error("signed field `{0}` is not present in the message")]
    MissingField(String),
    #[error(transparent)]
    KvForm(#[from] KvFormError),
    #[error("association store failure: {0}")]
    Store(Box<dyn Error + Send + Sync + 'static>),
}

impl SignatoryError {
    pub(crate) fn store<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::Store(Box::new(error))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderServerError {
    #[error(transparent)]
    Signatory(#[from] SignatoryError),
    #[error("Invalid request from relying party: {0}")]
    BadRelyingPartyRequest(String),
    /// The relying party asked for something this provider will not set up.
    /// `suggested` is an association type its protocol version accepts.
    #[error("Unsupported association request: {message}")]
    UnsupportedAssociation {
        message: String,
        suggested: Algorithm,
    },
}

impl ProviderServerError {
    fn kv_error(message: &str, suggested: Option<Algorithm>) -> String {
        let mut pairs = vec![("error", message)];
        if let Some(algorithm) = suggested {
            pairs.push(("error_code", "unsupported-type"));
            pairs.push(("session_type", "no-encryption"));
            pairs.push(("assoc_type", algorithm.name()));
        }
        // Error text never carries newlines or colons in keys, but fall back
        // to a bare line rather than failing inside the error path.
        kvform::encode(pairs).unwrap_or_else(|_| format!("error:{message}\n"))
    }
}

/// Trait implementation to convert this error into an axum http response
impl AxumCoreIntoResponse for ProviderServerError {
    fn into_response(self) -> Response {
        let content_type = [(header::CONTENT_TYPE, "text/plain; charset=utf-8")];
        match self {
            bad_request_error @ ProviderServerError::BadRelyingPartyRequest(_) => {
                let body = Self::kv_error(&bad_request_error.to_string(), None);
                (StatusCode::BAD_REQUEST, content_type, body).into_response()
            }
            ProviderServerError::UnsupportedAssociation { message, suggested } => {
                let message = format!("Unsupported association request: {message}");
                let body = Self::kv_error(&message, Some(suggested));
                (StatusCode::BAD_REQUEST, content_type, body).into_response()
            }
            ProviderServerError::Signatory(SignatoryError::UnsupportedAlgorithm(name)) => {
                let body = Self::kv_error(&format!("unsupported association type: {name}"), None);
                (StatusCode::BAD_REQUEST, content_type, body).into_response()
            }
            ProviderServerError::Signatory(SignatoryError::MissingArgument(name)) => {
                let body = Self::kv_error(&format!("missing argument: {name}"), None);
                (StatusCode::BAD_REQUEST, content_type, body).into_response()
            }
            other => {
                tracing::error!(error = %other, "internal provider error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something wrong happened.",
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_relying_party_request_returns_400() {
        let error = ProviderServerError::BadRelyingPartyRequest("bad".into());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unsupported_algorithm_returns_400() {
        let error = ProviderServerError::Signatory(SignatoryError::UnsupportedAlgorithm(
            "HMAC-MD5".into(),
        ));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_failure_returns_500() {
        let io = std::io::Error::other("disk on fire");
        let error = ProviderServerError::Signatory(SignatoryError::store(io));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_provider_context_returns_500() {
        let error = ProviderServerError::Signatory(SignatoryError::MissingProviderContext);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn kv_error_carries_error_code_and_suggested_type() {
        let body = ProviderServerError::kv_error("nope", Some(Algorithm::HmacSha1));
        assert_eq!(
            body,
            "error:nope\nerror_code:unsupported-type\nsession_type:no-encryption\nassoc_type:HMAC-SHA1\n"
        );
    }

    #[test]
    fn unsupported_association_returns_400() {
        let error = ProviderServerError::UnsupportedAssociation {
            message: "DH-SHA1".into(),
            suggested: Algorithm::HmacSha256,
        };
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
