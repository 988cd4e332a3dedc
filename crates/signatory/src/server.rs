use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Form, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response as HttpResponse},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{ProviderServerError, SignatoryError};
use crate::kvform;
use crate::protocol::{DirectRequest, Protocol, ProviderContext, fields};
use crate::signing::{AssociationClass, MemoryStore, Signatory};

#[derive(Clone)]
pub struct AppState {
    pub signatory: Arc<Signatory<MemoryStore>>,
}

impl AppState {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            signatory: Arc::new(Signatory::new(store)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/healthcheck",
            get(|| async move { (StatusCode::OK, "Ok").into_response() }),
        )
        .route("/openid", post(openid_handler))
        .with_state(state)
}

pub async fn run(host: String, port: u16, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;
    tracing::info!(address = %listener.local_addr()?, "provider listening");

    axum::serve(listener, router(state))
        .await
        .context("serving provider endpoint")?;

    Ok(())
}

/// Direct-communication endpoint; dispatches on `openid.mode`.
async fn openid_handler(
    State(state): State<AppState>,
    Form(args): Form<HashMap<String, String>>,
) -> Result<HttpResponse, ProviderServerError> {
    let request = DirectRequest::new(args);
    match request.mode() {
        Some(fields::MODE_ASSOCIATE) => associate(&state, &request).await,
        Some(fields::MODE_CHECK_AUTHENTICATION) => check_authentication(&state, &request).await,
        Some(other) => Err(ProviderServerError::BadRelyingPartyRequest(format!(
            "unsupported mode `{other}`"
        ))),
        None => Err(ProviderServerError::BadRelyingPartyRequest(
            "missing openid.mode".to_string(),
        )),
    }
}

/// Establish a smart association over an unencrypted session.
async fn associate(
    state: &AppState,
    request: &DirectRequest,
) -> Result<HttpResponse, ProviderServerError> {
    let protocol = request.protocol();
    let session_type = request.arg(fields::SESSION_TYPE).unwrap_or_default();
    if !session_type.is_empty() && session_type != fields::SESSION_NO_ENCRYPTION {
        return Err(ProviderServerError::UnsupportedAssociation {
            message: format!("session type `{session_type}` is not supported"),
            suggested: protocol.preferred_algorithm(),
        });
    }

    let association = state
        .signatory
        .create_association(AssociationClass::Smart, Some(request as &dyn ProviderContext))
        .await
        .map_err(|err| match err {
            SignatoryError::UnsupportedAlgorithm(name) => {
                ProviderServerError::UnsupportedAssociation {
                    message: format!("association type `{name}` is not supported"),
                    suggested: protocol.preferred_algorithm(),
                }
            }
            other => other.into(),
        })?;

    let mut pairs = Vec::new();
    if let Some(ns) = protocol.namespace() {
        pairs.push((fields::NS, ns.to_string()));
    }
    pairs.push((fields::ASSOC_HANDLE, association.handle().to_string()));
    pairs.push((fields::ASSOC_TYPE, association.algorithm().to_string()));
    if protocol == Protocol::V20 {
        pairs.push((fields::SESSION_TYPE, fields::SESSION_NO_ENCRYPTION.to_string()));
    }
    pairs.push((
        fields::EXPIRES_IN,
        association.lifetime().num_seconds().to_string(),
    ));
    pairs.push((fields::MAC_KEY, STANDARD.encode(association.secret())));

    kv_response(pairs)
}

/// Answer a dumb relying party's request to confirm a signature.
async fn check_authentication(
    state: &AppState,
    request: &DirectRequest,
) -> Result<HttpResponse, ProviderServerError> {
    let required = |name: &str| {
        request.arg(name).ok_or_else(|| {
            ProviderServerError::BadRelyingPartyRequest(format!("missing openid.{name}"))
        })
    };
    let handle = required(fields::ASSOC_HANDLE)?;
    let signature = required(fields::SIG)?;
    let signed = required(fields::SIGNED)?;
    let key_order: Vec<&str> = signed.split(',').collect();

    // The assertion was signed as `id_res`; the mode was rewritten in transit.
    let mut message = request.args().clone();
    message.insert(
        fields::prefixed(fields::MODE),
        fields::MODE_ID_RES.to_string(),
    );

    let is_valid = state
        .signatory
        .verify(handle, signature, &message, &key_order)
        .await?;
    if is_valid {
        // One successful check per assertion.
        state
            .signatory
            .invalidate(handle, AssociationClass::Dumb)
            .await?;
    }

    let mut pairs = Vec::new();
    if let Some(ns) = request.protocol().namespace() {
        pairs.push((fields::NS, ns.to_string()));
    }
    pairs.push((fields::IS_VALID, is_valid.to_string()));

    if let Some(stale) = request
        .arg(fields::INVALIDATE_HANDLE)
        .filter(|handle| !handle.is_empty())
    {
        let live = state
            .signatory
            .get_association(stale, AssociationClass::Smart)
            .await?;
        if live.is_none() {
            pairs.push((fields::INVALIDATE_HANDLE, stale.to_string()));
        }
    }

    tracing::info!(handle, is_valid, "check_authentication");
    kv_response(pairs)
}

fn kv_response(pairs: Vec<(&str, String)>) -> Result<HttpResponse, ProviderServerError> {
    let body = kvform::encode(pairs).map_err(SignatoryError::from)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}
