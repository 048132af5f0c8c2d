//! Document API handlers: create, list, sync, poll trigger, resend.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::poll::{PollError, PollSummary};
use crate::reconcile::{ReconcileError, ReconcileSource};
use crate::remote::RemoteApiError;
use crate::store::StoreError;
use crate::types::{DocumentId, DocumentRecord, DocumentStatus, SignerContact, SignerPublicId};

use super::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("document {0} not found")]
    NotFound(DocumentId),

    #[error("remote document already tracked")]
    Conflict(String),

    #[error("a poll cycle is already running")]
    PollInFlight,

    #[error("signing service request failed")]
    Remote(#[source] RemoteApiError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::PollInFlight => (StatusCode::CONFLICT, self.to_string()),
            // The upstream detail goes to the log; the client gets a stable
            // message.
            ApiError::Remote(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Store(StoreError::NotFound(id)) => ApiError::NotFound(id),
            ReconcileError::Store(StoreError::DuplicateRemoteId(id)) => {
                ApiError::Conflict(format!("remote document {} already tracked", id))
            }
            ReconcileError::Remote(err) => ApiError::Remote(err),
            ReconcileError::Normalize(err) => ApiError::Validation(err.to_string()),
        }
    }
}

/// One signer in a creation request. Exactly one of `email`/`phone`.
#[derive(Debug, Deserialize)]
pub struct SignerInput {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl SignerInput {
    fn into_contact(self, index: usize) -> Result<SignerContact, ApiError> {
        let contact = match (self.email, self.phone) {
            (Some(email), None) => SignerContact::email(email),
            (None, Some(phone)) => SignerContact::phone(phone),
            (Some(_), Some(_)) => {
                return Err(ApiError::Validation(format!(
                    "signer {} has both email and phone; exactly one is required",
                    index
                )))
            }
            (None, None) => {
                return Err(ApiError::Validation(format!(
                    "signer {} has neither email nor phone",
                    index
                )))
            }
        };
        Ok(match self.display_name {
            Some(name) => contact.with_display_name(name),
            None => contact,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub name: String,
    pub signers: Vec<SignerInput>,
    #[serde(default)]
    pub sandbox: Option<bool>,
}

/// Sandbox selection: explicit request flag, else the configured default,
/// else the test-document naming convention.
fn resolve_sandbox(name: &str, requested: Option<bool>, default: bool) -> bool {
    if let Some(flag) = requested {
        return flag;
    }
    default || name.to_lowercase().contains("teste")
}

pub async fn create_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentRecord>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::Validation("document name must not be empty".into()));
    }
    if request.signers.is_empty() {
        return Err(ApiError::Validation("at least one signer is required".into()));
    }
    let contacts = request
        .signers
        .into_iter()
        .enumerate()
        .map(|(i, signer)| signer.into_contact(i))
        .collect::<Result<Vec<_>, _>>()?;

    let sandbox = resolve_sandbox(&request.name, request.sandbox, state.sandbox_default());

    let created = state
        .signing()
        .create_document(&request.name, &contacts, sandbox)
        .await
        .map_err(ApiError::Remote)?;

    let (id, handle) = state
        .store()
        .create(
            created.remote_id.clone(),
            request.name.clone(),
            created.total_signers,
            sandbox,
            contacts,
        )
        .map_err(|err| match err {
            StoreError::DuplicateRemoteId(remote) => {
                ApiError::Conflict(format!("remote document {} already tracked", remote))
            }
            StoreError::NotFound(id) => ApiError::NotFound(id),
        })?;

    info!(
        document_id = %id,
        remote_id = %created.remote_id,
        sandbox,
        signers = created.total_signers,
        "document created"
    );

    let record = handle.lock().await.clone();
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub sandbox: Option<bool>,
}

pub async fn list_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<DocumentRecord>> {
    let records = state
        .store()
        .list()
        .await
        .into_iter()
        .filter(|r| query.status.is_none_or(|s| r.status == s))
        .filter(|r| query.sandbox.is_none_or(|sb| r.is_sandbox == sb))
        .collect();
    Json(records)
}

pub async fn sync_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = DocumentId(id);
    let outcome = state.reconciler().reconcile(id, ReconcileSource::Poll).await?;
    Ok(Json(json!({
        "document_id": id,
        "changed": outcome.changed,
        "previous_status": outcome.previous_status,
        "status": outcome.new_status,
        "signed_count": outcome.signed_count,
        "rejected_count": outcome.rejected_count,
        "total_signers": outcome.total_signers,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn check_handler(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<PollSummary>, ApiError> {
    let summary = state
        .scheduler()
        .run_cycle(query.force)
        .await
        .map_err(|_: PollError| ApiError::PollInFlight)?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub public_ids: Vec<String>,
}

pub async fn resend_handler(
    State(state): State<AppState>,
    Json(request): Json<ResendRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.public_ids.is_empty() {
        return Err(ApiError::Validation("public_ids must not be empty".into()));
    }
    let ids: Vec<SignerPublicId> = request
        .public_ids
        .into_iter()
        .map(SignerPublicId::new)
        .collect();
    state
        .signing()
        .resend_signatures(&ids)
        .await
        .map_err(ApiError::Remote)?;
    info!(count = ids.len(), "signing invitations resent");
    Ok(Json(json!({ "message": "invitations resent", "count": ids.len() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_resolution_order() {
        // Explicit flag wins in both directions.
        assert!(resolve_sandbox("Contract", Some(true), false));
        assert!(!resolve_sandbox("Documento teste", Some(false), true));
        // Configured default.
        assert!(resolve_sandbox("Contract", None, true));
        // Naming convention.
        assert!(resolve_sandbox("Documento TESTE 1", None, false));
        assert!(!resolve_sandbox("Contract", None, false));
    }

    #[test]
    fn signer_input_requires_exactly_one_channel() {
        let both = SignerInput {
            email: Some("a@example.com".into()),
            phone: Some("+55".into()),
            display_name: None,
        };
        assert!(both.into_contact(0).is_err());

        let neither = SignerInput {
            email: None,
            phone: None,
            display_name: None,
        };
        assert!(neither.into_contact(0).is_err());

        let email = SignerInput {
            email: Some("a@example.com".into()),
            phone: None,
            display_name: Some("A".into()),
        };
        let contact = email.into_contact(0).unwrap();
        assert_eq!(contact.display_name.as_deref(), Some("A"));
    }
}
