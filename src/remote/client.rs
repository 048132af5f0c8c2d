//! GraphQL-over-HTTP client for the remote e-signature service.
//!
//! The service exposes a single GraphQL endpoint authenticated with a bearer
//! token. Every request carries an explicit 60-second timeout; the service is
//! known to stall on large documents and a hung poll cycle is worse than a
//! failed one. There is no retry loop in here. Transient failures surface as
//! [`RemoteErrorKind::Transient`] and the poll cadence is the retry policy.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::types::{ContactChannel, RemoteDocumentId, SignerContact, SignerPublicId};

use super::error::{RemoteApiError, RemoteErrorKind};
use super::snapshot::{self, NormalizedSnapshot};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("signtrack/", env!("CARGO_PKG_VERSION"));

const GET_DOCUMENT_QUERY: &str = "\
query GetDocument($id: UUID!) {
  document(id: $id) {
    id
    name
    sandbox
    created_at
    signatures {
      public_id
      name
      email
      signed { created_at }
      rejected { created_at reason }
    }
  }
}";

const CREATE_DOCUMENT_MUTATION: &str = "\
mutation CreateDocument($document: DocumentInput!, $signers: [SignerInput!]!, $sandbox: Boolean!) {
  createDocument(document: $document, signers: $signers, sandbox: $sandbox) {
    id
    name
    sandbox
    signatures { public_id email }
  }
}";

const RESEND_SIGNATURES_MUTATION: &str = "\
mutation ResendSignatures($public_ids: [UUID!]!) {
  resendSignatures(public_ids: $public_ids)
}";

/// Client for the signing service, scoped to one endpoint and token.
#[derive(Clone)]
pub struct SigningClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

/// Remote-side result of creating a signing request.
#[derive(Debug, Clone)]
pub struct CreatedDocument {
    pub remote_id: RemoteDocumentId,
    pub total_signers: u32,
    pub signer_public_ids: Vec<SignerPublicId>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
}

impl SigningClient {
    /// Creates a client for the given endpoint and bearer token.
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, RemoteApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(RemoteApiError::from_transport)?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            token: token.into(),
        })
    }

    /// Sends one GraphQL request and returns the `data` object.
    async fn graphql(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, RemoteApiError> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(RemoteApiError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteApiError::from_status(
                status.as_u16(),
                format!("signing service returned HTTP {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(RemoteApiError::from_transport)?;

        // A misconfigured endpoint or expired token gets an HTML login page
        // back instead of JSON.
        if body.trim_start().starts_with('<') {
            return Err(RemoteApiError::permanent(
                "signing service returned HTML instead of JSON; check API URL and token",
            ));
        }

        let parsed: GraphQlResponse = serde_json::from_str(&body).map_err(|err| {
            RemoteApiError::permanent(format!("unparseable response body: {}", err))
        })?;

        if let Some(first) = parsed.errors.first() {
            return Err(categorize_graphql_error(&first.message));
        }

        parsed
            .data
            .ok_or_else(|| RemoteApiError::permanent("response contained neither data nor errors"))
    }

    /// Fetches the raw document payload for one remote document.
    ///
    /// A null `document` in the response means the remote service does not
    /// know the ID, which is permanent.
    pub async fn get_document(
        &self,
        remote_id: &RemoteDocumentId,
    ) -> Result<serde_json::Value, RemoteApiError> {
        let data = self
            .graphql(GET_DOCUMENT_QUERY, json!({ "id": remote_id.as_str() }))
            .await?;

        match data.get("document") {
            Some(doc) if !doc.is_null() => Ok(doc.clone()),
            _ => Err(RemoteApiError::permanent_with_status(
                404,
                format!("document {} not found on signing service", remote_id),
            )),
        }
    }

    /// Fetches and normalizes the authoritative snapshot for one document.
    ///
    /// Returns the normalized counts together with the raw payload so the
    /// caller can persist the payload for audit.
    pub async fn fetch_snapshot(
        &self,
        remote_id: &RemoteDocumentId,
    ) -> Result<(NormalizedSnapshot, serde_json::Value), RemoteApiError> {
        let payload = self.get_document(remote_id).await?;
        let snapshot = snapshot::normalize(&payload)
            .map_err(|err| RemoteApiError::permanent(err.to_string()))?;
        Ok((snapshot, payload))
    }

    /// Submits a new signing request.
    pub async fn create_document(
        &self,
        name: &str,
        signers: &[SignerContact],
        sandbox: bool,
    ) -> Result<CreatedDocument, RemoteApiError> {
        let signer_inputs: Vec<serde_json::Value> =
            signers.iter().map(signer_input).collect();
        let variables = json!({
            "document": { "name": name },
            "signers": signer_inputs,
            "sandbox": sandbox,
        });

        let data = self.graphql(CREATE_DOCUMENT_MUTATION, variables).await?;
        let created = data.get("createDocument").ok_or_else(|| {
            RemoteApiError::permanent("createDocument missing from mutation response")
        })?;

        let remote_id = created
            .get("id")
            .and_then(|v| v.as_str())
            .map(RemoteDocumentId::new)
            .ok_or_else(|| {
                RemoteApiError::permanent("created document has no id in mutation response")
            })?;

        let signatures = created
            .get("signatures")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let signer_public_ids = signatures
            .iter()
            .filter_map(|s| s.get("public_id").and_then(|v| v.as_str()))
            .map(SignerPublicId::new)
            .collect::<Vec<_>>();

        Ok(CreatedDocument {
            remote_id,
            total_signers: signatures.len() as u32,
            signer_public_ids,
        })
    }

    /// Asks the remote service to resend signing invitations.
    pub async fn resend_signatures(
        &self,
        public_ids: &[SignerPublicId],
    ) -> Result<(), RemoteApiError> {
        let ids: Vec<&str> = public_ids.iter().map(|id| id.as_str()).collect();
        self.graphql(RESEND_SIGNATURES_MUTATION, json!({ "public_ids": ids }))
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for SigningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

fn signer_input(contact: &SignerContact) -> serde_json::Value {
    let mut input = match &contact.channel {
        ContactChannel::Email(addr) => json!({ "email": addr, "action": "SIGN" }),
        ContactChannel::Phone(number) => json!({ "phone": number, "action": "SIGN" }),
    };
    if let Some(name) = &contact.display_name {
        input["name"] = json!(name);
    }
    input
}

/// Maps a GraphQL-level error message to the transient/permanent taxonomy.
///
/// GraphQL errors arrive with HTTP 200, so the status code tells us nothing;
/// the message text is all there is.
fn categorize_graphql_error(message: &str) -> RemoteApiError {
    let lower = message.to_lowercase();
    let kind = if lower.contains("internal server error") || lower.contains("try again") {
        RemoteErrorKind::Transient
    } else {
        RemoteErrorKind::Permanent
    };
    RemoteApiError {
        kind,
        status_code: None,
        message: format!("signing service error: {}", message),
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_internal_error_is_transient() {
        let err = categorize_graphql_error("Internal server error");
        assert_eq!(err.kind, RemoteErrorKind::Transient);
    }

    #[test]
    fn graphql_unauthorized_is_permanent() {
        let err = categorize_graphql_error("Unauthorized");
        assert_eq!(err.kind, RemoteErrorKind::Permanent);
        assert!(err.message.contains("Unauthorized"));
    }

    #[test]
    fn signer_input_shapes() {
        let email = signer_input(&SignerContact::email("a@example.com").with_display_name("A"));
        assert_eq!(email["email"], "a@example.com");
        assert_eq!(email["name"], "A");
        assert_eq!(email["action"], "SIGN");

        let phone = signer_input(&SignerContact::phone("+5511988887777"));
        assert_eq!(phone["phone"], "+5511988887777");
        assert!(phone.get("name").is_none());
    }

    #[test]
    fn debug_hides_token() {
        let client = SigningClient::new("https://api.example.com/v2/graphql", "secret").unwrap();
        let debugged = format!("{:?}", client);
        assert!(debugged.contains("api.example.com"));
        assert!(!debugged.contains("secret"));
    }
}
