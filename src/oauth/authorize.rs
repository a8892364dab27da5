//! Authorization code grant: build the authorization URL and remember the
//! state, redirect URI and PKCE verifier until the code comes back.

use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, PkceCodeChallenge, RedirectUrl, Scope};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::db::Storage;
use crate::db::models::{AuthCodeGrantRow, NewAuthCodeGrant};
use crate::error::{ConsoleError, ConsoleResult, FieldErrors};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCodeGrantInput {
    pub open_id_client_id: Option<i64>,
    #[serde(default)]
    pub redirect_uri: String,
    pub scope: Option<String>,
    #[serde(default = "default_true")]
    pub use_pkce: bool,
    #[serde(default)]
    pub extra_parameters: BTreeMap<String, String>,
}

/// Result of building an authorization URL.
#[derive(Debug, Clone)]
pub struct AuthorizationUrl {
    pub url: String,
    pub state: String,
    pub code_verifier: Option<String>,
}

pub fn authorization_url(
    authorization_endpoint: &str,
    client_id: &str,
    input: &AuthCodeGrantInput,
) -> ConsoleResult<AuthorizationUrl> {
    let client = BasicClient::new(ClientId::new(client_id.to_string()))
        .set_auth_uri(AuthUrl::new(authorization_endpoint.to_string())?)
        .set_redirect_uri(RedirectUrl::new(input.redirect_uri.clone())?);

    let mut request = client.authorize_url(CsrfToken::new_random);
    for scope in input.scope.as_deref().unwrap_or_default().split_whitespace() {
        request = request.add_scope(Scope::new(scope.to_string()));
    }
    let code_verifier = if input.use_pkce {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        request = request.set_pkce_challenge(challenge);
        Some(verifier.secret().clone())
    } else {
        None
    };
    for (name, value) in &input.extra_parameters {
        request = request.add_extra_param(name.as_str(), value.as_str());
    }

    let (url, state) = request.url();
    Ok(AuthorizationUrl {
        url: url.to_string(),
        state: state.secret().clone(),
        code_verifier,
    })
}

/// Validate, build and persist a new authorization request.
pub async fn create(storage: &Storage, input: AuthCodeGrantInput) -> ConsoleResult<AuthCodeGrantRow> {
    let mut errors = FieldErrors::new();
    if input.redirect_uri.trim().is_empty() {
        errors.add("redirectUri", "must not be empty");
    } else if url::Url::parse(&input.redirect_uri).is_err() {
        errors.add("redirectUri", "is not a valid URL");
    }
    let client = match input.open_id_client_id {
        None => {
            errors.add("openIdClientId", "is required");
            None
        }
        Some(id) => {
            let client = storage.get_client(id).await?;
            if client.is_none() {
                errors.add("openIdClientId", format!("client {id} does not exist"));
            }
            client
        }
    };
    errors.into_result()?;
    let client = client.ok_or_else(|| ConsoleError::BadRequest("openIdClientId is required".into()))?;

    let provider = storage
        .get_provider(client.attrs.provider_id)
        .await?
        .ok_or_else(|| ConsoleError::not_found("OpenIdProvider", client.attrs.provider_id))?;
    let endpoint = provider
        .attrs
        .authorization_endpoint
        .clone()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            ConsoleError::BadRequest(format!(
                "provider '{}' has no authorization endpoint",
                provider.attrs.name
            ))
        })?;

    let built = authorization_url(&endpoint, &client.attrs.client_id, &input)?;
    let id = storage
        .insert_auth_code_grant(&NewAuthCodeGrant {
            client_id: client.id,
            state: built.state,
            redirect_uri: input.redirect_uri.clone(),
            scope: input.scope.clone(),
            code_verifier: built.code_verifier,
            authorization_url: built.url,
        })
        .await?;
    info!(id, client = %client.attrs.client_id, "authorization request created");

    storage
        .get_auth_code_grant(id)
        .await?
        .ok_or_else(|| ConsoleError::not_found("AuthCodeGrantRequest", id))
}
