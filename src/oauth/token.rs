//! Access token requests against a provider's token endpoint.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::info;
use url::Url;

use crate::crypto::jwt::payload_value;
use crate::db::Storage;
use crate::db::models::{AuthCodeGrantRow, HttpHeader};
use crate::error::{ConsoleError, ConsoleResult, FieldErrors};
use crate::oauth::client_auth::{self, AuthenticationType};
use crate::service::key_material::KeyMaterialHandle;
use crate::service::outbound::{Outbound, OutboundRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    ClientCredentials,
    Password,
    RefreshToken,
    AuthorizationCode,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::ClientCredentials => "client_credentials",
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
            GrantType::AuthorizationCode => "authorization_code",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "password" => Ok(GrantType::Password),
            "refresh_token" => Ok(GrantType::RefreshToken),
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            other => Err(ConsoleError::BadRequest(format!(
                "unsupported grant type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessTokenRequest {
    pub open_id_client_id: Option<i64>,
    pub grant_type: String,
    pub scope: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    /// Take redirect URI and PKCE verifier from this stored authorization request.
    pub auth_code_grant_request_id: Option<i64>,
    /// Alternative to `auth_code_grant_request_id`: match by `state`.
    pub state: Option<String>,
    pub extra_parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub status: u16,
    pub success: bool,
    pub body: Value,
    pub http_response_history_id: i64,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Field level checks that need no database access.
pub fn validate(request: &AccessTokenRequest) -> ConsoleResult<GrantType> {
    let mut errors = FieldErrors::new();
    if request.open_id_client_id.is_none() {
        errors.add("openIdClientId", "is required");
    }
    let grant = match request.grant_type.parse::<GrantType>() {
        Ok(grant) => Some(grant),
        Err(e) => {
            errors.add("grantType", e.to_string());
            None
        }
    };
    match grant {
        Some(GrantType::Password) => {
            if !present(&request.username) {
                errors.add("username", "is required for the password grant");
            }
            if !present(&request.password) {
                errors.add("password", "is required for the password grant");
            }
        }
        Some(GrantType::RefreshToken) => {
            if !present(&request.refresh_token) {
                errors.add("refreshToken", "is required for the refresh_token grant");
            }
        }
        Some(GrantType::AuthorizationCode) => {
            if !present(&request.code) {
                errors.add("code", "is required for the authorization_code grant");
            }
            let stored = request.auth_code_grant_request_id.is_some() || present(&request.state);
            if !stored && !present(&request.redirect_uri) {
                errors.add(
                    "redirectUri",
                    "is required unless a stored authorization request is referenced",
                );
            }
        }
        Some(GrantType::ClientCredentials) | None => {}
    }
    errors.into_result()?;
    grant.ok_or_else(|| ConsoleError::BadRequest("grantType is invalid".into()))
}

async fn stored_grant(
    storage: &Storage,
    request: &AccessTokenRequest,
    client_id: i64,
) -> ConsoleResult<Option<AuthCodeGrantRow>> {
    let grant = match (request.auth_code_grant_request_id, request.state.as_deref()) {
        (Some(id), _) => Some(
            storage
                .get_auth_code_grant(id)
                .await?
                .ok_or_else(|| ConsoleError::not_found("AuthCodeGrantRequest", id))?,
        ),
        (None, Some(state)) if !state.is_empty() => Some(
            storage
                .find_auth_code_grant_by_state(state)
                .await?
                .ok_or_else(|| ConsoleError::not_found("AuthCodeGrantRequest", state))?,
        ),
        _ => None,
    };
    if let Some(grant) = &grant {
        if grant.client_id != client_id {
            return Err(ConsoleError::BadRequest(format!(
                "authorization request {} belongs to another client",
                grant.id
            )));
        }
    }
    Ok(grant)
}

/// Assemble the form for `grant`; secrets stay in memory only.
fn grant_form(
    grant: GrantType,
    request: &AccessTokenRequest,
    stored: Option<&AuthCodeGrantRow>,
) -> Vec<(String, String)> {
    let mut form = vec![("grant_type".to_string(), grant.as_str().to_string())];
    let mut push = |name: &str, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            form.push((name.to_string(), value.to_string()));
        }
    };
    match grant {
        GrantType::ClientCredentials => {}
        GrantType::Password => {
            push("username", request.username.as_deref());
            push("password", request.password.as_deref());
        }
        GrantType::RefreshToken => push("refresh_token", request.refresh_token.as_deref()),
        GrantType::AuthorizationCode => {
            push("code", request.code.as_deref());
            push(
                "redirect_uri",
                request
                    .redirect_uri
                    .as_deref()
                    .or(stored.map(|g| g.redirect_uri.as_str())),
            );
            push(
                "code_verifier",
                request
                    .code_verifier
                    .as_deref()
                    .or(stored.and_then(|g| g.code_verifier.as_deref())),
            );
        }
    }
    let scope = request
        .scope
        .as_deref()
        .or(stored.and_then(|g| g.scope.as_deref()));
    push("scope", scope);
    for (name, value) in &request.extra_parameters {
        push(name, Some(value));
    }
    form
}

/// Run the token request and record it. Error answers from the token
/// endpoint are returned, not raised.
pub async fn execute(
    storage: &Storage,
    key_material: &KeyMaterialHandle,
    outbound: &Outbound,
    request: AccessTokenRequest,
) -> ConsoleResult<AccessTokenResponse> {
    let grant = validate(&request)?;
    let client_row_id = request.open_id_client_id.unwrap_or_default();

    let client = storage.get_client(client_row_id).await?.ok_or_else(|| {
        let mut errors = FieldErrors::new();
        errors.add("openIdClientId", format!("client {client_row_id} does not exist"));
        ConsoleError::Validation(errors)
    })?;
    let provider = storage
        .get_provider(client.attrs.provider_id)
        .await?
        .ok_or_else(|| ConsoleError::not_found("OpenIdProvider", client.attrs.provider_id))?;
    let token_endpoint = provider
        .attrs
        .token_endpoint
        .clone()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            ConsoleError::BadRequest(format!(
                "provider '{}' has no token endpoint",
                provider.attrs.name
            ))
        })?;
    let url = Url::parse(&token_endpoint)?;

    let stored = match grant {
        GrantType::AuthorizationCode => stored_grant(storage, &request, client.id).await?,
        _ => None,
    };

    let auth_type = client
        .attrs
        .authentication_type
        .parse::<AuthenticationType>()?;
    let signing_key = match (auth_type, client.attrs.signing_key_alias.as_deref()) {
        (AuthenticationType::PrivateKeyJwt, Some(alias)) => key_material.signing_key(alias).await?,
        _ => None,
    };
    let creds = client_auth::authenticate(&client.attrs, &token_endpoint, signing_key.as_ref())?;

    let mut form = creds.form;
    form.extend(grant_form(grant, &request, stored.as_ref()));
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form.iter())
        .finish();

    let mut headers = vec![
        HttpHeader::new("content-type", "application/x-www-form-urlencoded"),
        HttpHeader::new("accept", "application/json"),
    ];
    headers.extend(creds.headers);

    let http = outbound
        .client_for(
            client.attrs.proxy_id,
            client.attrs.tls_client_auth_key_alias.as_deref(),
        )
        .await?;
    let exchange = outbound
        .send(
            &http,
            OutboundRequest {
                method: Method::POST,
                url,
                headers,
                body: Some(body),
                client_id: Some(client.id),
                request_id: None,
            },
        )
        .await?;

    info!(
        client = %client.attrs.client_id,
        grant = %grant,
        status = exchange.status,
        "token request finished"
    );

    Ok(AccessTokenResponse {
        status: exchange.status,
        success: (200..300).contains(&exchange.status),
        body: payload_value(exchange.body.as_bytes()),
        http_response_history_id: exchange.history_id,
    })
}
