use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::crypto::jwt::{self, BuildOptions, CompactToken};
use crate::error::{ConsoleError, ConsoleResult, FieldErrors};
use crate::router::ConsoleState;
use crate::scim::{Scim, ScimBody, schema_urn};

const RESOURCE: &str = "JwtBuilder";

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    #[serde(default)]
    pub header: Map<String, Value>,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub key_alias: String,
    #[serde(default, rename = "addX5tS256")]
    pub add_x5t_s256: bool,
    #[serde(default = "default_true")]
    pub add_kid: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    #[serde(default)]
    pub token: String,
    pub key_alias: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenKind {
    Jws,
    Jwe,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtResponse {
    pub schemas: Vec<String>,
    pub kind: TokenKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub header: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_valid: Option<bool>,
}

/// POST /JwtBuilder: sign or encrypt `body` with the key under `keyAlias`.
pub async fn build(
    State(state): State<ConsoleState>,
    ScimBody(request): ScimBody<BuildRequest>,
) -> ConsoleResult<Scim<JwtResponse>> {
    let mut errors = FieldErrors::new();
    if !request.header.contains_key("alg") {
        errors.add("header", "must contain 'alg'");
    }
    if request.key_alias.trim().is_empty() {
        errors.add("keyAlias", "must not be empty");
    }
    errors.into_result()?;

    let alias = request.key_alias.trim();
    let options = BuildOptions {
        add_kid: request.add_kid,
        add_x5t_s256: request.add_x5t_s256,
    };
    let payload = jwt::payload_bytes(&request.body)?;

    let (kind, token) = if jwt::is_jwe_header(&request.header) {
        let recipient = state
            .key_material
            .public_key(alias)
            .await?
            .ok_or_else(|| ConsoleError::not_found("Keystore", alias))?;
        let token = jwt::encrypt_jwe(request.header, &payload, alias, &recipient, options)?;
        (TokenKind::Jwe, token)
    } else {
        let key = state
            .key_material
            .signing_key(alias)
            .await?
            .ok_or_else(|| ConsoleError::not_found("Keystore", alias))?;
        let token = jwt::sign_jws(request.header, &payload, alias, &key, options)?;
        (TokenKind::Jws, token)
    };
    info!(alias, kind = ?kind, "JWT built");

    let header = jwt::split(&token)?.header().clone();
    Ok(Scim::ok(JwtResponse {
        schemas: vec![schema_urn(RESOURCE)],
        kind,
        token: Some(token),
        header,
        body: Some(request.body),
        key_alias: Some(alias.to_string()),
        signature_valid: None,
    }))
}

/// POST /JwtBuilder/.parse: decode a compact token, verifying or
/// decrypting it when a key is available.
pub async fn parse(
    State(state): State<ConsoleState>,
    ScimBody(request): ScimBody<ParseRequest>,
) -> ConsoleResult<Scim<JwtResponse>> {
    if request.token.trim().is_empty() {
        let mut errors = FieldErrors::new();
        errors.add("token", "must not be empty");
        return Err(ConsoleError::Validation(errors));
    }

    let token = jwt::split(&request.token)?;
    let alias = request
        .key_alias
        .clone()
        .filter(|a| !a.trim().is_empty())
        .or_else(|| token.kid().map(str::to_string));

    let response = match token {
        CompactToken::Jws {
            header,
            payload,
            signing_input,
            signature,
        } => {
            let public = match alias.as_deref() {
                Some(alias) => state.key_material.public_key(alias).await?,
                None => None,
            };
            let signature_valid = match &public {
                Some(public) => Some(jwt::verify_jws(&header, &signing_input, &signature, public)?),
                None => None,
            };
            JwtResponse {
                schemas: vec![schema_urn(RESOURCE)],
                kind: TokenKind::Jws,
                token: None,
                header,
                body: Some(jwt::payload_value(&payload)),
                key_alias: public.and(alias),
                signature_valid,
            }
        }
        CompactToken::Jwe { header, token } => {
            let alias = alias.ok_or_else(|| {
                ConsoleError::BadRequest(
                    "a JWE can only be read with a key alias or a 'kid' header".into(),
                )
            })?;
            let key = state
                .key_material
                .signing_key(&alias)
                .await?
                .ok_or_else(|| ConsoleError::not_found("Keystore", &alias))?;
            let plaintext = jwt::decrypt_jwe(&header, &token, &key)?;
            JwtResponse {
                schemas: vec![schema_urn(RESOURCE)],
                kind: TokenKind::Jwe,
                token: None,
                header,
                body: Some(jwt::payload_value(&plaintext)),
                key_alias: Some(alias),
                signature_valid: None,
            }
        }
    };
    Ok(Scim::ok(response))
}
