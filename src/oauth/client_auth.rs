//! Token endpoint client authentication.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::crypto::jwt::{self, BuildOptions};
use crate::crypto::keystore::PrivateKeyEntry;
use crate::db::models::{ClientAttrs, HttpHeader};
use crate::error::{ConsoleError, ConsoleResult};

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 300;

/// Signature algorithms accepted for `private_key_jwt` assertions.
pub const ASSERTION_ALGORITHMS: &[&str] = &[
    "RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384", "EdDSA",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationType {
    ClientSecretBasic,
    ClientSecretPost,
    PrivateKeyJwt,
    None,
}

impl AuthenticationType {
    pub const ALL: [AuthenticationType; 4] = [
        AuthenticationType::ClientSecretBasic,
        AuthenticationType::ClientSecretPost,
        AuthenticationType::PrivateKeyJwt,
        AuthenticationType::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthenticationType::ClientSecretBasic => "client_secret_basic",
            AuthenticationType::ClientSecretPost => "client_secret_post",
            AuthenticationType::PrivateKeyJwt => "private_key_jwt",
            AuthenticationType::None => "none",
        }
    }

    pub fn needs_secret(&self) -> bool {
        matches!(
            self,
            AuthenticationType::ClientSecretBasic | AuthenticationType::ClientSecretPost
        )
    }
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthenticationType {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuthenticationType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ConsoleError::BadRequest(format!("unknown authentication type '{s}'"))
            })
    }
}

/// Credentials added to a token request.
#[derive(Debug, Default)]
pub struct ClientCredentials {
    pub form: Vec<(String, String)>,
    pub headers: Vec<HttpHeader>,
}

/// `client_id:client_secret` form-urlencoded then base64, per RFC 6749 2.3.1.
pub fn basic_authorization(client_id: &str, secret: &str) -> String {
    let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", encode(client_id), encode(secret)))
    )
}

/// RFC 7523 client assertion signed with `key`.
pub fn client_assertion(
    client: &ClientAttrs,
    audience: &str,
    alias: &str,
    key: &PrivateKeyEntry,
) -> ConsoleResult<String> {
    let alg = client.signature_algorithm.as_deref().unwrap_or("RS256");
    let now = Utc::now().timestamp();
    let claims = json!({
        "iss": client.client_id,
        "sub": client.client_id,
        "aud": audience,
        "jti": Uuid::new_v4().to_string(),
        "iat": now,
        "exp": now + ASSERTION_LIFETIME_SECS,
    });
    let mut header = Map::new();
    header.insert("alg".into(), Value::String(alg.to_string()));
    header.insert("typ".into(), Value::String("JWT".into()));
    jwt::sign_jws(
        header,
        &serde_json::to_vec(&claims)?,
        alias,
        key,
        BuildOptions::default(),
    )
}

/// Build the client authentication part of a token request.
///
/// `key` must be the signing key for `private_key_jwt` clients.
pub fn authenticate(
    client: &ClientAttrs,
    token_endpoint: &str,
    key: Option<&PrivateKeyEntry>,
) -> ConsoleResult<ClientCredentials> {
    let auth_type = client.authentication_type.parse::<AuthenticationType>()?;
    let mut creds = ClientCredentials::default();
    let secret = || {
        client
            .client_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ConsoleError::BadRequest(format!(
                    "client '{}' uses {auth_type} but has no client secret",
                    client.client_id
                ))
            })
    };

    match auth_type {
        AuthenticationType::ClientSecretBasic => {
            creds.headers.push(HttpHeader::new(
                "authorization",
                basic_authorization(&client.client_id, secret()?),
            ));
        }
        AuthenticationType::ClientSecretPost => {
            creds
                .form
                .push(("client_id".into(), client.client_id.clone()));
            creds
                .form
                .push(("client_secret".into(), secret()?.to_string()));
        }
        AuthenticationType::PrivateKeyJwt => {
            let alias = client.signing_key_alias.as_deref().ok_or_else(|| {
                ConsoleError::BadRequest(format!(
                    "client '{}' uses private_key_jwt but has no signing key alias",
                    client.client_id
                ))
            })?;
            let key = key.ok_or_else(|| ConsoleError::not_found("Keystore", alias))?;
            let audience = client
                .audience
                .as_deref()
                .filter(|a| !a.is_empty())
                .unwrap_or(token_endpoint);
            creds
                .form
                .push(("client_id".into(), client.client_id.clone()));
            creds
                .form
                .push(("client_assertion_type".into(), CLIENT_ASSERTION_TYPE.into()));
            creds.form.push((
                "client_assertion".into(),
                client_assertion(client, audience, alias, key)?,
            ));
        }
        AuthenticationType::None => {
            creds
                .form
                .push(("client_id".into(), client.client_id.clone()));
        }
    }
    Ok(creds)
}
