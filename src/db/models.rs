//! Row types.
//!
//! Each table has an attribute struct (what a client sends and what gets
//! written) and a row struct that adds the generated id and timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StoreRow {
    pub id: i64,
    pub store_type: String,
    pub password: String,
    pub bytes: Vec<u8>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyAttrs {
    pub hostname: String,
    pub port: i64,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ProxyRow {
    pub id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attrs: ProxyAttrs,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderAttrs {
    pub name: String,
    pub discovery_endpoint: Option<String>,
    pub issuer: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
    pub signature_verification_key_alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ProviderRow {
    pub id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attrs: ProviderAttrs,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientAttrs {
    #[serde(rename = "openIdProviderId")]
    pub provider_id: i64,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub authentication_type: String,
    pub signing_key_alias: Option<String>,
    pub signature_algorithm: Option<String>,
    pub audience: Option<String>,
    pub decryption_key_alias: Option<String>,
    pub tls_client_auth_key_alias: Option<String>,
    pub proxy_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ClientRow {
    pub id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attrs: ClientAttrs,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryAttrs {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct CategoryRow {
    pub id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attrs: CategoryAttrs,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenAttrs {
    pub category_id: i64,
    pub name: Option<String>,
    pub token: String,
    pub token_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct TokenRow {
    pub id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attrs: TokenAttrs,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuthCodeGrantRow {
    pub id: i64,
    #[serde(rename = "openIdClientId")]
    pub client_id: i64,
    pub state: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    #[serde(skip_serializing)]
    pub code_verifier: Option<String>,
    pub authorization_url: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuthCodeGrant {
    pub client_id: i64,
    pub state: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub code_verifier: Option<String>,
    pub authorization_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

impl HttpHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpRequestAttrs {
    pub name: String,
    pub method: String,
    pub url: String,
    pub headers: Json<Vec<HttpHeader>>,
    pub body: Option<String>,
    pub proxy_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct HttpRequestRow {
    pub id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attrs: HttpRequestAttrs,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// One recorded outbound exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NewHistory {
    #[serde(rename = "openIdClientId")]
    pub client_id: Option<i64>,
    #[serde(rename = "httpRequestId")]
    pub request_id: Option<i64>,
    pub request_method: String,
    pub request_url: String,
    pub request_headers: Json<Vec<HttpHeader>>,
    pub request_body: Option<String>,
    pub status: i64,
    pub response_headers: Json<Vec<HttpHeader>>,
    pub response_body: Option<String>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct HistoryRow {
    pub id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub exchange: NewHistory,
    pub created: DateTime<Utc>,
}
