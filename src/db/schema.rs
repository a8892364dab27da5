//! SQL DDL for the console database.
//! Executed statement by statement at startup; every statement is idempotent.

/// Tables:
/// - `keystore` / `truststore`: a single row holding the encoded store
/// - `openid_client`, `token_store`, `http_response_history`: child rows
///   removed together with their parent
/// - timestamps are RFC3339 text, JSON columns are text
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS keystore (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keystore_type TEXT NOT NULL,
    password TEXT NOT NULL,
    bytes BLOB NOT NULL,
    created TEXT NOT NULL,
    modified TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS truststore (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    truststore_type TEXT NOT NULL,
    password TEXT NOT NULL,
    bytes BLOB NOT NULL,
    created TEXT NOT NULL,
    modified TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS proxy (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hostname TEXT NOT NULL,
    port INTEGER NOT NULL,
    username TEXT NULL,
    password TEXT NULL,
    created TEXT NOT NULL,
    modified TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS openid_provider (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    discovery_endpoint TEXT NULL,
    issuer TEXT NULL,
    authorization_endpoint TEXT NULL,
    token_endpoint TEXT NULL,
    userinfo_endpoint TEXT NULL,
    jwks_uri TEXT NULL,
    signature_verification_key_alias TEXT NULL,
    created TEXT NOT NULL,
    modified TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS openid_client (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider_id INTEGER NOT NULL REFERENCES openid_provider(id) ON DELETE CASCADE,
    client_id TEXT NOT NULL,
    client_secret TEXT NULL,
    authentication_type TEXT NOT NULL,
    signing_key_alias TEXT NULL,
    signature_algorithm TEXT NULL,
    audience TEXT NULL,
    decryption_key_alias TEXT NULL,
    tls_client_auth_key_alias TEXT NULL,
    proxy_id INTEGER NULL REFERENCES proxy(id),
    created TEXT NOT NULL,
    modified TEXT NOT NULL,
    UNIQUE (provider_id, client_id)
);

CREATE TABLE IF NOT EXISTS token_category (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NULL,
    created TEXT NOT NULL,
    modified TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS token_store (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category_id INTEGER NOT NULL REFERENCES token_category(id) ON DELETE CASCADE,
    name TEXT NULL,
    token TEXT NOT NULL,
    token_type TEXT NULL,
    expires_at TEXT NULL,
    created TEXT NOT NULL,
    modified TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_token_store_category ON token_store(category_id);

CREATE TABLE IF NOT EXISTS auth_code_grant_request (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id INTEGER NOT NULL REFERENCES openid_client(id) ON DELETE CASCADE,
    state TEXT NOT NULL UNIQUE,
    redirect_uri TEXT NOT NULL,
    scope TEXT NULL,
    code_verifier TEXT NULL,
    authorization_url TEXT NOT NULL,
    created TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS http_request (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    headers TEXT NOT NULL DEFAULT '[]',
    body TEXT NULL,
    proxy_id INTEGER NULL REFERENCES proxy(id),
    created TEXT NOT NULL,
    modified TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS http_response_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id INTEGER NULL REFERENCES openid_client(id) ON DELETE CASCADE,
    request_id INTEGER NULL REFERENCES http_request(id) ON DELETE SET NULL,
    request_method TEXT NOT NULL,
    request_url TEXT NOT NULL,
    request_headers TEXT NOT NULL DEFAULT '[]',
    request_body TEXT NULL,
    status INTEGER NOT NULL,
    response_headers TEXT NOT NULL DEFAULT '[]',
    response_body TEXT NULL,
    duration_ms INTEGER NOT NULL,
    created TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_client ON http_response_history(client_id);
"#;
