use axum::extract::{DefaultBodyLimit, FromRef};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde_json::json;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Storage;
use crate::error::ConsoleResult;
use crate::handlers::{http, jwt, keystore, oauth, openid, proxy, tokens, truststore};
use crate::middleware::auth::{AdminKey, RequireAdminKey};
use crate::service::key_material::{self, KeyMaterialHandle, StoreSettings};
use crate::service::outbound::Outbound;

#[derive(Clone)]
pub struct ConsoleState {
    pub storage: Storage,
    pub key_material: KeyMaterialHandle,
    pub outbound: Outbound,
    pub config: Arc<Config>,
    admin_key: AdminKey,
}

impl ConsoleState {
    pub fn new(
        storage: Storage,
        key_material: KeyMaterialHandle,
        outbound: Outbound,
        config: Arc<Config>,
    ) -> Self {
        let admin_key = AdminKey(Arc::from(config.admin_key.as_str()));
        Self {
            storage,
            key_material,
            outbound,
            config,
            admin_key,
        }
    }

    /// Start the key material actor and outbound client for `storage`.
    pub async fn spawn(storage: Storage, config: Arc<Config>) -> ConsoleResult<Self> {
        let key_material = key_material::spawn(
            storage.clone(),
            StoreSettings {
                keystore_type: config.keystore_type,
                keystore_password: config.keystore_password.clone(),
                truststore_type: config.truststore_type,
                truststore_password: config.truststore_password.clone(),
            },
        )
        .await?;
        let outbound = Outbound::new(
            storage.clone(),
            key_material.clone(),
            config.http_timeout_secs,
            config.outbound_rate_per_minute,
            config.history_limit,
        );
        Ok(Self::new(storage, key_material, outbound, config))
    }
}

impl FromRef<ConsoleState> for AdminKey {
    fn from_ref(state: &ConsoleState) -> Self {
        state.admin_key.clone()
    }
}

fn scim_routes() -> Router<ConsoleState> {
    Router::new()
        .route("/Keystore", get(keystore::list).post(keystore::import))
        .route("/Keystore/.export", post(keystore::export))
        .route("/Keystore/{alias}", get(keystore::get).delete(keystore::delete))
        .route("/Truststore", get(truststore::list).post(truststore::upload))
        .route("/Truststore/.export", post(truststore::export))
        .route(
            "/Truststore/{alias}",
            get(truststore::get).delete(truststore::delete),
        )
        .route("/Proxy", get(proxy::list).post(proxy::create))
        .route(
            "/Proxy/{id}",
            get(proxy::get).put(proxy::update).delete(proxy::delete),
        )
        .route(
            "/OpenIdProvider",
            get(openid::list_providers).post(openid::create_provider),
        )
        .route(
            "/OpenIdProvider/{id}",
            get(openid::get_provider)
                .put(openid::update_provider)
                .delete(openid::delete_provider),
        )
        .route(
            "/OpenIdClient",
            get(openid::list_clients).post(openid::create_client),
        )
        .route(
            "/OpenIdClient/{id}",
            get(openid::get_client)
                .put(openid::update_client)
                .delete(openid::delete_client),
        )
        .route("/JwtBuilder", post(jwt::build))
        .route("/JwtBuilder/.parse", post(jwt::parse))
        .route(
            "/TokenCategory",
            get(tokens::list_categories).post(tokens::create_category),
        )
        .route(
            "/TokenCategory/{id}",
            get(tokens::get_category)
                .put(tokens::update_category)
                .delete(tokens::delete_category),
        )
        .route(
            "/TokenStore",
            get(tokens::list_tokens).post(tokens::create_token),
        )
        .route(
            "/TokenStore/{id}",
            get(tokens::get_token)
                .put(tokens::update_token)
                .delete(tokens::delete_token),
        )
        .route("/AccessTokenRequest", post(oauth::request_token))
        .route(
            "/AuthCodeGrantRequest",
            get(oauth::list_auth_code_grants).post(oauth::create_auth_code_grant),
        )
        .route(
            "/AuthCodeGrantRequest/{id}",
            get(oauth::get_auth_code_grant).delete(oauth::delete_auth_code_grant),
        )
        .route(
            "/HttpRequest",
            get(http::list_requests).post(http::create_request),
        )
        .route(
            "/HttpRequest/{id}",
            get(http::get_request)
                .put(http::update_request)
                .delete(http::delete_request),
        )
        .route("/HttpRequest/{id}/.execute", post(http::execute_request))
        .route("/HttpResponseHistory", get(http::list_history))
        .route(
            "/HttpResponseHistory/{id}",
            get(http::get_history).delete(http::delete_history),
        )
}

pub fn console_router(state: ConsoleState) -> Router {
    let max_body = state.config.max_body_bytes;
    let scim = scim_routes().route_layer(middleware::from_extractor_with_state::<
        RequireAdminKey,
        _,
    >(state.clone()));

    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "UP" })) }))
        .nest(crate::scim::BASE_PATH, scim)
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}
