#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::{
    path::PathBuf,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;

use oidc_console::config::Config;
use oidc_console::crypto::keystore::KeyStoreType;
use oidc_console::db::Storage;
use oidc_console::router::{ConsoleState, console_router};

pub const ADMIN_KEY: &str = "test-admin-key";

pub const SIGNER_P12: &[u8] = include_bytes!("../fixtures/signer.p12");
pub const EC_SIGNER_P12: &[u8] = include_bytes!("../fixtures/ec-signer.p12");
pub const CLIENT_JKS: &[u8] = include_bytes!("../fixtures/client.jks");
pub const TRUST_JKS: &[u8] = include_bytes!("../fixtures/trust.jks");
pub const TRUST_RENAMED_JKS: &[u8] = include_bytes!("../fixtures/trust-renamed.jks");
pub const TRUST_P12: &[u8] = include_bytes!("../fixtures/trust.p12");
pub const CA_THREE_PEM: &str = include_str!("../fixtures/ca-three.pem");

pub struct TestApp {
    pub router: Router,
    pub storage: Storage,
    pub db_path: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}

pub fn test_config() -> Config {
    Config {
        admin_key: ADMIN_KEY.to_string(),
        keystore_type: KeyStoreType::Pkcs12,
        keystore_password: "app-keystore".to_string(),
        truststore_type: KeyStoreType::Jks,
        truststore_password: "app-truststore".to_string(),
        http_timeout_secs: 5,
        outbound_rate_per_minute: 600,
        history_limit: 3,
        max_body_bytes: 256 * 1024,
        ..Config::default()
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(cfg: Config) -> TestApp {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    let db_path = std::env::temp_dir().join(format!(
        "oidc-console-it-{}-{nanos}.sqlite",
        std::process::id()
    ));
    let storage = Storage::connect(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("failed to open database");
    let state = ConsoleState::spawn(storage.clone(), Arc::new(cfg))
        .await
        .expect("failed to build state");
    TestApp {
        router: console_router(state),
        storage,
        db_path,
    }
}

impl TestApp {
    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.raw_request(method, uri, body, Some(ADMIN_KEY)).await
    }

    pub async fn raw_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        key: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("x-admin-key", key);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/scim+json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("failed to build request"))
            .await
            .expect("request failed");
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    pub async fn create(&self, resource: &str, body: Value) -> Value {
        let (status, value) = self
            .request("POST", &format!("/scim/v2/{resource}"), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "creating {resource}: {value}");
        value
    }

    pub async fn import_signer(&self) {
        let (status, body) = self
            .request(
                "POST",
                "/scim/v2/Keystore",
                Some(json!({
                    "keystoreFile": STANDARD.encode(SIGNER_P12),
                    "password": "changeit"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }
}

pub fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn id_of(resource: &Value) -> String {
    resource["id"].as_str().expect("resource id").to_string()
}
