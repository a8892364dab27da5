//! Outbound HTTP: client construction, rate limiting, retries and the
//! exchange history.

use crate::crypto::keystore::to_pem;
use crate::db::Storage;
use crate::db::models::{HttpHeader, NewHistory, ProxyAttrs};
use crate::error::{ConsoleError, ConsoleResult, IsRetryable};
use crate::service::key_material::KeyMaterialHandle;

use backon::{ExponentialBuilder, Retryable};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Method;
use sqlx::types::Json;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

const MASK: &str = "****";

/// Form fields that never reach the history table in clear text.
const SECRET_FIELDS: &[&str] = &[
    "client_secret",
    "client_assertion",
    "password",
    "refresh_token",
    "code",
    "code_verifier",
];

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// A request about to be sent.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<HttpHeader>,
    pub body: Option<String>,
    /// Recorded against this OpenID client (and trimmed with its history).
    pub client_id: Option<i64>,
    /// Recorded against this stored HTTP request.
    pub request_id: Option<i64>,
}

/// What came back, plus the id of the history row.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub status: u16,
    pub headers: Vec<HttpHeader>,
    pub body: String,
    pub duration_ms: i64,
    pub history_id: i64,
}

#[derive(Clone)]
pub struct Outbound {
    storage: Storage,
    key_material: KeyMaterialHandle,
    limiter: Arc<DefaultDirectRateLimiter>,
    timeout: Duration,
    history_limit: i64,
}

impl Outbound {
    pub fn new(
        storage: Storage,
        key_material: KeyMaterialHandle,
        timeout_secs: u64,
        rate_per_minute: u32,
        history_limit: i64,
    ) -> Self {
        let rate = NonZeroU32::new(rate_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            storage,
            key_material,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(rate))),
            timeout: Duration::from_secs(timeout_secs.max(1)),
            history_limit,
        }
    }

    /// HTTP client honouring an optional proxy, the truststore and an
    /// optional TLS client key.
    pub async fn client_for(
        &self,
        proxy_id: Option<i64>,
        tls_key_alias: Option<&str>,
    ) -> ConsoleResult<reqwest::Client> {
        let proxy = match proxy_id {
            Some(id) => Some(
                self.storage
                    .get_proxy(id)
                    .await?
                    .ok_or_else(|| ConsoleError::not_found("Proxy", id))?
                    .attrs,
            ),
            None => None,
        };

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("oidc-console/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(self.timeout);

        // Only configured proxies apply, never the environment's.
        builder = match proxy.as_ref() {
            Some(proxy) => builder.proxy(proxy_setting(proxy)?),
            None => builder.no_proxy(),
        };

        for der in self.key_material.trusted_certificates().await? {
            builder = builder.add_root_certificate(reqwest::Certificate::from_der(&der)?);
        }

        if let Some(alias) = tls_key_alias {
            let key = self
                .key_material
                .signing_key(alias)
                .await?
                .ok_or_else(|| ConsoleError::not_found("Keystore", alias))?;
            let mut pem = to_pem("PRIVATE KEY", &key.key);
            for cert in &key.chain {
                pem.push_str(&to_pem("CERTIFICATE", cert));
            }
            builder = builder.identity(reqwest::Identity::from_pem(pem.as_bytes())?);
        }

        Ok(builder.build()?)
    }

    /// Send `request` and record the exchange. Non-2xx answers are returned,
    /// only transport failures become errors.
    pub async fn send(
        &self,
        client: &reqwest::Client,
        request: OutboundRequest,
    ) -> ConsoleResult<Exchange> {
        self.limiter.until_ready().await;

        let started = Instant::now();
        let response = (|| async {
            let mut builder = client.request(request.method.clone(), request.url.clone());
            for header in &request.headers {
                builder = builder.header(header.name.as_str(), header.value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }
            Ok::<_, ConsoleError>(builder.send().await?)
        })
        .retry(default_retry_policy())
        .when(|e: &ConsoleError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(
                url = %request.url,
                "outbound request retrying after error {}, sleeping {:?}",
                err, dur
            );
        })
        .await?;

        let status = response.status().as_u16();
        let headers: Vec<HttpHeader> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                HttpHeader::new(name.as_str(), String::from_utf8_lossy(value.as_bytes()))
            })
            .collect();
        let body = response.text().await?;
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        let history_id = self
            .storage
            .insert_history(&NewHistory {
                client_id: request.client_id,
                request_id: request.request_id,
                request_method: request.method.to_string(),
                request_url: request.url.to_string(),
                request_headers: Json(mask_headers(&request.headers)),
                request_body: request.body.as_deref().map(mask_body),
                status: i64::from(status),
                response_headers: Json(headers.clone()),
                response_body: Some(body.clone()),
                duration_ms,
            })
            .await?;

        if let Some(client_id) = request.client_id {
            let removed = self
                .storage
                .trim_history(client_id, self.history_limit)
                .await?;
            if removed > 0 {
                debug!(client_id, removed, "history trimmed");
            }
        }

        info!(
            method = %request.method,
            url = %request.url,
            status,
            duration_ms,
            "outbound exchange recorded"
        );

        Ok(Exchange {
            status,
            headers,
            body,
            duration_ms,
            history_id,
        })
    }
}

fn proxy_setting(proxy: &ProxyAttrs) -> ConsoleResult<reqwest::Proxy> {
    let mut setting = reqwest::Proxy::all(format!("http://{}:{}", proxy.hostname, proxy.port))?;
    if let Some(username) = proxy.username.as_deref().filter(|u| !u.is_empty()) {
        setting = setting.basic_auth(username, proxy.password.as_deref().unwrap_or(""));
    }
    Ok(setting)
}

fn mask_headers(headers: &[HttpHeader]) -> Vec<HttpHeader> {
    headers
        .iter()
        .map(|h| {
            if h.name.eq_ignore_ascii_case("authorization") {
                let scheme = h.value.split_whitespace().next().unwrap_or_default();
                HttpHeader::new(h.name.clone(), format!("{scheme} {MASK}").trim().to_string())
            } else {
                h.clone()
            }
        })
        .collect()
}

/// Mask secret fields of a form body; other bodies are kept as they are.
pub fn mask_body(body: &str) -> String {
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.iter().any(|(k, _)| SECRET_FIELDS.contains(&k.as_str())) {
        return body.to_string();
    }
    let mut out = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in &pairs {
        if SECRET_FIELDS.contains(&k.as_str()) {
            out.append_pair(k, MASK);
        } else {
            out.append_pair(k, v);
        }
    }
    out.finish()
}
