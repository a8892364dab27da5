//! Replay of stored HTTP request templates.

use reqwest::Method;
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::db::Storage;
use crate::db::models::HttpHeader;
use crate::error::{ConsoleError, ConsoleResult};
use crate::service::outbound::{Outbound, OutboundRequest};

pub const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

pub fn parse_method(method: &str) -> ConsoleResult<Method> {
    let upper = method.trim().to_ascii_uppercase();
    if !METHODS.contains(&upper.as_str()) {
        return Err(ConsoleError::BadRequest(format!(
            "unsupported HTTP method '{method}'"
        )));
    }
    Method::from_bytes(upper.as_bytes())
        .map_err(|_| ConsoleError::BadRequest(format!("unsupported HTTP method '{method}'")))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResult {
    pub status: u16,
    pub headers: Vec<HttpHeader>,
    pub body: String,
    pub duration_ms: i64,
    pub http_response_history_id: i64,
}

pub async fn execute(storage: &Storage, outbound: &Outbound, id: i64) -> ConsoleResult<ReplayResult> {
    let stored = storage
        .get_http_request(id)
        .await?
        .ok_or_else(|| ConsoleError::not_found("HttpRequest", id))?;
    let method = parse_method(&stored.attrs.method)?;
    let url = Url::parse(&stored.attrs.url)?;

    let http = outbound.client_for(stored.attrs.proxy_id, None).await?;
    let exchange = outbound
        .send(
            &http,
            OutboundRequest {
                method,
                url,
                headers: stored.attrs.headers.0.clone(),
                body: stored.attrs.body.clone().filter(|b| !b.is_empty()),
                client_id: None,
                request_id: Some(stored.id),
            },
        )
        .await?;
    info!(id, name = %stored.attrs.name, status = exchange.status, "stored request replayed");

    Ok(ReplayResult {
        status: exchange.status,
        headers: exchange.headers,
        body: exchange.body,
        duration_ms: exchange.duration_ms,
        http_response_history_id: exchange.history_id,
    })
}
