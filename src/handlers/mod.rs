//! SCIM resource handlers.

pub mod http;
pub mod jwt;
pub mod keystore;
pub mod oauth;
pub mod openid;
pub mod proxy;
pub mod tokens;
pub mod truststore;

use crate::db::ListQuery;
use crate::error::{ConsoleResult, FieldErrors};
use crate::router::ConsoleState;
use crate::scim::filter::AttributeMap;
use crate::scim::{ListParams, ListResponse};

/// Resolve list parameters with the configured page sizes.
fn list_query(
    state: &ConsoleState,
    params: &ListParams,
    attributes: AttributeMap,
) -> ConsoleResult<(ListQuery, i64)> {
    params.to_query(
        attributes,
        state.config.default_page_size,
        state.config.max_page_size,
    )
}

fn list_response<R, T>(
    rows: Vec<R>,
    total: i64,
    start_index: i64,
    to_resource: impl Fn(R) -> T,
) -> ListResponse<T> {
    ListResponse::new(rows.into_iter().map(to_resource).collect(), total, start_index)
}

fn require_text(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "must not be empty");
    }
}

fn check_url(errors: &mut FieldErrors, field: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        if url::Url::parse(value).is_err() {
            errors.add(field, format!("'{value}' is not a valid URL"));
        }
    }
}

async fn check_proxy(
    state: &ConsoleState,
    errors: &mut FieldErrors,
    proxy_id: Option<i64>,
) -> ConsoleResult<()> {
    if let Some(id) = proxy_id {
        if !state.storage.proxy_exists(id).await? {
            errors.add("proxyId", format!("proxy {id} does not exist"));
        }
    }
    Ok(())
}
