use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use tracing::info;

use super::{check_proxy, list_query, list_response, require_text};
use crate::db::models::{HistoryRow, HttpRequestAttrs, HttpRequestRow, NewHistory};
use crate::error::{ConsoleError, ConsoleResult, FieldErrors};
use crate::router::ConsoleState;
use crate::scim::filter::AttributeMap;
use crate::scim::{ListParams, ListResponse, Scim, ScimBody, ScimResource, parse_id};
use crate::service::replay::{self, ReplayResult};

const REQUEST: &str = "HttpRequest";
const HISTORY: &str = "HttpResponseHistory";

const REQUEST_ATTRIBUTES: AttributeMap = &[
    ("name", "name"),
    ("method", "method"),
    ("url", "url"),
    ("proxyId", "proxy_id"),
    ("created", "created"),
    ("meta.created", "created"),
    ("meta.lastModified", "modified"),
];

const HISTORY_ATTRIBUTES: AttributeMap = &[
    ("openIdClientId", "client_id"),
    ("httpRequestId", "request_id"),
    ("requestMethod", "request_method"),
    ("requestUrl", "request_url"),
    ("status", "status"),
    ("created", "created"),
    ("meta.created", "created"),
];

fn request_resource(row: HttpRequestRow) -> ScimResource<HttpRequestAttrs> {
    ScimResource::new(REQUEST, row.id, row.attrs, row.created, row.modified)
}

fn history_resource(row: HistoryRow) -> ScimResource<NewHistory> {
    ScimResource::new(HISTORY, row.id, row.exchange, row.created, row.created)
}

async fn validate_request(
    state: &ConsoleState,
    id: Option<i64>,
    request: &HttpRequestAttrs,
) -> ConsoleResult<()> {
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "name", &request.name);
    if let Err(e) = replay::parse_method(&request.method) {
        errors.add("method", e.to_string());
    }
    if url::Url::parse(&request.url).is_err() {
        errors.add("url", format!("'{}' is not a valid URL", request.url));
    }
    for header in request.headers.iter() {
        if axum::http::HeaderName::from_bytes(header.name.as_bytes()).is_err() {
            errors.add("headers", format!("'{}' is not a valid header name", header.name));
        }
    }
    check_proxy(state, &mut errors, request.proxy_id).await?;
    errors.into_result()?;

    match state.storage.find_http_request_by_name(&request.name).await? {
        Some(existing) if Some(existing) != id => Err(ConsoleError::Conflict(format!(
            "an HTTP request named '{}' already exists",
            request.name
        ))),
        _ => Ok(()),
    }
}

async fn load_request(state: &ConsoleState, id: i64) -> ConsoleResult<HttpRequestRow> {
    state
        .storage
        .get_http_request(id)
        .await?
        .ok_or_else(|| ConsoleError::not_found(REQUEST, id))
}

/// Method names are stored upper case.
fn normalize(mut request: HttpRequestAttrs) -> HttpRequestAttrs {
    request.method = request.method.trim().to_ascii_uppercase();
    request
}

pub async fn create_request(
    State(state): State<ConsoleState>,
    ScimBody(request): ScimBody<HttpRequestAttrs>,
) -> ConsoleResult<Scim<ScimResource<HttpRequestAttrs>>> {
    let request = normalize(request);
    validate_request(&state, None, &request).await?;
    let id = state.storage.insert_http_request(&request).await?;
    info!(id, name = %request.name, "HTTP request stored");
    Ok(Scim::created(request_resource(load_request(&state, id).await?)))
}

pub async fn get_request(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<Scim<ScimResource<HttpRequestAttrs>>> {
    let id = parse_id(REQUEST, &id)?;
    Ok(Scim::ok(request_resource(load_request(&state, id).await?)))
}

pub async fn list_requests(
    State(state): State<ConsoleState>,
    Query(params): Query<ListParams>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<HttpRequestAttrs>>>> {
    let (query, start) = list_query(&state, &params, REQUEST_ATTRIBUTES)?;
    let (rows, total) = state.storage.list_http_requests(&query).await?;
    Ok(Scim::ok(list_response(rows, total, start, request_resource)))
}

pub async fn update_request(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
    ScimBody(request): ScimBody<HttpRequestAttrs>,
) -> ConsoleResult<Scim<ScimResource<HttpRequestAttrs>>> {
    let id = parse_id(REQUEST, &id)?;
    load_request(&state, id).await?;
    let request = normalize(request);
    validate_request(&state, Some(id), &request).await?;
    state.storage.update_http_request(id, &request).await?;
    info!(id, "HTTP request updated");
    Ok(Scim::ok(request_resource(load_request(&state, id).await?)))
}

pub async fn delete_request(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<StatusCode> {
    let id = parse_id(REQUEST, &id)?;
    if !state.storage.delete_http_request(id).await? {
        return Err(ConsoleError::not_found(REQUEST, id));
    }
    info!(id, "HTTP request deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn execute_request(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<Scim<ReplayResult>> {
    let id = parse_id(REQUEST, &id)?;
    let result = replay::execute(&state.storage, &state.outbound, id).await?;
    Ok(Scim::ok(result))
}

pub async fn get_history(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<Scim<ScimResource<NewHistory>>> {
    let id = parse_id(HISTORY, &id)?;
    let row = state
        .storage
        .get_history(id)
        .await?
        .ok_or_else(|| ConsoleError::not_found(HISTORY, id))?;
    Ok(Scim::ok(history_resource(row)))
}

pub async fn list_history(
    State(state): State<ConsoleState>,
    Query(params): Query<ListParams>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<NewHistory>>>> {
    let (query, start) = list_query(&state, &params, HISTORY_ATTRIBUTES)?;
    let (rows, total) = state.storage.list_history(&query).await?;
    Ok(Scim::ok(list_response(rows, total, start, history_resource)))
}

pub async fn delete_history(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<StatusCode> {
    let id = parse_id(HISTORY, &id)?;
    if !state.storage.delete_history(id).await? {
        return Err(ConsoleError::not_found(HISTORY, id));
    }
    info!(id, "history entry deleted");
    Ok(StatusCode::NO_CONTENT)
}
