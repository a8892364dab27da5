use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use tracing::info;

use super::{list_query, list_response, require_text};
use crate::db::models::{ProxyAttrs, ProxyRow};
use crate::error::{ConsoleError, ConsoleResult, FieldErrors};
use crate::router::ConsoleState;
use crate::scim::filter::AttributeMap;
use crate::scim::{ListParams, ListResponse, Scim, ScimBody, ScimResource, parse_id};

const RESOURCE: &str = "Proxy";

const ATTRIBUTES: AttributeMap = &[
    ("hostname", "hostname"),
    ("port", "port"),
    ("username", "username"),
    ("created", "created"),
    ("meta.created", "created"),
    ("meta.lastModified", "modified"),
];

fn resource(row: ProxyRow) -> ScimResource<ProxyAttrs> {
    ScimResource::new(RESOURCE, row.id, row.attrs, row.created, row.modified)
}

pub fn validate(proxy: &ProxyAttrs) -> ConsoleResult<()> {
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "hostname", &proxy.hostname);
    if !(1..=65535).contains(&proxy.port) {
        errors.add("port", "must be between 1 and 65535");
    }
    errors.into_result()
}

async fn load(state: &ConsoleState, id: i64) -> ConsoleResult<ProxyRow> {
    state
        .storage
        .get_proxy(id)
        .await?
        .ok_or_else(|| ConsoleError::not_found(RESOURCE, id))
}

pub async fn create(
    State(state): State<ConsoleState>,
    ScimBody(proxy): ScimBody<ProxyAttrs>,
) -> ConsoleResult<Scim<ScimResource<ProxyAttrs>>> {
    validate(&proxy)?;
    let id = state.storage.insert_proxy(&proxy).await?;
    info!(id, hostname = %proxy.hostname, "proxy created");
    Ok(Scim::created(resource(load(&state, id).await?)))
}

pub async fn get(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<Scim<ScimResource<ProxyAttrs>>> {
    let id = parse_id(RESOURCE, &id)?;
    Ok(Scim::ok(resource(load(&state, id).await?)))
}

pub async fn list(
    State(state): State<ConsoleState>,
    Query(params): Query<ListParams>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<ProxyAttrs>>>> {
    let (query, start) = list_query(&state, &params, ATTRIBUTES)?;
    let (rows, total) = state.storage.list_proxies(&query).await?;
    Ok(Scim::ok(list_response(rows, total, start, resource)))
}

pub async fn update(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
    ScimBody(proxy): ScimBody<ProxyAttrs>,
) -> ConsoleResult<Scim<ScimResource<ProxyAttrs>>> {
    let id = parse_id(RESOURCE, &id)?;
    validate(&proxy)?;
    if !state.storage.update_proxy(id, &proxy).await? {
        return Err(ConsoleError::not_found(RESOURCE, id));
    }
    info!(id, "proxy updated");
    Ok(Scim::ok(resource(load(&state, id).await?)))
}

pub async fn delete(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<StatusCode> {
    let id = parse_id(RESOURCE, &id)?;
    let references = state.storage.proxy_references(id).await?;
    if references > 0 {
        return Err(ConsoleError::Conflict(format!(
            "proxy {id} is used by {references} client(s) or request(s)"
        )));
    }
    if !state.storage.delete_proxy(id).await? {
        return Err(ConsoleError::not_found(RESOURCE, id));
    }
    info!(id, "proxy deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_and_port_are_checked() {
        let Err(ConsoleError::Validation(errors)) = validate(&ProxyAttrs {
            hostname: " ".into(),
            port: 70_000,
            ..Default::default()
        }) else {
            panic!("expected validation errors");
        };
        assert!(errors.contains("hostname"));
        assert!(errors.contains("port"));

        assert!(
            validate(&ProxyAttrs {
                hostname: "proxy.corp".into(),
                port: 3128,
                ..Default::default()
            })
            .is_ok()
        );
    }
}
