use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use tracing::info;

use crate::crypto::keystore::EntryInfo;
use crate::error::{ConsoleError, ConsoleResult};
use crate::router::ConsoleState;
use crate::scim::{ListParams, ListResponse, Scim, ScimBody, ScimResource};
use crate::types::store::{ExportRequest, ExportResponse, KeystoreUpload};

const RESOURCE: &str = "Keystore";

pub(super) fn entry_resource(resource: &'static str, info: EntryInfo) -> ScimResource<EntryInfo> {
    let created = info.created;
    ScimResource::new(resource, info.alias.clone(), info, created, created)
}

/// Page through entries held in memory. Only `alias eq` / `alias co`
/// filters apply here.
pub(super) fn page_entries(
    state: &ConsoleState,
    resource: &'static str,
    entries: Vec<EntryInfo>,
    params: &ListParams,
) -> ConsoleResult<ListResponse<ScimResource<EntryInfo>>> {
    let (query, start) = super::list_query(state, params, &[("alias", "alias")])?;
    let mut matching: Vec<EntryInfo> = entries
        .into_iter()
        .filter(|entry| {
            query.predicates.iter().all(|p| match p.op {
                crate::db::Op::Eq => entry.alias.eq_ignore_ascii_case(&p.value),
                crate::db::Op::Contains => entry
                    .alias
                    .to_lowercase()
                    .contains(&p.value.to_lowercase()),
            })
        })
        .collect();
    if matches!(query.sort, Some((_, crate::db::SortOrder::Descending))) {
        matching.reverse();
    }
    let total = matching.len() as i64;
    let page = matching
        .into_iter()
        .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
        .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
        .map(|info| entry_resource(resource, info))
        .collect();
    Ok(ListResponse::new(page, total, start))
}

pub async fn list(
    State(state): State<ConsoleState>,
    Query(params): Query<ListParams>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<EntryInfo>>>> {
    let entries = state.key_material.list_keys().await?;
    Ok(Scim::ok(page_entries(&state, RESOURCE, entries, &params)?))
}

pub async fn get(
    State(state): State<ConsoleState>,
    Path(alias): Path<String>,
) -> ConsoleResult<Scim<ScimResource<EntryInfo>>> {
    let info = state
        .key_material
        .get_key(&alias)
        .await?
        .ok_or_else(|| ConsoleError::not_found(RESOURCE, &alias))?;
    Ok(Scim::ok(entry_resource(RESOURCE, info)))
}

/// Import key entries from an uploaded keystore.
pub async fn import(
    State(state): State<ConsoleState>,
    ScimBody(upload): ScimBody<KeystoreUpload>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<EntryInfo>>>> {
    let upload = upload.into_upload()?;
    let aliases = state.key_material.import_keys(upload).await?;
    let mut imported = Vec::with_capacity(aliases.len());
    for alias in &aliases {
        if let Some(info) = state.key_material.get_key(alias).await? {
            imported.push(entry_resource(RESOURCE, info));
        }
    }
    let total = imported.len() as i64;
    Ok(Scim::created(ListResponse::new(imported, total, 1)))
}

pub async fn delete(
    State(state): State<ConsoleState>,
    Path(alias): Path<String>,
) -> ConsoleResult<StatusCode> {
    state.key_material.delete_key(&alias).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn export(
    State(state): State<ConsoleState>,
    body: Bytes,
) -> ConsoleResult<Scim<ExportResponse>> {
    let (store_type, password) = ExportRequest::from_body(&body)?.resolve()?;
    let exported = state.key_material.export_keystore(store_type, password).await?;
    info!(store_type = %exported.store_type, "keystore exported");
    Ok(Scim::ok(ExportResponse::new(RESOURCE, exported)))
}
