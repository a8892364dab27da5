use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use tracing::info;

use super::keystore::{entry_resource, page_entries};
use crate::crypto::keystore::EntryInfo;
use crate::error::{ConsoleError, ConsoleResult, FieldErrors};
use crate::router::ConsoleState;
use crate::scim::{ListParams, ListResponse, Scim, ScimBody, ScimResource};
use crate::types::store::{ExportRequest, ExportResponse, TruststoreUpload};

const RESOURCE: &str = "Truststore";

pub async fn list(
    State(state): State<ConsoleState>,
    Query(params): Query<ListParams>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<EntryInfo>>>> {
    let entries = state.key_material.list_certificates().await?;
    Ok(Scim::ok(page_entries(&state, RESOURCE, entries, &params)?))
}

pub async fn get(
    State(state): State<ConsoleState>,
    Path(alias): Path<String>,
) -> ConsoleResult<Scim<ScimResource<EntryInfo>>> {
    let info = state
        .key_material
        .get_certificate(&alias)
        .await?
        .ok_or_else(|| ConsoleError::not_found(RESOURCE, &alias))?;
    Ok(Scim::ok(entry_resource(RESOURCE, info)))
}

/// Merge an uploaded store, or add the single certificate in `certificate`.
pub async fn upload(
    State(state): State<ConsoleState>,
    ScimBody(upload): ScimBody<TruststoreUpload>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<EntryInfo>>>> {
    let aliases = match upload.certificate.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(certificate) => {
            let alias = upload.alias.as_deref().unwrap_or_default().trim();
            if alias.is_empty() {
                let mut errors = FieldErrors::new();
                errors.add("alias", "is required when adding a certificate");
                return Err(ConsoleError::Validation(errors));
            }
            vec![state.key_material.add_certificate(alias, certificate).await?]
        }
        None => {
            let store = upload.store.into_upload()?;
            state.key_material.merge_truststore(store).await?
        }
    };

    let mut added = Vec::with_capacity(aliases.len());
    for alias in &aliases {
        if let Some(info) = state.key_material.get_certificate(alias).await? {
            added.push(entry_resource(RESOURCE, info));
        }
    }
    info!(count = added.len(), "truststore updated");
    let total = added.len() as i64;
    Ok(Scim::created(ListResponse::new(added, total, 1)))
}

pub async fn delete(
    State(state): State<ConsoleState>,
    Path(alias): Path<String>,
) -> ConsoleResult<StatusCode> {
    state.key_material.delete_certificate(&alias).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn export(
    State(state): State<ConsoleState>,
    body: Bytes,
) -> ConsoleResult<Scim<ExportResponse>> {
    let (store_type, password) = ExportRequest::from_body(&body)?.resolve()?;
    let exported = state
        .key_material
        .export_truststore(store_type, password)
        .await?;
    info!(store_type = %exported.store_type, "truststore exported");
    Ok(Scim::ok(ExportResponse::new(RESOURCE, exported)))
}
