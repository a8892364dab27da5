use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Serialize;
use tracing::info;

use super::{list_query, list_response};
use crate::db::models::AuthCodeGrantRow;
use crate::error::{ConsoleError, ConsoleResult};
use crate::oauth::authorize::{self, AuthCodeGrantInput};
use crate::oauth::token::{self, AccessTokenRequest, AccessTokenResponse};
use crate::router::ConsoleState;
use crate::scim::filter::AttributeMap;
use crate::scim::{ListParams, ListResponse, Scim, ScimBody, ScimResource, parse_id, schema_urn};

const GRANT: &str = "AuthCodeGrantRequest";

const GRANT_ATTRIBUTES: AttributeMap = &[
    ("openIdClientId", "client_id"),
    ("state", "state"),
    ("redirectUri", "redirect_uri"),
    ("created", "created"),
    ("meta.created", "created"),
];

/// Grant attributes without the columns already in the envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAttributes {
    pub open_id_client_id: i64,
    pub state: String,
    pub redirect_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub use_pkce: bool,
    pub authorization_url: String,
}

fn grant_resource(row: AuthCodeGrantRow) -> ScimResource<GrantAttributes> {
    let (id, created) = (row.id, row.created);
    let attributes = GrantAttributes {
        open_id_client_id: row.client_id,
        use_pkce: row.code_verifier.is_some(),
        state: row.state,
        redirect_uri: row.redirect_uri,
        scope: row.scope,
        authorization_url: row.authorization_url,
    };
    ScimResource::new(GRANT, id, attributes, created, created)
}

#[derive(Debug, Serialize)]
pub struct TokenResult {
    pub schemas: Vec<String>,
    #[serde(flatten)]
    pub response: AccessTokenResponse,
}

/// POST /AccessTokenRequest
pub async fn request_token(
    State(state): State<ConsoleState>,
    ScimBody(request): ScimBody<AccessTokenRequest>,
) -> ConsoleResult<Scim<TokenResult>> {
    let response = token::execute(
        &state.storage,
        &state.key_material,
        &state.outbound,
        request,
    )
    .await?;
    Ok(Scim::ok(TokenResult {
        schemas: vec![schema_urn("AccessTokenRequest")],
        response,
    }))
}

pub async fn create_auth_code_grant(
    State(state): State<ConsoleState>,
    ScimBody(input): ScimBody<AuthCodeGrantInput>,
) -> ConsoleResult<Scim<ScimResource<GrantAttributes>>> {
    let row = authorize::create(&state.storage, input).await?;
    Ok(Scim::created(grant_resource(row)))
}

pub async fn get_auth_code_grant(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<Scim<ScimResource<GrantAttributes>>> {
    let id = parse_id(GRANT, &id)?;
    let row = state
        .storage
        .get_auth_code_grant(id)
        .await?
        .ok_or_else(|| ConsoleError::not_found(GRANT, id))?;
    Ok(Scim::ok(grant_resource(row)))
}

pub async fn list_auth_code_grants(
    State(state): State<ConsoleState>,
    Query(params): Query<ListParams>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<GrantAttributes>>>> {
    let (query, start) = list_query(&state, &params, GRANT_ATTRIBUTES)?;
    let (rows, total) = state.storage.list_auth_code_grants(&query).await?;
    Ok(Scim::ok(list_response(rows, total, start, grant_resource)))
}

pub async fn delete_auth_code_grant(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<StatusCode> {
    let id = parse_id(GRANT, &id)?;
    if !state.storage.delete_auth_code_grant(id).await? {
        return Err(ConsoleError::not_found(GRANT, id));
    }
    info!(id, "authorization request deleted");
    Ok(StatusCode::NO_CONTENT)
}
