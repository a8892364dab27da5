use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use tracing::info;

use super::{list_query, list_response, require_text};
use crate::db::models::{CategoryAttrs, CategoryRow, TokenAttrs, TokenRow};
use crate::error::{ConsoleError, ConsoleResult, FieldErrors};
use crate::router::ConsoleState;
use crate::scim::filter::AttributeMap;
use crate::scim::{ListParams, ListResponse, Scim, ScimBody, ScimResource, parse_id};

const CATEGORY: &str = "TokenCategory";
const TOKEN: &str = "TokenStore";

const CATEGORY_ATTRIBUTES: AttributeMap = &[
    ("name", "name"),
    ("description", "description"),
    ("created", "created"),
    ("meta.created", "created"),
    ("meta.lastModified", "modified"),
];

const TOKEN_ATTRIBUTES: AttributeMap = &[
    ("categoryId", "category_id"),
    ("name", "name"),
    ("tokenType", "token_type"),
    ("token", "token"),
    ("expiresAt", "expires_at"),
    ("created", "created"),
    ("meta.created", "created"),
    ("meta.lastModified", "modified"),
];

fn category_resource(row: CategoryRow) -> ScimResource<CategoryAttrs> {
    ScimResource::new(CATEGORY, row.id, row.attrs, row.created, row.modified)
}

fn token_resource(row: TokenRow) -> ScimResource<TokenAttrs> {
    ScimResource::new(TOKEN, row.id, row.attrs, row.created, row.modified)
}

async fn validate_category(
    state: &ConsoleState,
    id: Option<i64>,
    category: &CategoryAttrs,
) -> ConsoleResult<()> {
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "name", &category.name);
    errors.into_result()?;

    match state.storage.find_category_by_name(&category.name).await? {
        Some(existing) if Some(existing) != id => Err(ConsoleError::Conflict(format!(
            "a token category named '{}' already exists",
            category.name
        ))),
        _ => Ok(()),
    }
}

async fn load_category(state: &ConsoleState, id: i64) -> ConsoleResult<CategoryRow> {
    state
        .storage
        .get_category(id)
        .await?
        .ok_or_else(|| ConsoleError::not_found(CATEGORY, id))
}

pub async fn create_category(
    State(state): State<ConsoleState>,
    ScimBody(category): ScimBody<CategoryAttrs>,
) -> ConsoleResult<Scim<ScimResource<CategoryAttrs>>> {
    validate_category(&state, None, &category).await?;
    let id = state.storage.insert_category(&category).await?;
    info!(id, name = %category.name, "token category created");
    Ok(Scim::created(category_resource(load_category(&state, id).await?)))
}

pub async fn get_category(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<Scim<ScimResource<CategoryAttrs>>> {
    let id = parse_id(CATEGORY, &id)?;
    Ok(Scim::ok(category_resource(load_category(&state, id).await?)))
}

pub async fn list_categories(
    State(state): State<ConsoleState>,
    Query(params): Query<ListParams>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<CategoryAttrs>>>> {
    let (query, start) = list_query(&state, &params, CATEGORY_ATTRIBUTES)?;
    let (rows, total) = state.storage.list_categories(&query).await?;
    Ok(Scim::ok(list_response(rows, total, start, category_resource)))
}

pub async fn update_category(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
    ScimBody(category): ScimBody<CategoryAttrs>,
) -> ConsoleResult<Scim<ScimResource<CategoryAttrs>>> {
    let id = parse_id(CATEGORY, &id)?;
    load_category(&state, id).await?;
    validate_category(&state, Some(id), &category).await?;
    state.storage.update_category(id, &category).await?;
    info!(id, "token category updated");
    Ok(Scim::ok(category_resource(load_category(&state, id).await?)))
}

pub async fn delete_category(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<StatusCode> {
    let id = parse_id(CATEGORY, &id)?;
    if !state.storage.delete_category(id).await? {
        return Err(ConsoleError::not_found(CATEGORY, id));
    }
    info!(id, "token category deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn validate_token(state: &ConsoleState, token: &TokenAttrs) -> ConsoleResult<()> {
    let mut errors = FieldErrors::new();
    if !state.storage.category_exists(token.category_id).await? {
        errors.add(
            "categoryId",
            format!("token category {} does not exist", token.category_id),
        );
    }
    require_text(&mut errors, "token", &token.token);
    errors.into_result()
}

async fn load_token(state: &ConsoleState, id: i64) -> ConsoleResult<TokenRow> {
    state
        .storage
        .get_token(id)
        .await?
        .ok_or_else(|| ConsoleError::not_found(TOKEN, id))
}

pub async fn create_token(
    State(state): State<ConsoleState>,
    ScimBody(token): ScimBody<TokenAttrs>,
) -> ConsoleResult<Scim<ScimResource<TokenAttrs>>> {
    validate_token(&state, &token).await?;
    let id = state.storage.insert_token(&token).await?;
    info!(id, category_id = token.category_id, "token stored");
    Ok(Scim::created(token_resource(load_token(&state, id).await?)))
}

pub async fn get_token(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<Scim<ScimResource<TokenAttrs>>> {
    let id = parse_id(TOKEN, &id)?;
    Ok(Scim::ok(token_resource(load_token(&state, id).await?)))
}

pub async fn list_tokens(
    State(state): State<ConsoleState>,
    Query(params): Query<ListParams>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<TokenAttrs>>>> {
    let (query, start) = list_query(&state, &params, TOKEN_ATTRIBUTES)?;
    let (rows, total) = state.storage.list_tokens(&query).await?;
    Ok(Scim::ok(list_response(rows, total, start, token_resource)))
}

pub async fn update_token(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
    ScimBody(token): ScimBody<TokenAttrs>,
) -> ConsoleResult<Scim<ScimResource<TokenAttrs>>> {
    let id = parse_id(TOKEN, &id)?;
    load_token(&state, id).await?;
    validate_token(&state, &token).await?;
    state.storage.update_token(id, &token).await?;
    info!(id, "stored token updated");
    Ok(Scim::ok(token_resource(load_token(&state, id).await?)))
}

pub async fn delete_token(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<StatusCode> {
    let id = parse_id(TOKEN, &id)?;
    if !state.storage.delete_token(id).await? {
        return Err(ConsoleError::not_found(TOKEN, id));
    }
    info!(id, "stored token deleted");
    Ok(StatusCode::NO_CONTENT)
}
