use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use jsonwebtoken::Algorithm;
use std::str::FromStr;
use tracing::info;

use super::{check_proxy, check_url, list_query, list_response, require_text};
use crate::crypto::jwt::check_jws_family;
use crate::db::models::{ClientAttrs, ClientRow, ProviderAttrs, ProviderRow};
use crate::error::{ConsoleError, ConsoleResult, FieldErrors};
use crate::oauth::AuthenticationType;
use crate::oauth::client_auth::ASSERTION_ALGORITHMS;
use crate::oauth::discovery;
use crate::router::ConsoleState;
use crate::scim::filter::AttributeMap;
use crate::scim::{ListParams, ListResponse, Scim, ScimBody, ScimResource, parse_id};

const PROVIDER: &str = "OpenIdProvider";
const CLIENT: &str = "OpenIdClient";

const PROVIDER_ATTRIBUTES: AttributeMap = &[
    ("name", "name"),
    ("issuer", "issuer"),
    ("discoveryEndpoint", "discovery_endpoint"),
    ("tokenEndpoint", "token_endpoint"),
    ("created", "created"),
    ("meta.created", "created"),
    ("meta.lastModified", "modified"),
];

const CLIENT_ATTRIBUTES: AttributeMap = &[
    ("openIdProviderId", "provider_id"),
    ("clientId", "client_id"),
    ("authenticationType", "authentication_type"),
    ("signingKeyAlias", "signing_key_alias"),
    ("created", "created"),
    ("meta.created", "created"),
    ("meta.lastModified", "modified"),
];

fn provider_resource(row: ProviderRow) -> ScimResource<ProviderAttrs> {
    ScimResource::new(PROVIDER, row.id, row.attrs, row.created, row.modified)
}

fn client_resource(row: ClientRow) -> ScimResource<ClientAttrs> {
    ScimResource::new(CLIENT, row.id, row.attrs, row.created, row.modified)
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

async fn key_alias_known(state: &ConsoleState, alias: &str) -> ConsoleResult<bool> {
    Ok(state.key_material.get_key(alias).await?.is_some()
        || state.key_material.get_certificate(alias).await?.is_some())
}

/// Checks on a provider, then discovery of missing endpoints.
async fn prepare_provider(
    state: &ConsoleState,
    id: Option<i64>,
    mut provider: ProviderAttrs,
) -> ConsoleResult<ProviderAttrs> {
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "name", &provider.name);
    for (field, value) in [
        ("discoveryEndpoint", &provider.discovery_endpoint),
        ("issuer", &provider.issuer),
        ("authorizationEndpoint", &provider.authorization_endpoint),
        ("tokenEndpoint", &provider.token_endpoint),
        ("userinfoEndpoint", &provider.userinfo_endpoint),
        ("jwksUri", &provider.jwks_uri),
    ] {
        check_url(&mut errors, field, value.as_deref());
    }
    if blank(&provider.discovery_endpoint) && blank(&provider.token_endpoint) {
        errors.add(
            "tokenEndpoint",
            "either a discovery endpoint or a token endpoint is required",
        );
    }
    if let Some(alias) = provider
        .signature_verification_key_alias
        .as_deref()
        .filter(|a| !a.is_empty())
    {
        if !key_alias_known(state, alias).await? {
            errors.add(
                "signatureVerificationKeyAlias",
                format!("alias '{alias}' is in neither keystore nor truststore"),
            );
        }
    }
    errors.into_result()?;

    if let Some(existing) = state.storage.find_provider_by_name(&provider.name).await? {
        if Some(existing) != id {
            return Err(ConsoleError::Conflict(format!(
                "an OpenID provider named '{}' already exists",
                provider.name
            )));
        }
    }

    if discovery::needs_discovery(&provider) {
        let http = state.outbound.client_for(None, None).await?;
        discovery::complete(&http, &mut provider).await;
    }
    Ok(provider)
}

async fn load_provider(state: &ConsoleState, id: i64) -> ConsoleResult<ProviderRow> {
    state
        .storage
        .get_provider(id)
        .await?
        .ok_or_else(|| ConsoleError::not_found(PROVIDER, id))
}

pub async fn create_provider(
    State(state): State<ConsoleState>,
    ScimBody(provider): ScimBody<ProviderAttrs>,
) -> ConsoleResult<Scim<ScimResource<ProviderAttrs>>> {
    let provider = prepare_provider(&state, None, provider).await?;
    let id = state.storage.insert_provider(&provider).await?;
    info!(id, name = %provider.name, "OpenID provider created");
    Ok(Scim::created(provider_resource(load_provider(&state, id).await?)))
}

pub async fn get_provider(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<Scim<ScimResource<ProviderAttrs>>> {
    let id = parse_id(PROVIDER, &id)?;
    Ok(Scim::ok(provider_resource(load_provider(&state, id).await?)))
}

pub async fn list_providers(
    State(state): State<ConsoleState>,
    Query(params): Query<ListParams>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<ProviderAttrs>>>> {
    let (query, start) = list_query(&state, &params, PROVIDER_ATTRIBUTES)?;
    let (rows, total) = state.storage.list_providers(&query).await?;
    Ok(Scim::ok(list_response(rows, total, start, provider_resource)))
}

pub async fn update_provider(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
    ScimBody(provider): ScimBody<ProviderAttrs>,
) -> ConsoleResult<Scim<ScimResource<ProviderAttrs>>> {
    let id = parse_id(PROVIDER, &id)?;
    load_provider(&state, id).await?;
    let provider = prepare_provider(&state, Some(id), provider).await?;
    state.storage.update_provider(id, &provider).await?;
    info!(id, name = %provider.name, "OpenID provider updated");
    Ok(Scim::ok(provider_resource(load_provider(&state, id).await?)))
}

pub async fn delete_provider(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<StatusCode> {
    let id = parse_id(PROVIDER, &id)?;
    if !state.storage.delete_provider(id).await? {
        return Err(ConsoleError::not_found(PROVIDER, id));
    }
    info!(id, "OpenID provider deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn validate_client(
    state: &ConsoleState,
    id: Option<i64>,
    client: &ClientAttrs,
) -> ConsoleResult<()> {
    let mut errors = FieldErrors::new();
    if !state.storage.provider_exists(client.provider_id).await? {
        errors.add(
            "openIdProviderId",
            format!("provider {} does not exist", client.provider_id),
        );
    }
    require_text(&mut errors, "clientId", &client.client_id);
    check_url(&mut errors, "audience", client.audience.as_deref());
    check_proxy(state, &mut errors, client.proxy_id).await?;

    let auth_type = match client.authentication_type.parse::<AuthenticationType>() {
        Ok(t) => Some(t),
        Err(_) => {
            let allowed: Vec<&str> = AuthenticationType::ALL.iter().map(|t| t.as_str()).collect();
            errors.add(
                "authenticationType",
                format!("must be one of {}", allowed.join(", ")),
            );
            None
        }
    };
    if auth_type.is_some_and(|t| t.needs_secret()) && blank(&client.client_secret) {
        errors.add("clientSecret", "is required for this authentication type");
    }

    let signing_key = match client.signing_key_alias.as_deref().filter(|a| !a.is_empty()) {
        Some(alias) => {
            let key = state.key_material.signing_key(alias).await?;
            if key.is_none() {
                errors.add(
                    "signingKeyAlias",
                    format!("alias '{alias}' is not a key in the keystore"),
                );
            }
            key
        }
        None => None,
    };
    if auth_type == Some(AuthenticationType::PrivateKeyJwt) {
        if blank(&client.signing_key_alias) {
            errors.add("signingKeyAlias", "is required for private_key_jwt");
        }
        let alg = client.signature_algorithm.as_deref().unwrap_or("RS256");
        if !ASSERTION_ALGORITHMS.contains(&alg) {
            errors.add(
                "signatureAlgorithm",
                format!("must be one of {}", ASSERTION_ALGORITHMS.join(", ")),
            );
        } else if let (Ok(alg), Some(key)) = (Algorithm::from_str(alg), signing_key.as_ref()) {
            if let Err(e) = check_jws_family(alg, key.algorithm()?) {
                errors.add("signatureAlgorithm", e.to_string());
            }
        }
    }

    for (field, alias) in [
        ("decryptionKeyAlias", &client.decryption_key_alias),
        ("tlsClientAuthKeyAlias", &client.tls_client_auth_key_alias),
    ] {
        if let Some(alias) = alias.as_deref().filter(|a| !a.is_empty()) {
            if state.key_material.signing_key(alias).await?.is_none() {
                errors.add(field, format!("alias '{alias}' is not a key in the keystore"));
            }
        }
    }
    errors.into_result()?;

    if let Some(existing) = state
        .storage
        .find_client(client.provider_id, &client.client_id)
        .await?
    {
        if Some(existing) != id {
            return Err(ConsoleError::Conflict(format!(
                "client '{}' is already registered with provider {}",
                client.client_id, client.provider_id
            )));
        }
    }
    Ok(())
}

async fn load_client(state: &ConsoleState, id: i64) -> ConsoleResult<ClientRow> {
    state
        .storage
        .get_client(id)
        .await?
        .ok_or_else(|| ConsoleError::not_found(CLIENT, id))
}

pub async fn create_client(
    State(state): State<ConsoleState>,
    ScimBody(client): ScimBody<ClientAttrs>,
) -> ConsoleResult<Scim<ScimResource<ClientAttrs>>> {
    validate_client(&state, None, &client).await?;
    let id = state.storage.insert_client(&client).await?;
    info!(id, client_id = %client.client_id, "OpenID client created");
    Ok(Scim::created(client_resource(load_client(&state, id).await?)))
}

pub async fn get_client(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<Scim<ScimResource<ClientAttrs>>> {
    let id = parse_id(CLIENT, &id)?;
    Ok(Scim::ok(client_resource(load_client(&state, id).await?)))
}

pub async fn list_clients(
    State(state): State<ConsoleState>,
    Query(params): Query<ListParams>,
) -> ConsoleResult<Scim<ListResponse<ScimResource<ClientAttrs>>>> {
    let (query, start) = list_query(&state, &params, CLIENT_ATTRIBUTES)?;
    let (rows, total) = state.storage.list_clients(&query).await?;
    Ok(Scim::ok(list_response(rows, total, start, client_resource)))
}

pub async fn update_client(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
    ScimBody(client): ScimBody<ClientAttrs>,
) -> ConsoleResult<Scim<ScimResource<ClientAttrs>>> {
    let id = parse_id(CLIENT, &id)?;
    load_client(&state, id).await?;
    validate_client(&state, Some(id), &client).await?;
    state.storage.update_client(id, &client).await?;
    info!(id, client_id = %client.client_id, "OpenID client updated");
    Ok(Scim::ok(client_resource(load_client(&state, id).await?)))
}

pub async fn delete_client(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ConsoleResult<StatusCode> {
    let id = parse_id(CLIENT, &id)?;
    if !state.storage.delete_client(id).await? {
        return Err(ConsoleError::not_found(CLIENT, id));
    }
    info!(id, "OpenID client deleted");
    Ok(StatusCode::NO_CONTENT)
}
