//! OpenID Connect discovery.

use serde::Deserialize;
use tracing::{info, warn};

use crate::db::models::ProviderAttrs;
use crate::error::ConsoleResult;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

/// Whether any endpoint that discovery could supply is still missing.
pub fn needs_discovery(provider: &ProviderAttrs) -> bool {
    !is_blank(&provider.discovery_endpoint)
        && [
            &provider.issuer,
            &provider.authorization_endpoint,
            &provider.token_endpoint,
            &provider.userinfo_endpoint,
            &provider.jwks_uri,
        ]
        .into_iter()
        .any(is_blank)
}

/// Fill the blank endpoint fields; configured values win.
pub fn apply(provider: &mut ProviderAttrs, doc: DiscoveryDocument) {
    let fill = |field: &mut Option<String>, found: Option<String>| {
        if is_blank(field) {
            if let Some(found) = found.filter(|f| !f.is_empty()) {
                *field = Some(found);
            }
        }
    };
    fill(&mut provider.issuer, doc.issuer);
    fill(&mut provider.authorization_endpoint, doc.authorization_endpoint);
    fill(&mut provider.token_endpoint, doc.token_endpoint);
    fill(&mut provider.userinfo_endpoint, doc.userinfo_endpoint);
    fill(&mut provider.jwks_uri, doc.jwks_uri);
}

pub async fn fetch(http: &reqwest::Client, endpoint: &str) -> ConsoleResult<DiscoveryDocument> {
    let doc = http
        .get(endpoint)
        .header("accept", "application/json")
        .send()
        .await?
        .error_for_status()?
        .json::<DiscoveryDocument>()
        .await?;
    Ok(doc)
}

/// Complete `provider` from its discovery endpoint. A failing fetch is
/// logged and leaves the provider as it was.
pub async fn complete(http: &reqwest::Client, provider: &mut ProviderAttrs) {
    if !needs_discovery(provider) {
        return;
    }
    let Some(endpoint) = provider.discovery_endpoint.clone() else {
        return;
    };
    match fetch(http, &endpoint).await {
        Ok(doc) => {
            apply(provider, doc);
            info!(provider = %provider.name, "endpoints filled from discovery document");
        }
        Err(e) => warn!(provider = %provider.name, error = %e, "discovery fetch failed"),
    }
}
