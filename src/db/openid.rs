//! Proxies, OpenID providers and their clients.

use chrono::Utc;

use crate::db::models::{ClientAttrs, ClientRow, ProviderAttrs, ProviderRow, ProxyAttrs, ProxyRow};
use crate::db::query::ListQuery;
use crate::db::sqlite::{Storage, conflict_on_unique};
use crate::error::ConsoleResult;

impl Storage {
    pub async fn insert_proxy(&self, proxy: &ProxyAttrs) -> ConsoleResult<i64> {
        let now = Utc::now();
        let res = sqlx::query(
            r#"INSERT INTO proxy (hostname, port, username, password, created, modified)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&proxy.hostname)
        .bind(proxy.port)
        .bind(&proxy.username)
        .bind(&proxy.password)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn get_proxy(&self, id: i64) -> ConsoleResult<Option<ProxyRow>> {
        self.get_row("proxy", id).await
    }

    pub async fn list_proxies(&self, query: &ListQuery) -> ConsoleResult<(Vec<ProxyRow>, i64)> {
        self.list_rows("proxy", query).await
    }

    pub async fn update_proxy(&self, id: i64, proxy: &ProxyAttrs) -> ConsoleResult<bool> {
        let res = sqlx::query(
            r#"UPDATE proxy SET hostname = ?, port = ?, username = ?, password = ?, modified = ?
               WHERE id = ?"#,
        )
        .bind(&proxy.hostname)
        .bind(proxy.port)
        .bind(&proxy.username)
        .bind(&proxy.password)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_proxy(&self, id: i64) -> ConsoleResult<bool> {
        self.delete_row("proxy", id).await
    }

    pub async fn proxy_exists(&self, id: i64) -> ConsoleResult<bool> {
        self.exists("proxy", id).await
    }

    /// Clients and stored HTTP requests routed through this proxy.
    pub async fn proxy_references(&self, id: i64) -> ConsoleResult<i64> {
        let (n,): (i64,) = sqlx::query_as(
            r#"SELECT (SELECT COUNT(*) FROM openid_client WHERE proxy_id = ?)
                    + (SELECT COUNT(*) FROM http_request WHERE proxy_id = ?)"#,
        )
        .bind(id)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }

    pub async fn insert_provider(&self, provider: &ProviderAttrs) -> ConsoleResult<i64> {
        let now = Utc::now();
        let res = sqlx::query(
            r#"INSERT INTO openid_provider (
                   name, discovery_endpoint, issuer, authorization_endpoint, token_endpoint,
                   userinfo_endpoint, jwks_uri, signature_verification_key_alias,
                   created, modified
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&provider.name)
        .bind(&provider.discovery_endpoint)
        .bind(&provider.issuer)
        .bind(&provider.authorization_endpoint)
        .bind(&provider.token_endpoint)
        .bind(&provider.userinfo_endpoint)
        .bind(&provider.jwks_uri)
        .bind(&provider.signature_verification_key_alias)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "OpenID provider"))?;
        Ok(res.last_insert_rowid())
    }

    pub async fn get_provider(&self, id: i64) -> ConsoleResult<Option<ProviderRow>> {
        self.get_row("openid_provider", id).await
    }

    pub async fn list_providers(
        &self,
        query: &ListQuery,
    ) -> ConsoleResult<(Vec<ProviderRow>, i64)> {
        self.list_rows("openid_provider", query).await
    }

    pub async fn update_provider(&self, id: i64, provider: &ProviderAttrs) -> ConsoleResult<bool> {
        let res = sqlx::query(
            r#"UPDATE openid_provider SET
                   name = ?, discovery_endpoint = ?, issuer = ?, authorization_endpoint = ?,
                   token_endpoint = ?, userinfo_endpoint = ?, jwks_uri = ?,
                   signature_verification_key_alias = ?, modified = ?
               WHERE id = ?"#,
        )
        .bind(&provider.name)
        .bind(&provider.discovery_endpoint)
        .bind(&provider.issuer)
        .bind(&provider.authorization_endpoint)
        .bind(&provider.token_endpoint)
        .bind(&provider.userinfo_endpoint)
        .bind(&provider.jwks_uri)
        .bind(&provider.signature_verification_key_alias)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "OpenID provider"))?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_provider(&self, id: i64) -> ConsoleResult<bool> {
        self.delete_row("openid_provider", id).await
    }

    pub async fn provider_exists(&self, id: i64) -> ConsoleResult<bool> {
        self.exists("openid_provider", id).await
    }

    /// Id of the provider carrying `name` (case-insensitive).
    pub async fn find_provider_by_name(&self, name: &str) -> ConsoleResult<Option<i64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM openid_provider WHERE name = ? COLLATE NOCASE")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn insert_client(&self, client: &ClientAttrs) -> ConsoleResult<i64> {
        let now = Utc::now();
        let res = sqlx::query(
            r#"INSERT INTO openid_client (
                   provider_id, client_id, client_secret, authentication_type,
                   signing_key_alias, signature_algorithm, audience, decryption_key_alias,
                   tls_client_auth_key_alias, proxy_id, created, modified
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(client.provider_id)
        .bind(&client.client_id)
        .bind(&client.client_secret)
        .bind(&client.authentication_type)
        .bind(&client.signing_key_alias)
        .bind(&client.signature_algorithm)
        .bind(&client.audience)
        .bind(&client.decryption_key_alias)
        .bind(&client.tls_client_auth_key_alias)
        .bind(client.proxy_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "OpenID client"))?;
        Ok(res.last_insert_rowid())
    }

    pub async fn get_client(&self, id: i64) -> ConsoleResult<Option<ClientRow>> {
        self.get_row("openid_client", id).await
    }

    pub async fn list_clients(&self, query: &ListQuery) -> ConsoleResult<(Vec<ClientRow>, i64)> {
        self.list_rows("openid_client", query).await
    }

    pub async fn update_client(&self, id: i64, client: &ClientAttrs) -> ConsoleResult<bool> {
        let res = sqlx::query(
            r#"UPDATE openid_client SET
                   provider_id = ?, client_id = ?, client_secret = ?, authentication_type = ?,
                   signing_key_alias = ?, signature_algorithm = ?, audience = ?,
                   decryption_key_alias = ?, tls_client_auth_key_alias = ?, proxy_id = ?,
                   modified = ?
               WHERE id = ?"#,
        )
        .bind(client.provider_id)
        .bind(&client.client_id)
        .bind(&client.client_secret)
        .bind(&client.authentication_type)
        .bind(&client.signing_key_alias)
        .bind(&client.signature_algorithm)
        .bind(&client.audience)
        .bind(&client.decryption_key_alias)
        .bind(&client.tls_client_auth_key_alias)
        .bind(client.proxy_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "OpenID client"))?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_client(&self, id: i64) -> ConsoleResult<bool> {
        self.delete_row("openid_client", id).await
    }

    pub async fn client_exists(&self, id: i64) -> ConsoleResult<bool> {
        self.exists("openid_client", id).await
    }

    /// Id of the client registered under `client_id` at `provider_id`.
    pub async fn find_client(&self, provider_id: i64, client_id: &str) -> ConsoleResult<Option<i64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM openid_client WHERE provider_id = ? AND client_id = ?")
                .bind(provider_id)
                .bind(client_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    /// Names of the records that point at keystore or truststore `alias`.
    pub async fn key_alias_references(&self, alias: &str) -> ConsoleResult<Vec<String>> {
        let mut refs = Vec::new();
        for column in [
            "signing_key_alias",
            "decryption_key_alias",
            "tls_client_auth_key_alias",
        ] {
            if self.count_matching("openid_client", column, alias).await? > 0 {
                refs.push(format!("OpenIdClient.{column}"));
            }
        }
        if self
            .count_matching("openid_provider", "signature_verification_key_alias", alias)
            .await?
            > 0
        {
            refs.push("OpenIdProvider.signature_verification_key_alias".to_string());
        }
        Ok(refs)
    }
}
