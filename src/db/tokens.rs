//! Token categories, stored tokens and pending authorization code grants.

use chrono::Utc;

use crate::db::models::{
    AuthCodeGrantRow, CategoryAttrs, CategoryRow, NewAuthCodeGrant, TokenAttrs, TokenRow,
};
use crate::db::query::ListQuery;
use crate::db::sqlite::{Storage, conflict_on_unique};
use crate::error::ConsoleResult;

impl Storage {
    pub async fn insert_category(&self, category: &CategoryAttrs) -> ConsoleResult<i64> {
        let now = Utc::now();
        let res = sqlx::query(
            "INSERT INTO token_category (name, description, created, modified) VALUES (?, ?, ?, ?)",
        )
        .bind(&category.name)
        .bind(&category.description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "token category"))?;
        Ok(res.last_insert_rowid())
    }

    pub async fn get_category(&self, id: i64) -> ConsoleResult<Option<CategoryRow>> {
        self.get_row("token_category", id).await
    }

    pub async fn list_categories(
        &self,
        query: &ListQuery,
    ) -> ConsoleResult<(Vec<CategoryRow>, i64)> {
        self.list_rows("token_category", query).await
    }

    pub async fn update_category(&self, id: i64, category: &CategoryAttrs) -> ConsoleResult<bool> {
        let res = sqlx::query(
            "UPDATE token_category SET name = ?, description = ?, modified = ? WHERE id = ?",
        )
        .bind(&category.name)
        .bind(&category.description)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "token category"))?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_category(&self, id: i64) -> ConsoleResult<bool> {
        self.delete_row("token_category", id).await
    }

    pub async fn category_exists(&self, id: i64) -> ConsoleResult<bool> {
        self.exists("token_category", id).await
    }

    pub async fn find_category_by_name(&self, name: &str) -> ConsoleResult<Option<i64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM token_category WHERE name = ? COLLATE NOCASE")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn insert_token(&self, token: &TokenAttrs) -> ConsoleResult<i64> {
        let now = Utc::now();
        let res = sqlx::query(
            r#"INSERT INTO token_store (
                   category_id, name, token, token_type, expires_at, created, modified
               ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(token.category_id)
        .bind(&token.name)
        .bind(&token.token)
        .bind(&token.token_type)
        .bind(token.expires_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn get_token(&self, id: i64) -> ConsoleResult<Option<TokenRow>> {
        self.get_row("token_store", id).await
    }

    pub async fn list_tokens(&self, query: &ListQuery) -> ConsoleResult<(Vec<TokenRow>, i64)> {
        self.list_rows("token_store", query).await
    }

    pub async fn update_token(&self, id: i64, token: &TokenAttrs) -> ConsoleResult<bool> {
        let res = sqlx::query(
            r#"UPDATE token_store SET
                   category_id = ?, name = ?, token = ?, token_type = ?, expires_at = ?,
                   modified = ?
               WHERE id = ?"#,
        )
        .bind(token.category_id)
        .bind(&token.name)
        .bind(&token.token)
        .bind(&token.token_type)
        .bind(token.expires_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_token(&self, id: i64) -> ConsoleResult<bool> {
        self.delete_row("token_store", id).await
    }

    pub async fn insert_auth_code_grant(&self, grant: &NewAuthCodeGrant) -> ConsoleResult<i64> {
        let res = sqlx::query(
            r#"INSERT INTO auth_code_grant_request (
                   client_id, state, redirect_uri, scope, code_verifier, authorization_url, created
               ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(grant.client_id)
        .bind(&grant.state)
        .bind(&grant.redirect_uri)
        .bind(&grant.scope)
        .bind(&grant.code_verifier)
        .bind(&grant.authorization_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "authorization request state"))?;
        Ok(res.last_insert_rowid())
    }

    pub async fn get_auth_code_grant(&self, id: i64) -> ConsoleResult<Option<AuthCodeGrantRow>> {
        self.get_row("auth_code_grant_request", id).await
    }

    pub async fn find_auth_code_grant_by_state(
        &self,
        state: &str,
    ) -> ConsoleResult<Option<AuthCodeGrantRow>> {
        Ok(
            sqlx::query_as::<_, AuthCodeGrantRow>(
                "SELECT * FROM auth_code_grant_request WHERE state = ?",
            )
            .bind(state)
            .fetch_optional(&self.pool)
            .await?,
        )
    }

    pub async fn list_auth_code_grants(
        &self,
        query: &ListQuery,
    ) -> ConsoleResult<(Vec<AuthCodeGrantRow>, i64)> {
        self.list_rows("auth_code_grant_request", query).await
    }

    pub async fn delete_auth_code_grant(&self, id: i64) -> ConsoleResult<bool> {
        self.delete_row("auth_code_grant_request", id).await
    }
}
