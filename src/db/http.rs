//! Stored HTTP request templates and the exchange history.

use chrono::Utc;

use crate::db::models::{HistoryRow, HttpRequestAttrs, HttpRequestRow, NewHistory};
use crate::db::query::ListQuery;
use crate::db::sqlite::{Storage, conflict_on_unique};
use crate::error::ConsoleResult;

impl Storage {
    pub async fn insert_http_request(&self, request: &HttpRequestAttrs) -> ConsoleResult<i64> {
        let now = Utc::now();
        let res = sqlx::query(
            r#"INSERT INTO http_request (name, method, url, headers, body, proxy_id, created, modified)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&request.name)
        .bind(&request.method)
        .bind(&request.url)
        .bind(&request.headers)
        .bind(&request.body)
        .bind(request.proxy_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "HTTP request"))?;
        Ok(res.last_insert_rowid())
    }

    pub async fn get_http_request(&self, id: i64) -> ConsoleResult<Option<HttpRequestRow>> {
        self.get_row("http_request", id).await
    }

    pub async fn list_http_requests(
        &self,
        query: &ListQuery,
    ) -> ConsoleResult<(Vec<HttpRequestRow>, i64)> {
        self.list_rows("http_request", query).await
    }

    pub async fn update_http_request(
        &self,
        id: i64,
        request: &HttpRequestAttrs,
    ) -> ConsoleResult<bool> {
        let res = sqlx::query(
            r#"UPDATE http_request SET
                   name = ?, method = ?, url = ?, headers = ?, body = ?, proxy_id = ?, modified = ?
               WHERE id = ?"#,
        )
        .bind(&request.name)
        .bind(&request.method)
        .bind(&request.url)
        .bind(&request.headers)
        .bind(&request.body)
        .bind(request.proxy_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "HTTP request"))?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_http_request(&self, id: i64) -> ConsoleResult<bool> {
        self.delete_row("http_request", id).await
    }

    pub async fn find_http_request_by_name(&self, name: &str) -> ConsoleResult<Option<i64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM http_request WHERE name = ? COLLATE NOCASE")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn insert_history(&self, exchange: &NewHistory) -> ConsoleResult<i64> {
        let res = sqlx::query(
            r#"INSERT INTO http_response_history (
                   client_id, request_id, request_method, request_url, request_headers,
                   request_body, status, response_headers, response_body, duration_ms, created
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(exchange.client_id)
        .bind(exchange.request_id)
        .bind(&exchange.request_method)
        .bind(&exchange.request_url)
        .bind(&exchange.request_headers)
        .bind(&exchange.request_body)
        .bind(exchange.status)
        .bind(&exchange.response_headers)
        .bind(&exchange.response_body)
        .bind(exchange.duration_ms)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn get_history(&self, id: i64) -> ConsoleResult<Option<HistoryRow>> {
        self.get_row("http_response_history", id).await
    }

    pub async fn list_history(&self, query: &ListQuery) -> ConsoleResult<(Vec<HistoryRow>, i64)> {
        self.list_rows("http_response_history", query).await
    }

    pub async fn delete_history(&self, id: i64) -> ConsoleResult<bool> {
        self.delete_row("http_response_history", id).await
    }

    /// Keep only the newest `keep` exchanges of a client. Returns the number removed.
    pub async fn trim_history(&self, client_id: i64, keep: i64) -> ConsoleResult<u64> {
        let res = sqlx::query(
            r#"DELETE FROM http_response_history
               WHERE client_id = ? AND id NOT IN (
                   SELECT id FROM http_response_history
                   WHERE client_id = ? ORDER BY id DESC LIMIT ?
               )"#,
        )
        .bind(client_id)
        .bind(client_id)
        .bind(keep.max(0))
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::models::{ClientAttrs, HttpHeader, HttpRequestAttrs, NewHistory, ProviderAttrs};
    use crate::db::query::ListQuery;
    use crate::db::sqlite::test_support::temp_storage;
    use sqlx::types::Json;

    fn exchange(client_id: Option<i64>, status: i64) -> NewHistory {
        NewHistory {
            client_id,
            request_id: None,
            request_method: "POST".into(),
            request_url: "https://idp/token".into(),
            request_headers: Json(vec![HttpHeader::new("accept", "application/json")]),
            request_body: Some("grant_type=client_credentials".into()),
            status,
            response_headers: Json(vec![]),
            response_body: Some("{}".into()),
            duration_ms: 12,
        }
    }

    #[tokio::test]
    async fn http_request_headers_survive_storage() {
        let storage = temp_storage().await;
        let attrs = HttpRequestAttrs {
            name: "userinfo".into(),
            method: "GET".into(),
            url: "https://idp/userinfo".into(),
            headers: Json(vec![
                HttpHeader::new("authorization", "Bearer abc"),
                HttpHeader::new("x-trace", "1"),
            ]),
            body: None,
            proxy_id: None,
        };
        let id = storage.insert_http_request(&attrs).await.unwrap();
        assert_eq!(storage.get_http_request(id).await.unwrap().unwrap().attrs, attrs);
        assert_eq!(
            storage.find_http_request_by_name("USERINFO").await.unwrap(),
            Some(id)
        );
    }

    #[tokio::test]
    async fn history_is_trimmed_per_client() {
        let storage = temp_storage().await;
        let provider_id = storage
            .insert_provider(&ProviderAttrs {
                name: "idp".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let client_id = storage
            .insert_client(&ClientAttrs {
                provider_id,
                client_id: "svc".into(),
                authentication_type: "none".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        for status in [200, 201, 400, 500] {
            storage
                .insert_history(&exchange(Some(client_id), status))
                .await
                .unwrap();
        }
        storage.insert_history(&exchange(None, 204)).await.unwrap();

        assert_eq!(storage.trim_history(client_id, 2).await.unwrap(), 2);
        let (rows, total) = storage.list_history(&ListQuery::default()).await.unwrap();
        assert_eq!(total, 3);
        let statuses: Vec<i64> = rows.iter().map(|r| r.exchange.status).collect();
        assert_eq!(statuses, vec![400, 500, 204]);
    }
}
