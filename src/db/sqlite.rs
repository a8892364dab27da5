use crate::db::models::StoreRow;
use crate::db::query::{ListQuery, push_order_and_page, push_where};
use crate::db::schema::SQLITE_INIT;
use crate::error::{ConsoleError, ConsoleResult};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Pool, QueryBuilder, Sqlite};
use std::str::FromStr;
use tracing::info;

pub type SqlitePool = Pool<Sqlite>;

/// Which single-row key material table to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Keystore,
    Truststore,
}

impl StoreKind {
    fn table(&self) -> &'static str {
        match self {
            StoreKind::Keystore => "keystore",
            StoreKind::Truststore => "truststore",
        }
    }

    fn type_column(&self) -> &'static str {
        match self {
            StoreKind::Keystore => "keystore_type",
            StoreKind::Truststore => "truststore_type",
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    pub(crate) pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database and apply the schema.
    pub async fn connect(database_url: &str) -> ConsoleResult<Self> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(connect_opts)
            .await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        info!(database_url, "database ready");
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> ConsoleResult<()> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub(crate) async fn list_rows<T>(
        &self,
        table: &str,
        query: &ListQuery,
    ) -> ConsoleResult<(Vec<T>, i64)>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {table}"));
        push_where(&mut count, &query.predicates);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {table}"));
        push_where(&mut select, &query.predicates);
        push_order_and_page(&mut select, query);
        let rows = select.build_query_as::<T>().fetch_all(&self.pool).await?;
        Ok((rows, total))
    }

    pub(crate) async fn get_row<T>(&self, table: &str, id: i64) -> ConsoleResult<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let sql = format!("SELECT * FROM {table} WHERE id = ?");
        Ok(sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Returns whether a row was removed.
    pub(crate) async fn delete_row(&self, table: &str, id: i64) -> ConsoleResult<bool> {
        let sql = format!("DELETE FROM {table} WHERE id = ?");
        let res = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    pub(crate) async fn exists(&self, table: &str, id: i64) -> ConsoleResult<bool> {
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE id = ?");
        let (n,): (i64,) = sqlx::query_as(&sql).bind(id).fetch_one(&self.pool).await?;
        Ok(n > 0)
    }

    /// Number of rows whose `column` equals `value`, ignoring ASCII case.
    pub(crate) async fn count_matching(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> ConsoleResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE {column} = ? COLLATE NOCASE");
        let (n,): (i64,) = sqlx::query_as(&sql)
            .bind(value)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn load_store(&self, kind: StoreKind) -> ConsoleResult<Option<StoreRow>> {
        let sql = format!(
            "SELECT id, {} AS store_type, password, bytes, created, modified \
             FROM {} ORDER BY id LIMIT 1",
            kind.type_column(),
            kind.table()
        );
        Ok(sqlx::query_as::<_, StoreRow>(&sql)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Replace the single stored keystore or truststore.
    pub async fn save_store(
        &self,
        kind: StoreKind,
        store_type: &str,
        password: &str,
        bytes: &[u8],
    ) -> ConsoleResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let existing: Option<(i64,)> =
            sqlx::query_as(&format!("SELECT id FROM {} ORDER BY id LIMIT 1", kind.table()))
                .fetch_optional(&mut *tx)
                .await?;
        match existing {
            Some((id,)) => {
                sqlx::query(&format!(
                    "UPDATE {} SET {} = ?, password = ?, bytes = ?, modified = ? WHERE id = ?",
                    kind.table(),
                    kind.type_column()
                ))
                .bind(store_type)
                .bind(password)
                .bind(bytes)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(&format!(
                    "INSERT INTO {} ({}, password, bytes, created, modified) VALUES (?, ?, ?, ?, ?)",
                    kind.table(),
                    kind.type_column()
                ))
                .bind(store_type)
                .bind(password)
                .bind(bytes)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Turn a unique constraint violation into a 409.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> ConsoleError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return ConsoleError::Conflict(format!("{what} already exists"));
        }
    }
    ConsoleError::Database(err)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Fresh database in a unique temp file.
    pub async fn temp_storage() -> Storage {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "oidc-console-unit-{}-{nanos}.sqlite",
            std::process::id()
        ));
        Storage::connect(&format!("sqlite:{}", path.display()))
            .await
            .unwrap()
    }
}
