//! MySQL-backed table store for the bulk loader.
//!
//! Connects per call (adapters are one-shot processes), creates the
//! schema objects if absent, and inserts rows with positional parameter
//! binding inside a single transaction.

use async_trait::async_trait;
use snafu::prelude::*;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, Executor};
use tracing::debug;

use crate::error::{ConnectSnafu, DatabaseError, SqlSnafu};

use super::TableStore;

/// Table store implementation on sqlx's MySQL driver.
#[derive(Debug, Clone)]
pub struct MySqlTableStore {
    user: String,
    password: String,
}

impl MySqlTableStore {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    async fn connect(&self, host: &str, database: &str) -> Result<MySqlConnection, DatabaseError> {
        let options = MySqlConnectOptions::new()
            .host(host)
            .username(&self.user)
            .password(&self.password)
            .database(database);

        options.connect().await.context(ConnectSnafu { host })
    }
}

/// Backtick-quote an identifier, stripping any embedded backticks.
///
/// Identifiers come from CSV headers and config, not from SQL-literate
/// callers, so they cannot be bound as parameters.
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', ""))
}

#[async_trait]
impl TableStore for MySqlTableStore {
    async fn ensure_database(&self, host: &str, database: &str) -> Result<(), DatabaseError> {
        // The bootstrap connection targets the built-in schema because
        // `database` may not exist yet.
        let mut conn = self.connect(host, "mysql").await?;
        let ddl = format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(database));
        conn.execute(ddl.as_str()).await.context(SqlSnafu)?;
        conn.close().await.ok();
        Ok(())
    }

    async fn load_rows(
        &self,
        host: &str,
        database: &str,
        table: &str,
        header: &[String],
        rows: &[Vec<String>],
    ) -> Result<u64, DatabaseError> {
        let mut conn = self.connect(host, database).await?;

        let columns = header
            .iter()
            .map(|col| format!("{} VARCHAR(255)", quote_ident(col)))
            .collect::<Vec<_>>()
            .join(", ");
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            columns
        );

        let column_list = header
            .iter()
            .map(|col| quote_ident(col))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; header.len()].join(", ");
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list,
            placeholders
        );

        let mut tx = conn.begin().await.context(SqlSnafu)?;
        sqlx::query(&create_table)
            .execute(&mut *tx)
            .await
            .context(SqlSnafu)?;

        let mut inserted = 0u64;
        for row in rows {
            let mut query = sqlx::query(&insert);
            for value in row {
                query = query.bind(value);
            }
            query.execute(&mut *tx).await.context(SqlSnafu)?;
            inserted += 1;
        }

        tx.commit().await.context(SqlSnafu)?;
        conn.close().await.ok();

        debug!(
            "[mysql] loaded {} rows into {}.{}",
            inserted, database, table
        );
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_strips_backticks() {
        assert_eq!(quote_ident("price_tier"), "`price_tier`");
        assert_eq!(quote_ident("bad`name"), "`badname`");
    }
}
