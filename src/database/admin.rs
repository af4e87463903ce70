// pgmanager/src/database/admin.rs
use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use tracing::{debug, info};

use super::{ConnectionParams, quote_identifier, validate_identifier};
use crate::errors::{AppError, Result};

// SQLSTATE duplicate_database
const DUPLICATE_DATABASE: &str = "42P04";

/// Server-level operations on databases. Every statement takes effect on its
/// own; nothing here wraps several statements in a transaction.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    /// Terminates other sessions connected to `db`. Returns how many were
    /// terminated; zero is not an error.
    async fn terminate_connections(&self, db: &str) -> Result<u64>;

    /// Drops `db` if it exists.
    async fn drop_database(&self, db: &str) -> Result<()>;

    /// Creates `db` owned by `owner`. Fails with
    /// [`AppError::DatabaseExistsConflict`] when the name is taken.
    async fn create_database(&self, db: &str, owner: &str) -> Result<()>;

    /// Renames `from` to `to` in a single statement.
    async fn rename_database(&self, from: &str, to: &str) -> Result<()>;

    /// Non-template databases that accept connections, sorted by name.
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Number of base tables in the `public` schema of `db`.
    async fn table_count(&self, db: &str) -> Result<i64>;
}

/// [`DatabaseAdmin`] over a fresh connection to the maintenance database for
/// every call.
#[derive(Debug, Clone)]
pub struct PostgresAdmin {
    server: ConnectionParams,
    maintenance_db: String,
}

impl PostgresAdmin {
    pub fn new(server: &ConnectionParams, maintenance_db: &str) -> Self {
        Self {
            server: server.clone(),
            maintenance_db: maintenance_db.to_string(),
        }
    }

    async fn connect_to(&self, db: &str) -> Result<PgConnection> {
        let params = self.server.with_database(db);
        debug!(server = %params.redacted(), "opening admin connection");
        PgConnection::connect_with(&params.connect_options())
            .await
            .map_err(|e| AppError::sql(format!("connect to {}", params.redacted()), e))
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        let mut conn = self.connect_to(&self.maintenance_db).await?;
        let result = sqlx::query(statement).execute(&mut conn).await;
        close_quietly(conn).await;
        result
            .map(|_| ())
            .map_err(|e| AppError::sql(statement, e))
    }
}

async fn close_quietly(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "admin connection did not close cleanly");
    }
}

fn is_duplicate_database(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => is_duplicate_code(db_err.code().as_deref()),
        _ => false,
    }
}

fn is_duplicate_code(code: Option<&str>) -> bool {
    code == Some(DUPLICATE_DATABASE)
}

const TERMINATE_STATEMENT: &str = "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                                   WHERE datname = $1 AND pid <> pg_backend_pid()";

// IF EXISTS keeps a repeated drop from failing.
fn drop_statement(db: &str) -> Result<String> {
    Ok(format!("DROP DATABASE IF EXISTS {}", quote_identifier(db)?))
}

fn create_statement(db: &str, owner: &str) -> Result<String> {
    Ok(format!(
        "CREATE DATABASE {} OWNER {}",
        quote_identifier(db)?,
        quote_identifier(owner)?
    ))
}

fn rename_statement(from: &str, to: &str) -> Result<String> {
    Ok(format!(
        "ALTER DATABASE {} RENAME TO {}",
        quote_identifier(from)?,
        quote_identifier(to)?
    ))
}

#[async_trait]
impl DatabaseAdmin for PostgresAdmin {
    async fn terminate_connections(&self, db: &str) -> Result<u64> {
        validate_identifier(db)?;
        let statement = TERMINATE_STATEMENT;
        let mut conn = self.connect_to(&self.maintenance_db).await?;
        let result = sqlx::query(statement).bind(db).fetch_all(&mut conn).await;
        close_quietly(conn).await;
        let rows = result.map_err(|e| AppError::sql(statement, e))?;
        if !rows.is_empty() {
            info!(database = db, sessions = rows.len(), "terminated active connections");
        }
        Ok(rows.len() as u64)
    }

    async fn drop_database(&self, db: &str) -> Result<()> {
        let statement = drop_statement(db)?;
        self.execute(&statement).await?;
        info!(database = db, "✓ database dropped (if it existed)");
        Ok(())
    }

    async fn create_database(&self, db: &str, owner: &str) -> Result<()> {
        let statement = create_statement(db, owner)?;
        let mut conn = self.connect_to(&self.maintenance_db).await?;
        let result = sqlx::query(&statement).execute(&mut conn).await;
        close_quietly(conn).await;
        match result {
            Ok(_) => {
                info!(database = db, owner = owner, "✓ database created");
                Ok(())
            }
            Err(e) if is_duplicate_database(&e) => {
                Err(AppError::DatabaseExistsConflict(db.to_string()))
            }
            Err(e) => Err(AppError::sql(statement, e)),
        }
    }

    async fn rename_database(&self, from: &str, to: &str) -> Result<()> {
        let statement = rename_statement(from, to)?;
        self.execute(&statement).await?;
        info!(from = from, to = to, "✓ database renamed");
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        let statement = "SELECT datname FROM pg_database \
                         WHERE datistemplate = false AND datallowconn = true ORDER BY datname";
        let mut conn = self.connect_to(&self.maintenance_db).await?;
        let result = sqlx::query_scalar::<_, String>(statement)
            .fetch_all(&mut conn)
            .await;
        close_quietly(conn).await;
        result.map_err(|e| AppError::sql(statement, e))
    }

    async fn table_count(&self, db: &str) -> Result<i64> {
        validate_identifier(db)?;
        let statement = "SELECT COUNT(*) FROM information_schema.tables \
                         WHERE table_schema = 'public' AND table_type = 'BASE TABLE'";
        let mut conn = self.connect_to(db).await?;
        let result = sqlx::query_scalar::<_, i64>(statement)
            .fetch_one(&mut conn)
            .await;
        close_quietly(conn).await;
        result.map_err(|e| AppError::sql(statement, e))
    }
}
