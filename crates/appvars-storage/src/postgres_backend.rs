//! PostgreSQL storage backend.
//!
//! Variables live in the `variable` table and snapshots in `variable_audit`,
//! both keyed by the owning row of the external `application` table. Every
//! mutation and its `last_modified` bump run in one transaction; dropping an
//! uncommitted `Transaction` rolls it back.
//!
//! Feature-gated behind `postgres-backend`. Uses `sqlx` with the Tokio
//! runtime for fully async operations.

use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{PgPool, Transaction};
use uuid::Uuid;

use crate::{
    ApplicationScope, AuditRow, StorageBackend, StorageError, VariableRow, VariableWrite,
};

/// Schema statements, applied in order on connect. All are idempotent.
///
/// The `application` table belongs to the surrounding service; it is created
/// here only if missing so a fresh database is usable.
const MIGRATIONS: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS application (
        id            UUID        PRIMARY KEY DEFAULT gen_random_uuid(),
        project_key   TEXT        NOT NULL,
        name          TEXT        NOT NULL,
        last_modified TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (project_key, name)
    )",
    r"CREATE TABLE IF NOT EXISTS variable (
        id             UUID  PRIMARY KEY DEFAULT gen_random_uuid(),
        application_id UUID  NOT NULL REFERENCES application (id) ON DELETE CASCADE,
        var_name       TEXT  NOT NULL,
        var_value      TEXT,
        cipher_value   BYTEA NOT NULL DEFAULT ''::bytea,
        var_type       TEXT  NOT NULL,
        UNIQUE (application_id, var_name)
    )",
    r"CREATE TABLE IF NOT EXISTS variable_audit (
        id             UUID        PRIMARY KEY DEFAULT gen_random_uuid(),
        application_id UUID        NOT NULL REFERENCES application (id) ON DELETE CASCADE,
        versioned      TIMESTAMPTZ NOT NULL DEFAULT now(),
        data           TEXT        NOT NULL,
        author         TEXT        NOT NULL
    )",
    r"CREATE INDEX IF NOT EXISTS idx_variable_audit_application_versioned
        ON variable_audit (application_id, versioned DESC)",
];

const VARIABLE_COLUMNS: &str =
    "id, var_name AS name, var_value AS clear_value, cipher_value, var_type";

/// A storage backend backed by PostgreSQL.
///
/// Thread-safe via `PgPool` (connection pool). All operations are fully async.
///
/// # Examples
///
/// ```no_run
/// # use appvars_storage::PostgresBackend;
/// # #[tokio::main]
/// # async fn main() {
/// let backend = PostgresBackend::connect("postgres://localhost/appvars").await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("pool", &"[PgPool]")
            .finish_non_exhaustive()
    }
}

/// Classify a driver error. Unique violations are recognized by their
/// SQLSTATE class, never by message text.
fn classify(operation: &str, err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.kind() == ErrorKind::UniqueViolation => {
            StorageError::UniqueViolation {
                constraint: db_err.constraint().unwrap_or("unknown").to_owned(),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StorageError::Corrupt {
            reason: format!("{operation}: {err}"),
        },
        _ => StorageError::Query {
            operation: operation.to_owned(),
            reason: err.to_string(),
        },
    }
}

fn tx_error(err: sqlx::Error) -> StorageError {
    StorageError::Transaction {
        reason: err.to_string(),
    }
}

impl PostgresBackend {
    /// Connect to PostgreSQL and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the connection or migration fails.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Open {
                target: "[redacted database url]".to_owned(),
                reason: e.to_string(),
            })?;

        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    /// Wrap an existing pool without running migrations.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the schema statements.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if any statement fails.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Open {
                    target: "[redacted database url]".to_owned(),
                    reason: format!("migration failed: {e}"),
                })?;
        }
        tracing::debug!(statements = MIGRATIONS.len(), "variable schema up to date");
        Ok(())
    }

    /// Return a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StorageError> {
        self.pool.begin().await.map_err(tx_error)
    }

    async fn touch(
        tx: &mut Transaction<'static, Postgres>,
        application_id: Uuid,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE application SET last_modified = clock_timestamp() WHERE id = $1")
            .bind(application_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| classify("bump last_modified", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageBackend for PostgresBackend {
    async fn resolve_application(
        &self,
        scope: &ApplicationScope,
    ) -> Result<Option<Uuid>, StorageError> {
        let id: Option<Uuid> = match scope {
            ApplicationScope::Id(id) => {
                sqlx::query_scalar::<_, Uuid>("SELECT id FROM application WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
            }
            ApplicationScope::Name {
                project_key,
                application,
            } => {
                sqlx::query_scalar::<_, Uuid>(
                    "SELECT id FROM application WHERE project_key = $1 AND name = $2",
                )
                .bind(project_key)
                .bind(application)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(|e| classify("resolve application", e))?;

        Ok(id)
    }

    async fn last_modified(
        &self,
        application_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        sqlx::query_scalar::<_, DateTime<Utc>>("SELECT last_modified FROM application WHERE id = $1")
            .bind(application_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify("read last_modified", e))
    }

    async fn list_variables(&self, application_id: Uuid) -> Result<Vec<VariableRow>, StorageError> {
        sqlx::query_as::<_, VariableRow>(&format!(
            "SELECT {VARIABLE_COLUMNS} FROM variable WHERE application_id = $1 ORDER BY var_name"
        ))
        .bind(application_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("list variables", e))
    }

    async fn get_variable(
        &self,
        application_id: Uuid,
        name: &str,
    ) -> Result<Option<VariableRow>, StorageError> {
        sqlx::query_as::<_, VariableRow>(&format!(
            "SELECT {VARIABLE_COLUMNS} FROM variable WHERE application_id = $1 AND var_name = $2"
        ))
        .bind(application_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify("load variable", e))
    }

    async fn insert_variable(
        &self,
        application_id: Uuid,
        row: &VariableWrite,
    ) -> Result<VariableRow, StorageError> {
        let mut tx = self.begin().await?;

        let stored = sqlx::query_as::<_, VariableRow>(&format!(
            r"INSERT INTO variable (application_id, var_name, var_value, cipher_value, var_type)
              VALUES ($1, $2, $3, $4, $5)
              RETURNING {VARIABLE_COLUMNS}"
        ))
        .bind(application_id)
        .bind(&row.name)
        .bind(row.clear_value.as_deref())
        .bind(&row.cipher_value)
        .bind(&row.var_type)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify("insert variable", e))?;

        Self::touch(&mut tx, application_id).await?;
        tx.commit().await.map_err(tx_error)?;

        Ok(stored)
    }

    async fn update_variable(
        &self,
        application_id: Uuid,
        row: &VariableWrite,
    ) -> Result<u64, StorageError> {
        let mut tx = self.begin().await?;

        let result = sqlx::query(
            r"UPDATE variable
              SET var_value = $1, cipher_value = $2, var_type = $3
              WHERE application_id = $4 AND var_name = $5",
        )
        .bind(row.clear_value.as_deref())
        .bind(&row.cipher_value)
        .bind(&row.var_type)
        .bind(application_id)
        .bind(&row.name)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify("update variable", e))?;

        if result.rows_affected() == 0 {
            return Ok(0);
        }

        Self::touch(&mut tx, application_id).await?;
        tx.commit().await.map_err(tx_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_variable(&self, application_id: Uuid, name: &str) -> Result<u64, StorageError> {
        let mut tx = self.begin().await?;

        let result = sqlx::query("DELETE FROM variable WHERE application_id = $1 AND var_name = $2")
            .bind(application_id)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify("delete variable", e))?;

        if result.rows_affected() == 0 {
            return Ok(0);
        }

        Self::touch(&mut tx, application_id).await?;
        tx.commit().await.map_err(tx_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_all_variables(&self, application_id: Uuid) -> Result<u64, StorageError> {
        let mut tx = self.begin().await?;

        let result = sqlx::query("DELETE FROM variable WHERE application_id = $1")
            .bind(application_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify("delete all variables", e))?;

        Self::touch(&mut tx, application_id).await?;
        tx.commit().await.map_err(tx_error)?;

        Ok(result.rows_affected())
    }

    async fn insert_audit(
        &self,
        application_id: Uuid,
        author: &str,
        data: &str,
    ) -> Result<AuditRow, StorageError> {
        sqlx::query_as::<_, AuditRow>(
            r"INSERT INTO variable_audit (application_id, versioned, data, author)
              VALUES ($1, clock_timestamp(), $2, $3)
              RETURNING id, application_id, versioned, data, author",
        )
        .bind(application_id)
        .bind(data)
        .bind(author)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify("insert audit", e))
    }

    async fn get_audit(
        &self,
        application_id: Uuid,
        audit_id: Uuid,
    ) -> Result<Option<AuditRow>, StorageError> {
        sqlx::query_as::<_, AuditRow>(
            r"SELECT id, application_id, versioned, data, author
              FROM variable_audit
              WHERE id = $1 AND application_id = $2",
        )
        .bind(audit_id)
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify("load audit", e))
    }

    async fn list_audits(&self, application_id: Uuid) -> Result<Vec<AuditRow>, StorageError> {
        sqlx::query_as::<_, AuditRow>(
            r"SELECT id, application_id, versioned, data, author
              FROM variable_audit
              WHERE application_id = $1
              ORDER BY versioned DESC, id",
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("list audits", e))
    }
}
