//! SQLite storage implementation
//!
//! Persistent storage for pending flows and integrations using SQLite.
//! Authentication and settings are stored as JSON text columns.

use super::*;
use crate::error::StorageError;
use crate::model::Provider;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// SQLite storage backend
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage
    ///
    /// # Arguments
    /// * `dsn` - Database path (e.g., "~/.pm33/connect.db" or ":memory:" for in-memory)
    pub async fn new(dsn: &str) -> Result<Self> {
        let file_path = dsn.strip_prefix("sqlite:").unwrap_or(dsn);

        if file_path.contains("..") {
            return Err(ConnectError::config(
                "Database path cannot contain '..' (path traversal not allowed)",
            ));
        }

        let in_memory = file_path == ":memory:";

        let base_options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = Path::new(file_path).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }

            SqliteConnectOptions::new()
                .filename(file_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        let options = base_options
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .foreign_keys(true);

        // An in-memory database exists per connection, so keep exactly one alive
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            StorageError::Connection(format!("Failed to connect to SQLite: {}", e))
        })?;

        sqlx::migrate!("./migrations/sqlite").run(&pool).await?;

        Ok(Self { pool })
    }

    fn parse_pending_flow(row: &SqliteRow) -> Result<PendingFlow> {
        Ok(PendingFlow {
            state: row.try_get("state")?,
            provider: parse_provider(&row.try_get::<String, _>("provider")?)?,
            code_verifier: row.try_get("code_verifier")?,
            created_at: parse_timestamp(row.try_get("created_at")?)?,
        })
    }

    fn parse_integration(row: &SqliteRow) -> Result<Integration> {
        Ok(Integration {
            id: row.try_get("id")?,
            provider: parse_provider(&row.try_get::<String, _>("provider")?)?,
            display_name: row.try_get("display_name")?,
            authentication: parse_json(&row.try_get::<String, _>("authentication")?)?,
            settings: parse_json(&row.try_get::<String, _>("settings")?)?,
            status: parse_status(&row.try_get::<String, _>("status")?)?,
            simulated: row.try_get::<i64, _>("simulated")? != 0,
            created_at: parse_timestamp(row.try_get("created_at")?)?,
        })
    }
}

fn parse_provider(value: &str) -> Result<Provider> {
    value
        .parse()
        .map_err(|_| StorageError::Corrupt(format!("unknown provider '{}'", value)).into())
}

fn parse_status(value: &str) -> Result<IntegrationStatus> {
    match value {
        "pending" => Ok(IntegrationStatus::Pending),
        "ready" => Ok(IntegrationStatus::Ready),
        "error" => Ok(IntegrationStatus::Error),
        "disabled" => Ok(IntegrationStatus::Disabled),
        other => Err(StorageError::Corrupt(format!("unknown status '{}'", other)).into()),
    }
}

fn parse_timestamp(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Corrupt(format!("invalid timestamp {}", millis)).into())
}

fn parse_json<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| StorageError::Corrupt(format!("invalid JSON column: {}", e)).into())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| StorageError::Database(format!("failed to encode JSON column: {}", e)).into())
}

#[async_trait]
impl PendingFlowStore for SqliteStorage {
    async fn put_pending_flow(&self, flow: &PendingFlow) -> Result<()> {
        sqlx::query(
            "INSERT INTO pending_flows (state, provider, code_verifier, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(state) DO UPDATE SET
                provider = excluded.provider,
                code_verifier = excluded.code_verifier,
                created_at = excluded.created_at",
        )
        .bind(&flow.state)
        .bind(flow.provider.as_str())
        .bind(&flow.code_verifier)
        .bind(flow.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_pending_flow(&self, state: &str) -> Result<Option<PendingFlow>> {
        let row = sqlx::query(
            "SELECT state, provider, code_verifier, created_at FROM pending_flows WHERE state = ?",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_pending_flow).transpose()
    }

    async fn take_pending_flow(&self, state: &str) -> Result<Option<PendingFlow>> {
        // DELETE ... RETURNING is a single atomic statement (SQLite 3.35+)
        let row = sqlx::query(
            "DELETE FROM pending_flows WHERE state = ?
             RETURNING state, provider, code_verifier, created_at",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_pending_flow).transpose()
    }

    async fn delete_pending_flow(&self, state: &str) -> Result<()> {
        sqlx::query("DELETE FROM pending_flows WHERE state = ?")
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expire_pending_flows(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query("DELETE FROM pending_flows WHERE created_at <= ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl IntegrationStore for SqliteStorage {
    async fn save_integration(&self, integration: &Integration) -> Result<()> {
        sqlx::query(
            "INSERT INTO integrations
                (id, provider, display_name, authentication, settings, status, simulated, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                provider = excluded.provider,
                display_name = excluded.display_name,
                authentication = excluded.authentication,
                settings = excluded.settings,
                status = excluded.status,
                simulated = excluded.simulated,
                created_at = excluded.created_at",
        )
        .bind(&integration.id)
        .bind(integration.provider.as_str())
        .bind(&integration.display_name)
        .bind(to_json(&integration.authentication)?)
        .bind(to_json(&integration.settings)?)
        .bind(integration.status.as_str())
        .bind(integration.simulated as i64)
        .bind(integration.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_integrations(&self) -> Result<Vec<Integration>> {
        let rows = sqlx::query(
            "SELECT id, provider, display_name, authentication, settings, status, simulated, created_at
             FROM integrations ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_integration).collect()
    }

    async fn get_integration(&self, id: &str) -> Result<Option<Integration>> {
        let row = sqlx::query(
            "SELECT id, provider, display_name, authentication, settings, status, simulated, created_at
             FROM integrations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_integration).transpose()
    }

    async fn remove_integration(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM integrations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_integration_credentials(
        &self,
        id: &str,
        authentication: &Authentication,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE integrations SET authentication = ? WHERE id = ?")
            .bind(to_json(authentication)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_integration_status(&self, id: &str, status: IntegrationStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE integrations SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
