use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{AuditExport, AuditStore, CorrectionRecord, EscalationDecision};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed audit log
#[derive(Clone)]
pub struct SqliteAuditLog {
    pool: SqlitePool,
}

impl SqliteAuditLog {
    /// Create a new SQLite audit log
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let log = Self { pool };
        log.run_migrations().await?;

        Ok(log)
    }

    /// In-memory log for tests. Single connection: each in-memory SQLite
    /// connection is its own database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
                StorageError::Connection {
                    message: format!("Invalid database URL: {}", e),
                }
            })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let log = Self { pool };
        log.run_migrations().await?;

        Ok(log)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running audit log migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Audit log migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct DecisionRow {
    id: String,
    conversation_id: String,
    tier: String,
    action: String,
    rationale: String,
    channel: Option<String>,
    handoff_status: String,
    created_at: String,
}

impl From<DecisionRow> for EscalationDecision {
    fn from(row: DecisionRow) -> Self {
        EscalationDecision {
            id: row.id,
            conversation_id: row.conversation_id,
            tier: row.tier.parse().unwrap_or_default(),
            action: row.action.parse().unwrap_or_default(),
            rationale: serde_json::from_str(&row.rationale).unwrap_or_default(),
            channel: row.channel,
            handoff_status: row.handoff_status.parse().unwrap_or_default(),
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CorrectionRow {
    id: String,
    decision_id: String,
    reason: String,
    created_at: String,
}

impl From<CorrectionRow> for CorrectionRecord {
    fn from(row: CorrectionRow) -> Self {
        CorrectionRecord {
            id: row.id,
            decision_id: row.decision_id,
            reason: row.reason,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const DECISION_COLUMNS: &str =
    "id, conversation_id, tier, action, rationale, channel, handoff_status, created_at";

#[async_trait]
impl AuditStore for SqliteAuditLog {
    async fn append_decision(&self, decision: &EscalationDecision) -> StorageResult<()> {
        let rationale = serde_json::to_string(&decision.rationale).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO escalation_decisions
                (id, conversation_id, tier, action, rationale, channel, handoff_status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&decision.id)
        .bind(&decision.conversation_id)
        .bind(decision.tier.to_string())
        .bind(decision.action.to_string())
        .bind(&rationale)
        .bind(&decision.channel)
        .bind(decision.handoff_status.to_string())
        .bind(decision.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_correction(&self, correction: &CorrectionRecord) -> StorageResult<()> {
        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM escalation_decisions WHERE id = ?")
                .bind(&correction.decision_id)
                .fetch_optional(&self.pool)
                .await?;

        if exists.is_none() {
            return Err(StorageError::DecisionNotFound {
                decision_id: correction.decision_id.clone(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO corrections (id, decision_id, reason, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&correction.id)
        .bind(&correction.decision_id)
        .bind(&correction.reason)
        .bind(correction.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_decision(&self, id: &str) -> StorageResult<Option<EscalationDecision>> {
        let row: Option<DecisionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM escalation_decisions WHERE id = ?",
            DECISION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn recent_decisions(&self, limit: usize) -> StorageResult<Vec<EscalationDecision>> {
        let rows: Vec<DecisionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM escalation_decisions ORDER BY seq DESC LIMIT ?",
            DECISION_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn conversation_decisions(
        &self,
        conversation_id: &str,
    ) -> StorageResult<Vec<EscalationDecision>> {
        let rows: Vec<DecisionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM escalation_decisions WHERE conversation_id = ? ORDER BY seq ASC",
            DECISION_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn decision_corrections(
        &self,
        decision_id: &str,
    ) -> StorageResult<Vec<CorrectionRecord>> {
        let rows: Vec<CorrectionRow> = sqlx::query_as(
            r#"
            SELECT id, decision_id, reason, created_at
            FROM corrections
            WHERE decision_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(decision_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn count_decisions(&self) -> StorageResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM escalation_decisions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn export(&self) -> StorageResult<AuditExport> {
        let decisions: Vec<DecisionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM escalation_decisions ORDER BY seq ASC",
            DECISION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let corrections: Vec<CorrectionRow> = sqlx::query_as(
            "SELECT id, decision_id, reason, created_at FROM corrections ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(AuditExport {
            decisions: decisions.into_iter().map(|r| r.into()).collect(),
            corrections: corrections.into_iter().map(|r| r.into()).collect(),
        })
    }

    async fn import(&self, export: &AuditExport) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::Import {
            message: format!("Failed to begin import transaction: {}", e),
        })?;

        for decision in &export.decisions {
            let rationale = serde_json::to_string(&decision.rationale).unwrap_or_default();
            sqlx::query(
                r#"
                INSERT INTO escalation_decisions
                    (id, conversation_id, tier, action, rationale, channel, handoff_status, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&decision.id)
            .bind(&decision.conversation_id)
            .bind(decision.tier.to_string())
            .bind(decision.action.to_string())
            .bind(&rationale)
            .bind(&decision.channel)
            .bind(decision.handoff_status.to_string())
            .bind(decision.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Import {
                message: format!("Failed to import decision {}: {}", decision.id, e),
            })?;
        }

        for correction in &export.corrections {
            sqlx::query(
                r#"
                INSERT INTO corrections (id, decision_id, reason, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&correction.id)
            .bind(&correction.decision_id)
            .bind(&correction.reason)
            .bind(correction.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Import {
                message: format!("Failed to import correction {}: {}", correction.id, e),
            })?;
        }

        tx.commit().await.map_err(|e| StorageError::Import {
            message: format!("Failed to commit import: {}", e),
        })?;

        info!(
            decisions = export.decisions.len(),
            corrections = export.corrections.len(),
            "Audit log import completed"
        );
        Ok(())
    }
}
