//! Update-attempt audit log.

use anyhow::Result;
use chrono::Utc;
use indicator_core::{UpdateStatus, UpdateTrigger};

use crate::models::UpdateAttemptRow;
use crate::AssetStore;

impl AssetStore {
    /// Opens a running attempt and returns its row id.
    pub async fn open_attempt(
        &self,
        asset_id: i64,
        trace_id: &str,
        trigger: UpdateTrigger,
    ) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO update_attempts (asset_id, trace_id, trigger_kind, status, started_at)
             VALUES (?, ?, ?, 'running', ?)
             RETURNING id",
        )
        .bind(asset_id)
        .bind(trace_id)
        .bind(trigger.as_str())
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn complete_attempt(
        &self,
        attempt_id: i64,
        status: UpdateStatus,
        error: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let metadata_json = metadata.map(|m| m.to_string());
        sqlx::query(
            "UPDATE update_attempts
             SET status = ?, error = ?, metadata_json = ?, completed_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(metadata_json)
        .bind(Utc::now().to_rfc3339())
        .bind(attempt_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records an attempt that terminated before any sourcing happened
    /// (auto-update off at the gate).
    pub async fn log_cancelled_attempt(
        &self,
        asset_id: i64,
        trace_id: &str,
        trigger: UpdateTrigger,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO update_attempts
                 (asset_id, trace_id, trigger_kind, status, started_at, completed_at)
             VALUES (?, ?, ?, 'cancelled', ?, ?)
             RETURNING id",
        )
        .bind(asset_id)
        .bind(trace_id)
        .bind(trigger.as_str())
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn attempts_for_asset(
        &self,
        asset_id: i64,
        limit: i64,
    ) -> Result<Vec<UpdateAttemptRow>> {
        let rows = sqlx::query_as::<_, UpdateAttemptRow>(
            "SELECT * FROM update_attempts
             WHERE asset_id = ?
             ORDER BY started_at DESC, id DESC
             LIMIT ?",
        )
        .bind(asset_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// All attempts that shared one trace, oldest first. Batch members
    /// reuse the batch trace id, so this reconstructs a whole run.
    pub async fn attempts_by_trace(&self, trace_id: &str) -> Result<Vec<UpdateAttemptRow>> {
        let rows = sqlx::query_as::<_, UpdateAttemptRow>(
            "SELECT * FROM update_attempts
             WHERE trace_id = ?
             ORDER BY started_at ASC, id ASC",
        )
        .bind(trace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
