//! Indicator snapshot persistence. Snapshots are append-only; the latest
//! one is the asset's current indicator set.

use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use indicator_core::ConsensusRecord;

use crate::models::{FieldProvenance, SnapshotRow};
use crate::AssetStore;

impl AssetStore {
    /// Persists a consensus record alongside its sanitized field values.
    ///
    /// `fields` holds the values that survived sanitization; provenance is
    /// kept for every resolved field, including ones sanitization dropped.
    pub async fn save_snapshot(
        &self,
        asset_id: i64,
        record: &ConsensusRecord,
        fields: &HashMap<String, f64>,
        reference_date: NaiveDate,
    ) -> Result<i64> {
        let provenance: HashMap<&str, FieldProvenance> = record
            .fields
            .iter()
            .map(|(field, fc)| (field.as_str(), FieldProvenance::from(fc)))
            .collect();

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO indicator_snapshots
                 (asset_id, reference_date, fields_json, provenance_json,
                  sources_used, sources_count, confidence)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(asset_id)
        .bind(reference_date.to_string())
        .bind(serde_json::to_string(fields)?)
        .bind(serde_json::to_string(&provenance)?)
        .bind(record.sources_used.join(","))
        .bind(record.sources_count as i64)
        .bind(record.confidence)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn latest_snapshot(&self, asset_id: i64) -> Result<Option<SnapshotRow>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM indicator_snapshots
             WHERE asset_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn snapshot_history(&self, asset_id: i64, limit: i64) -> Result<Vec<SnapshotRow>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM indicator_snapshots
             WHERE asset_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(asset_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
