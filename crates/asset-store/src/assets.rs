//! Asset registry and update-health bookkeeping.

use anyhow::Result;
use chrono::{Duration, Utc};

use crate::models::AssetRecord;
use crate::AssetStore;

impl AssetStore {
    /// Registers (or refreshes) an asset. New assets start active with
    /// auto-update on and a clean retry counter.
    pub async fn register_asset(
        &self,
        ticker: &str,
        name: Option<&str>,
        sector: Option<&str>,
    ) -> Result<i64> {
        let ticker = ticker.trim().to_uppercase();
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO assets (ticker, name, sector) VALUES (?, ?, ?)
             ON CONFLICT(ticker) DO UPDATE SET
                 name = COALESCE(excluded.name, assets.name),
                 sector = COALESCE(excluded.sector, assets.sector)
             RETURNING id",
        )
        .bind(&ticker)
        .bind(name)
        .bind(sector)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn find_by_ticker(&self, ticker: &str) -> Result<Option<AssetRecord>> {
        let record = sqlx::query_as::<_, AssetRecord>("SELECT * FROM assets WHERE ticker = ?")
            .bind(ticker.trim().to_uppercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Splits tickers into known assets and unknown symbols, preserving
    /// request order.
    pub async fn resolve_tickers(
        &self,
        tickers: &[String],
    ) -> Result<(Vec<AssetRecord>, Vec<String>)> {
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for ticker in tickers {
            match self.find_by_ticker(ticker).await? {
                Some(record) => known.push(record),
                None => unknown.push(ticker.clone()),
            }
        }
        Ok((known, unknown))
    }

    /// Marks a successful refresh: timestamp bumped, error cleared, retry
    /// counter reset.
    pub async fn record_success(&self, asset_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE assets SET
                 last_updated = ?,
                 last_update_status = 'success',
                 last_update_error = NULL,
                 retry_count = 0
             WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(asset_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks a failed attempt and returns the stored retry count.
    ///
    /// The counter wraps to zero when it reaches `max_retry_count`, keeping
    /// the asset in rotation; auto-update is never switched off here.
    pub async fn record_failure(
        &self,
        asset_id: i64,
        error: &str,
        max_retry_count: i64,
    ) -> Result<i64> {
        let (current,): (i64,) = sqlx::query_as("SELECT retry_count FROM assets WHERE id = ?")
            .bind(asset_id)
            .fetch_one(&self.pool)
            .await?;

        let mut next = current + 1;
        if next >= max_retry_count {
            next = 0;
        }

        sqlx::query(
            "UPDATE assets SET
                 last_update_status = 'failed',
                 last_update_error = ?,
                 retry_count = ?
             WHERE id = ?",
        )
        .bind(error)
        .bind(next)
        .bind(asset_id)
        .execute(&self.pool)
        .await?;
        Ok(next)
    }

    /// Marks a cancelled attempt. Retry counter, timestamp and last error
    /// are left as they were.
    pub async fn record_cancelled(&self, asset_id: i64) -> Result<()> {
        sqlx::query("UPDATE assets SET last_update_status = 'cancelled' WHERE id = ?")
            .bind(asset_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Failed assets still worth retrying automatically.
    pub async fn retry_candidates(&self, max_retry_count: i64) -> Result<Vec<AssetRecord>> {
        let records = sqlx::query_as::<_, AssetRecord>(
            "SELECT * FROM assets
             WHERE last_update_status = 'failed'
               AND retry_count < ?
               AND auto_update_enabled = 1
               AND is_active = 1
             ORDER BY ticker",
        )
        .bind(max_retry_count)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Active assets that were never refreshed, are stale past the
    /// threshold, or sit in a failed state. The auto-update flag is not
    /// filtered here; disabled assets terminate as cancelled downstream.
    pub async fn outdated_candidates(&self, threshold_days: i64) -> Result<Vec<AssetRecord>> {
        let cutoff = Utc::now() - Duration::days(threshold_days);
        let records = sqlx::query_as::<_, AssetRecord>(
            "SELECT * FROM assets
             WHERE is_active = 1
               AND (last_updated IS NULL
                    OR last_updated < ?
                    OR last_update_status = 'failed')
             ORDER BY ticker",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Tickers of active, auto-update-enabled assets in a sector
    /// (case-insensitive match).
    pub async fn sector_tickers(&self, sector: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT ticker FROM assets
             WHERE sector = ? COLLATE NOCASE
               AND is_active = 1
               AND auto_update_enabled = 1
             ORDER BY ticker",
        )
        .bind(sector)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> AssetStore {
        AssetStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn register_normalizes_and_upserts() {
        let store = store().await;
        let first = store
            .register_asset(" petr4 ", Some("Petrobras PN"), Some("Petroleo"))
            .await
            .unwrap();
        let second = store.register_asset("PETR4", None, None).await.unwrap();
        assert_eq!(first, second);

        let record = store.find_by_ticker("petr4").await.unwrap().unwrap();
        assert_eq!(record.ticker, "PETR4");
        // COALESCE keeps the original name when re-registering with None.
        assert_eq!(record.name.as_deref(), Some("Petrobras PN"));
        assert!(record.is_active);
        assert!(record.auto_update_enabled);
        assert_eq!(record.retry_count, 0);
    }

    #[tokio::test]
    async fn resolve_splits_known_and_unknown() {
        let store = store().await;
        store.register_asset("PETR4", None, None).await.unwrap();
        store.register_asset("VALE3", None, None).await.unwrap();

        let request = vec![
            "PETR4".to_string(),
            "NOPE11".to_string(),
            "VALE3".to_string(),
        ];
        let (known, unknown) = store.resolve_tickers(&request).await.unwrap();
        let known: Vec<&str> = known.iter().map(|a| a.ticker.as_str()).collect();
        assert_eq!(known, vec!["PETR4", "VALE3"]);
        assert_eq!(unknown, vec!["NOPE11".to_string()]);
    }

    #[tokio::test]
    async fn failure_counter_wraps_at_max_and_never_disables_auto_update() {
        let store = store().await;
        let id = store.register_asset("PETR4", None, None).await.unwrap();

        assert_eq!(store.record_failure(id, "scrape blocked", 3).await.unwrap(), 1);
        assert_eq!(store.record_failure(id, "scrape blocked", 3).await.unwrap(), 2);
        // Third failure reaches the max and wraps to zero.
        assert_eq!(store.record_failure(id, "scrape blocked", 3).await.unwrap(), 0);

        let record = store.find_by_ticker("PETR4").await.unwrap().unwrap();
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.last_update_status.as_deref(), Some("failed"));
        assert!(record.auto_update_enabled, "auto-update must stay on");
        assert!(record.last_updated.is_none());
    }

    #[tokio::test]
    async fn success_clears_failure_state() {
        let store = store().await;
        let id = store.register_asset("VALE3", None, None).await.unwrap();
        store.record_failure(id, "timeout", 3).await.unwrap();

        store.record_success(id).await.unwrap();
        let record = store.find_by_ticker("VALE3").await.unwrap().unwrap();
        assert_eq!(record.last_update_status.as_deref(), Some("success"));
        assert_eq!(record.retry_count, 0);
        assert!(record.last_update_error.is_none());
        assert!(record.last_updated.is_some());
    }

    #[tokio::test]
    async fn cancelled_touches_only_the_status() {
        let store = store().await;
        let id = store.register_asset("WEGE3", None, None).await.unwrap();
        store.record_failure(id, "timeout", 3).await.unwrap();

        store.record_cancelled(id).await.unwrap();
        let record = store.find_by_ticker("WEGE3").await.unwrap().unwrap();
        assert_eq!(record.last_update_status.as_deref(), Some("cancelled"));
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.last_update_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn health_view_parses_row_state() {
        use indicator_core::UpdateStatus;

        let store = store().await;
        let id = store.register_asset("PETR4", None, None).await.unwrap();

        let fresh = store.find_by_ticker("PETR4").await.unwrap().unwrap();
        let health = fresh.health();
        assert!(health.last_update_status.is_none());
        assert!(health.last_updated.is_none());
        assert!(health.auto_update_enabled);
        assert_eq!(health.retry_count, 0);

        store.record_failure(id, "scrape blocked", 3).await.unwrap();
        let health = store
            .find_by_ticker("PETR4")
            .await
            .unwrap()
            .unwrap()
            .health();
        assert_eq!(health.last_update_status, Some(UpdateStatus::Failed));
        assert_eq!(health.last_update_error.as_deref(), Some("scrape blocked"));
        assert_eq!(health.retry_count, 1);
        assert!(health.auto_update_enabled);
    }

    #[tokio::test]
    async fn retry_candidates_filter_disabled_and_exhausted() {
        let store = store().await;
        let eligible = store.register_asset("PETR4", None, None).await.unwrap();
        let disabled = store.register_asset("VALE3", None, None).await.unwrap();
        let inactive = store.register_asset("OIBR3", None, None).await.unwrap();
        let healthy = store.register_asset("WEGE3", None, None).await.unwrap();

        store.record_failure(eligible, "x", 3).await.unwrap();
        store.record_failure(disabled, "x", 3).await.unwrap();
        store.record_failure(inactive, "x", 3).await.unwrap();
        store.record_success(healthy).await.unwrap();

        sqlx::query("UPDATE assets SET auto_update_enabled = 0 WHERE id = ?")
            .bind(disabled)
            .execute(store.pool())
            .await
            .unwrap();
        sqlx::query("UPDATE assets SET is_active = 0 WHERE id = ?")
            .bind(inactive)
            .execute(store.pool())
            .await
            .unwrap();

        let candidates = store.retry_candidates(3).await.unwrap();
        let tickers: Vec<&str> = candidates.iter().map(|a| a.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["PETR4"]);
    }

    #[tokio::test]
    async fn outdated_candidates_cover_stale_never_updated_and_failed() {
        let store = store().await;
        let never = store.register_asset("AAAA3", None, None).await.unwrap();
        let stale = store.register_asset("BBBB3", None, None).await.unwrap();
        let fresh = store.register_asset("CCCC3", None, None).await.unwrap();
        let failed = store.register_asset("DDDD3", None, None).await.unwrap();

        store.record_success(stale).await.unwrap();
        store.record_success(fresh).await.unwrap();
        store.record_failure(failed, "x", 3).await.unwrap();
        let _ = never;

        let old = (Utc::now() - Duration::days(30)).to_rfc3339();
        sqlx::query("UPDATE assets SET last_updated = ? WHERE id = ?")
            .bind(&old)
            .bind(stale)
            .execute(store.pool())
            .await
            .unwrap();

        let candidates = store.outdated_candidates(7).await.unwrap();
        let tickers: Vec<&str> = candidates.iter().map(|a| a.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAAA3", "BBBB3", "DDDD3"]);
    }

    #[tokio::test]
    async fn sector_lookup_is_case_insensitive_and_skips_inactive_or_disabled() {
        let store = store().await;
        store
            .register_asset("PETR4", None, Some("Petroleo"))
            .await
            .unwrap();
        store
            .register_asset("PRIO3", None, Some("petroleo"))
            .await
            .unwrap();
        let retired = store
            .register_asset("OIBR3", None, Some("Petroleo"))
            .await
            .unwrap();
        let opted_out = store
            .register_asset("RRRP3", None, Some("Petroleo"))
            .await
            .unwrap();
        store.register_asset("WEGE3", None, Some("Bens")).await.unwrap();

        sqlx::query("UPDATE assets SET is_active = 0 WHERE id = ?")
            .bind(retired)
            .execute(store.pool())
            .await
            .unwrap();
        sqlx::query("UPDATE assets SET auto_update_enabled = 0 WHERE id = ?")
            .bind(opted_out)
            .execute(store.pool())
            .await
            .unwrap();

        let tickers = store.sector_tickers("PETROLEO").await.unwrap();
        assert_eq!(tickers, vec!["PETR4".to_string(), "PRIO3".to_string()]);
    }
}
