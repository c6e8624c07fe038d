//! Portfolio and holding management.

use anyhow::Result;

use crate::models::PortfolioRow;
use crate::AssetStore;

impl AssetStore {
    pub async fn create_portfolio(&self, name: &str) -> Result<i64> {
        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO portfolios (name) VALUES (?) RETURNING id")
                .bind(name.trim())
                .fetch_one(&self.pool)
                .await?;
        Ok(id)
    }

    pub async fn find_portfolio(&self, portfolio_id: i64) -> Result<Option<PortfolioRow>> {
        let row = sqlx::query_as::<_, PortfolioRow>("SELECT * FROM portfolios WHERE id = ?")
            .bind(portfolio_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Adds a ticker to a portfolio; duplicates are ignored.
    pub async fn add_holding(&self, portfolio_id: i64, ticker: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO portfolio_holdings (portfolio_id, ticker) VALUES (?, ?)
             ON CONFLICT(portfolio_id, ticker) DO NOTHING",
        )
        .bind(portfolio_id)
        .bind(ticker.trim().to_uppercase())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Distinct tickers held in a portfolio. `None` when the portfolio does
    /// not exist (as opposed to existing empty).
    pub async fn portfolio_tickers(&self, portfolio_id: i64) -> Result<Option<Vec<String>>> {
        if self.find_portfolio(portfolio_id).await?.is_none() {
            return Ok(None);
        }
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT ticker FROM portfolio_holdings
             WHERE portfolio_id = ?
             ORDER BY ticker",
        )
        .bind(portfolio_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(rows.into_iter().map(|(t,)| t).collect()))
    }
}
