//! Snapshot and bar operations for the repository.

use chrono::NaiveDate;
use sqlx::Row;

use crate::domain::{DailyBar, Decimal, HolderId, HoldingSnapshot, InstrumentId};

use super::{decode_date, decode_decimal, Repository};

impl Repository {
    /// Insert snapshots idempotently in a single transaction.
    ///
    /// Snapshots are immutable once disclosed: conflicts on the natural key
    /// are ignored, never overwritten. Returns the number of new rows.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_snapshots_batch(
        &self,
        snapshots: &[HoldingSnapshot],
    ) -> Result<usize, sqlx::Error> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool().begin().await?;

        for snapshot in snapshots {
            let result = sqlx::query(
                r#"
                INSERT INTO holding_snapshots (instrument_id, holder_id, period_end, held_quantity)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(instrument_id, holder_id, period_end) DO NOTHING
                "#,
            )
            .bind(snapshot.instrument_id.as_str())
            .bind(snapshot.holder_id.as_str())
            .bind(snapshot.period_end.to_string())
            .bind(snapshot.held_quantity)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// Insert bars idempotently in a single transaction.
    ///
    /// Returns the number of new rows.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_bars_batch(&self, bars: &[DailyBar]) -> Result<usize, sqlx::Error> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool().begin().await?;

        for bar in bars {
            let result = sqlx::query(
                r#"
                INSERT INTO daily_bars
                (instrument_id, trade_date, open, high, low, close, volume, turnover)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(instrument_id, trade_date) DO NOTHING
                "#,
            )
            .bind(bar.instrument_id.as_str())
            .bind(bar.trade_date.to_string())
            .bind(bar.open.to_canonical_string())
            .bind(bar.high.to_canonical_string())
            .bind(bar.low.to_canonical_string())
            .bind(bar.close.to_canonical_string())
            .bind(bar.volume.to_canonical_string())
            .bind(bar.turnover.to_canonical_string())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// All stored snapshots ordered by (instrument, holder, period_end), the
    /// deterministic grouping order the reconciler relies on.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_all_snapshots(&self) -> Result<Vec<HoldingSnapshot>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT instrument_id, holder_id, period_end, held_quantity
            FROM holding_snapshots
            ORDER BY instrument_id ASC, holder_id ASC, period_end ASC
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(HoldingSnapshot {
                    instrument_id: InstrumentId::new(row.get::<String, _>("instrument_id")),
                    holder_id: HolderId::new(row.get::<String, _>("holder_id")),
                    period_end: decode_date(&row.get::<String, _>("period_end"))?,
                    held_quantity: row.get::<i64, _>("held_quantity"),
                })
            })
            .collect()
    }

    /// All bars for one instrument ordered by trade date.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_bars(&self, instrument: &InstrumentId) -> Result<Vec<DailyBar>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT instrument_id, trade_date, open, high, low, close, volume, turnover
            FROM daily_bars
            WHERE instrument_id = ?
            ORDER BY trade_date ASC
            "#,
        )
        .bind(instrument.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DailyBar {
                    instrument_id: InstrumentId::new(row.get::<String, _>("instrument_id")),
                    trade_date: decode_date(&row.get::<String, _>("trade_date"))?,
                    open: decode_decimal(&row.get::<String, _>("open"))?,
                    high: decode_decimal(&row.get::<String, _>("high"))?,
                    low: decode_decimal(&row.get::<String, _>("low"))?,
                    close: decode_decimal(&row.get::<String, _>("close"))?,
                    volume: decode_decimal(&row.get::<String, _>("volume"))?,
                    turnover: decode_decimal(&row.get::<String, _>("turnover"))?,
                })
            })
            .collect()
    }

    /// Most recent stored trade date for an instrument, for incremental
    /// bar fetches.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn latest_trade_date(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Option<NaiveDate>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT MAX(trade_date) AS latest FROM daily_bars WHERE instrument_id = ?",
        )
        .bind(instrument.as_str())
        .fetch_one(self.pool())
        .await?;

        match row.get::<Option<String>, _>("latest") {
            Some(raw) => Ok(Some(decode_date(&raw)?)),
            None => Ok(None),
        }
    }

    /// Close of the most recent stored bar for an instrument.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn latest_close(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Option<Decimal>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT close FROM daily_bars
            WHERE instrument_id = ?
            ORDER BY trade_date DESC
            LIMIT 1
            "#,
        )
        .bind(instrument.as_str())
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(decode_decimal(&row.get::<String, _>("close"))?)),
            None => Ok(None),
        }
    }
}
