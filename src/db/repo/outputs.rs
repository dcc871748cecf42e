//! Cost-basis and valuation operations for the repository.

use sqlx::Row;

use crate::domain::{HolderId, InstrumentId};
use crate::engine::{CostBasisRecord, CostMethod, PositionStatus, ValuationRecord};

use super::{decode_date, decode_datetime, decode_decimal, Repository};

impl Repository {
    /// Upsert the reconstructed cost basis for one pair.
    ///
    /// The record is always written whole; partial patches would break the
    /// invariant that it reflects exactly one reconstruction pass.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert_cost_basis(&self, record: &CostBasisRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO cost_basis
            (instrument_id, holder_id, average_cost, total_invested, total_shares,
             first_acquisition, priced_windows, unpriced_windows, computed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(instrument_id, holder_id) DO UPDATE SET
                average_cost = excluded.average_cost,
                total_invested = excluded.total_invested,
                total_shares = excluded.total_shares,
                first_acquisition = excluded.first_acquisition,
                priced_windows = excluded.priced_windows,
                unpriced_windows = excluded.unpriced_windows,
                computed_at = excluded.computed_at
            "#,
        )
        .bind(record.instrument_id.as_str())
        .bind(record.holder_id.as_str())
        .bind(record.average_cost.to_canonical_string())
        .bind(record.total_invested.to_canonical_string())
        .bind(record.total_shares)
        .bind(record.first_acquisition.map(|d| d.to_string()))
        .bind(record.priced_windows as i64)
        .bind(record.unpriced_windows as i64)
        .bind(record.computed_at.to_rfc3339())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Fetch the stored cost basis for one pair.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_cost_basis(
        &self,
        instrument: &InstrumentId,
        holder: &HolderId,
    ) -> Result<Option<CostBasisRecord>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT instrument_id, holder_id, average_cost, total_invested, total_shares,
                   first_acquisition, priced_windows, unpriced_windows, computed_at
            FROM cost_basis
            WHERE instrument_id = ? AND holder_id = ?
            "#,
        )
        .bind(instrument.as_str())
        .bind(holder.as_str())
        .fetch_optional(self.pool())
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let first_acquisition = match row.get::<Option<String>, _>("first_acquisition") {
            Some(raw) => Some(decode_date(&raw)?),
            None => None,
        };

        Ok(Some(CostBasisRecord {
            instrument_id: InstrumentId::new(row.get::<String, _>("instrument_id")),
            holder_id: HolderId::new(row.get::<String, _>("holder_id")),
            average_cost: decode_decimal(&row.get::<String, _>("average_cost"))?,
            total_invested: decode_decimal(&row.get::<String, _>("total_invested"))?,
            total_shares: row.get::<i64, _>("total_shares"),
            first_acquisition,
            priced_windows: row.get::<i64, _>("priced_windows") as u32,
            unpriced_windows: row.get::<i64, _>("unpriced_windows") as u32,
            computed_at: decode_datetime(&row.get::<String, _>("computed_at"))?,
        }))
    }

    /// Replace one pair's valuation rows wholesale.
    ///
    /// Valuations are regenerated in full on every reconciliation pass, so
    /// the old set is deleted and the new set inserted in one transaction;
    /// concurrent writers for other pairs touch disjoint keys.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn replace_valuation_records(
        &self,
        instrument: &InstrumentId,
        holder: &HolderId,
        records: &[ValuationRecord],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM valuations WHERE instrument_id = ? AND holder_id = ?")
            .bind(instrument.as_str())
            .bind(holder.as_str())
            .execute(&mut *tx)
            .await?;

        for record in records {
            let change_json = serde_json::to_string(&record.change)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

            sqlx::query(
                r#"
                INSERT INTO valuations
                (instrument_id, holder_id, period_end, average_cost, cost_method,
                 current_price, profit_rate, status, change_json, narrative,
                 is_latest, computed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.instrument_id.as_str())
            .bind(record.holder_id.as_str())
            .bind(record.period_end.to_string())
            .bind(record.average_cost.to_canonical_string())
            .bind(record.cost_method.map(|m| m.as_str()))
            .bind(record.current_price.map(|p| p.to_canonical_string()))
            .bind(record.profit_rate.map(|r| r.to_canonical_string()))
            .bind(record.status.as_str())
            .bind(change_json)
            .bind(&record.narrative)
            .bind(record.is_latest as i64)
            .bind(record.computed_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Fetch one pair's valuation rows ordered by period_end.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_valuations(
        &self,
        instrument: &InstrumentId,
        holder: &HolderId,
    ) -> Result<Vec<ValuationRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT instrument_id, holder_id, period_end, average_cost, cost_method,
                   current_price, profit_rate, status, change_json, narrative,
                   is_latest, computed_at
            FROM valuations
            WHERE instrument_id = ? AND holder_id = ?
            ORDER BY period_end ASC
            "#,
        )
        .bind(instrument.as_str())
        .bind(holder.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                let cost_method = row
                    .get::<Option<String>, _>("cost_method")
                    .as_deref()
                    .and_then(CostMethod::parse);

                let current_price = match row.get::<Option<String>, _>("current_price") {
                    Some(raw) => Some(decode_decimal(&raw)?),
                    None => None,
                };
                let profit_rate = match row.get::<Option<String>, _>("profit_rate") {
                    Some(raw) => Some(decode_decimal(&raw)?),
                    None => None,
                };

                let status_raw = row.get::<String, _>("status");
                let status = PositionStatus::parse(&status_raw).ok_or_else(|| {
                    sqlx::Error::Decode(format!("unknown status {:?}", status_raw).into())
                })?;

                let change = serde_json::from_str(&row.get::<String, _>("change_json"))
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

                Ok(ValuationRecord {
                    instrument_id: InstrumentId::new(row.get::<String, _>("instrument_id")),
                    holder_id: HolderId::new(row.get::<String, _>("holder_id")),
                    period_end: decode_date(&row.get::<String, _>("period_end"))?,
                    average_cost: decode_decimal(&row.get::<String, _>("average_cost"))?,
                    cost_method,
                    current_price,
                    profit_rate,
                    status,
                    change,
                    narrative: row.get::<String, _>("narrative"),
                    is_latest: row.get::<i64, _>("is_latest") != 0,
                    computed_at: decode_datetime(&row.get::<String, _>("computed_at"))?,
                })
            })
            .collect()
    }
}
