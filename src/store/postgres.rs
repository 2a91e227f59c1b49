//! # store::postgres — PostgreSQL Position Store
//!
//! Durable mode.  Uses `sqlx` runtime queries against one `positions` table.
//!
//! ## Setup
//! 1. Create a database and set `DATABASE_URL` in `.env`
//! 2. Build with `--features postgres` and `DRY_RUN=false`
//! 3. The migration in `migrations/001_init.sql` is applied on startup

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, types::Json, Executor, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use super::{CloseOutcome, PositionStore, StoreError};
use crate::engine::cluster::ClusterResult;
use crate::models::{
    position::POSITION_QUANTITY, ExitReason, Position, PositionDraft, PositionStatus, PositionType,
};

const MIGRATION: &str = include_str!("../../migrations/001_init.sql");

const COLUMNS: &str = r#"
    id, symbol, status, position_type, quantity, entry_price, entry_time,
    entry_indicators, cluster_info_at_entry, reference_indicator_at_entry,
    exit_price, exit_time, exit_reason, profit_loss, created_at, updated_at
"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and apply the embedded migration.  Any failure here is fatal
    /// for the process — there is no point running without the store.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("Connecting to PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(unavailable)?;

        pool.execute(MIGRATION).await.map_err(unavailable)?;

        info!("✅ PostgreSQL connected and migrations applied");
        Ok(Self { pool })
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl PositionStore for PgStore {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn open_position(&self, draft: PositionDraft) -> Result<Position, StoreError> {
        let id  = Uuid::new_v4();
        let now = Utc::now();

        let sql = format!(
            r#"
            INSERT INTO positions
              (id, symbol, status, position_type, quantity, entry_price, entry_time,
               entry_indicators, cluster_info_at_entry, reference_indicator_at_entry,
               created_at, updated_at)
            VALUES ($1, $2, 'OPEN', $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .bind(&draft.symbol)
            .bind(draft.position_type.as_str())
            .bind(POSITION_QUANTITY)
            .bind(draft.entry_price)
            .bind(draft.entry_time)
            .bind(Json(&draft.entry_indicators))
            .bind(Json(&draft.cluster_info_at_entry))
            .bind(draft.reference_indicator_at_entry)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;

        position_from_row(&row)
    }

    async fn close_position(
        &self,
        id:         &str,
        exit_price: f64,
        reason:     ExitReason,
    ) -> Result<CloseOutcome, StoreError> {
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(CloseOutcome::AlreadyClosed);
        };

        // single statement: the status predicate is the compare-and-set
        let sql = format!(
            r#"
            UPDATE positions SET
              status      = 'CLOSED',
              exit_price  = $2,
              exit_time   = $3,
              exit_reason = $4,
              profit_loss = CASE position_type
                              WHEN 'LONG' THEN ($2 - entry_price) * quantity
                              ELSE (entry_price - $2) * quantity
                            END,
              updated_at  = $3
            WHERE id = $1 AND status = 'OPEN'
            RETURNING {COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(uuid)
            .bind(exit_price)
            .bind(Utc::now())
            .bind(reason.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        match row {
            Some(row) => Ok(CloseOutcome::Closed(position_from_row(&row)?)),
            None => Ok(CloseOutcome::AlreadyClosed),
        }
    }

    async fn restore_latest_open(&self, symbol: &str) -> Result<Option<Position>, StoreError> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM positions
            WHERE status = 'OPEN' AND symbol = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#
        );

        let row = sqlx::query(&sql)
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        row.as_ref().map(position_from_row).transpose()
    }

    async fn list_positions(&self, symbol: &str, limit: usize) -> Result<Vec<Position>, StoreError> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM positions
            WHERE symbol = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(symbol)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        rows.iter().map(position_from_row).collect()
    }

    async fn closed_positions(&self, symbol: &str) -> Result<Vec<Position>, StoreError> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM positions
            WHERE status = 'CLOSED' AND symbol = $1
            ORDER BY created_at ASC
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(symbol)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        rows.iter().map(position_from_row).collect()
    }
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

fn position_from_row(row: &PgRow) -> Result<Position, StoreError> {
    let id: Uuid = row.try_get("id").map_err(unavailable)?;
    let corrupt = |reason: String| StoreError::Corrupt { id: id.to_string(), reason };

    let status: String        = row.try_get("status").map_err(unavailable)?;
    let position_type: String = row.try_get("position_type").map_err(unavailable)?;
    let exit_reason: Option<String> = row.try_get("exit_reason").map_err(unavailable)?;

    let Json(entry_indicators): Json<BTreeMap<u32, f64>> =
        row.try_get("entry_indicators").map_err(unavailable)?;
    let Json(cluster_info_at_entry): Json<ClusterResult> =
        row.try_get("cluster_info_at_entry").map_err(unavailable)?;

    let exit_reason = match exit_reason {
        Some(raw) => Some(
            ExitReason::parse(&raw).ok_or_else(|| corrupt(format!("exit_reason '{raw}'")))?,
        ),
        None => None,
    };

    Ok(Position {
        id:                           id.to_string(),
        symbol:                       row.try_get("symbol").map_err(unavailable)?,
        status:                       PositionStatus::parse(&status)
                                          .ok_or_else(|| corrupt(format!("status '{status}'")))?,
        position_type:                PositionType::parse(&position_type)
                                          .ok_or_else(|| corrupt(format!("position_type '{position_type}'")))?,
        quantity:                     row.try_get("quantity").map_err(unavailable)?,
        entry_price:                  row.try_get("entry_price").map_err(unavailable)?,
        entry_time:                   row.try_get::<DateTime<Utc>, _>("entry_time").map_err(unavailable)?,
        entry_indicators,
        cluster_info_at_entry,
        reference_indicator_at_entry: row.try_get("reference_indicator_at_entry").map_err(unavailable)?,
        exit_price:                   row.try_get("exit_price").map_err(unavailable)?,
        exit_time:                    row.try_get("exit_time").map_err(unavailable)?,
        exit_reason,
        profit_loss:                  row.try_get("profit_loss").map_err(unavailable)?,
        created_at:                   row.try_get("created_at").map_err(unavailable)?,
        updated_at:                   row.try_get("updated_at").map_err(unavailable)?,
    })
}
