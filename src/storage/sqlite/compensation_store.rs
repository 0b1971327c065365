//! SQLite CompensationStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

use crate::scheduler::Compensation;
use crate::storage::schema::{Compensations, CREATE_COMPENSATIONS_TABLE};
use crate::storage::{CompensationStore, Result, StorageError};

/// SQLite implementation of CompensationStore.
pub struct SqliteCompensationStore {
    pool: SqlitePool,
}

impl SqliteCompensationStore {
    /// Create a new SQLite compensation store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_COMPENSATIONS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn format_fire_at(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_fire_at(id: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp {
            id: id.to_string(),
            value: value.to_string(),
        })
}

#[async_trait]
impl CompensationStore for SqliteCompensationStore {
    async fn put(&self, compensation: &Compensation) -> Result<()> {
        let query = Query::insert()
            .into_table(Compensations::Table)
            .columns([
                Compensations::Id,
                Compensations::RecordKey,
                Compensations::Delta,
                Compensations::FireAt,
            ])
            .values_panic([
                compensation.id.as_str().into(),
                compensation.key.as_str().into(),
                compensation.delta.into(),
                format_fire_at(&compensation.fire_at).into(),
            ])
            .on_conflict(
                OnConflict::column(Compensations::Id)
                    .update_columns([
                        Compensations::RecordKey,
                        Compensations::Delta,
                        Compensations::FireAt,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let query = Query::delete()
            .from_table(Compensations::Table)
            .and_where(Expr::col(Compensations::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Compensation>> {
        let query = Query::select()
            .columns([
                Compensations::Id,
                Compensations::RecordKey,
                Compensations::Delta,
                Compensations::FireAt,
            ])
            .from(Compensations::Table)
            .order_by(Compensations::FireAt, Order::Asc)
            .order_by(Compensations::Id, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.get("id");
                let fire_at: String = row.get("fire_at");
                Ok(Compensation {
                    fire_at: parse_fire_at(&id, &fire_at)?,
                    key: row.get("record_key"),
                    delta: row.get("delta"),
                    id,
                })
            })
            .collect()
    }
}
