//! SQLite OffsetStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

use crate::storage::schema::{Offsets, CREATE_OFFSETS_TABLE};
use crate::storage::{OffsetStore, Result};

/// SQLite implementation of OffsetStore.
pub struct SqliteOffsetStore {
    pool: SqlitePool,
}

impl SqliteOffsetStore {
    /// Create a new SQLite offset store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_OFFSETS_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OffsetStore for SqliteOffsetStore {
    async fn get(&self, group: &str, topic: &str, partition: u32) -> Result<Option<u64>> {
        let query = Query::select()
            .column(Offsets::NextOffset)
            .from(Offsets::Table)
            .and_where(Expr::col(Offsets::GroupName).eq(group))
            .and_where(Expr::col(Offsets::Topic).eq(topic))
            .and_where(Expr::col(Offsets::Partition).eq(partition))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => {
                let next_offset: i64 = row.get("next_offset");
                Ok(Some(next_offset as u64))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, group: &str, topic: &str, partition: u32, next_offset: u64) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        let query = Query::insert()
            .into_table(Offsets::Table)
            .columns([
                Offsets::GroupName,
                Offsets::Topic,
                Offsets::Partition,
                Offsets::NextOffset,
                Offsets::UpdatedAt,
            ])
            .values_panic([
                group.into(),
                topic.into(),
                partition.into(),
                (next_offset as i64).into(),
                updated_at.into(),
            ])
            .on_conflict(
                OnConflict::columns([Offsets::GroupName, Offsets::Topic, Offsets::Partition])
                    .update_columns([Offsets::NextOffset, Offsets::UpdatedAt])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }
}
