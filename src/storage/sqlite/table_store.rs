//! SQLite TableStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

use crate::storage::schema::{StateRecords, CREATE_STATE_TABLE};
use crate::storage::{Result, TableStore};

/// SQLite implementation of TableStore.
pub struct SqliteTableStore {
    pool: SqlitePool,
}

impl SqliteTableStore {
    /// Create a new SQLite table store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_STATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn get(&self, group: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let query = Query::select()
            .column(StateRecords::StateData)
            .from(StateRecords::Table)
            .and_where(Expr::col(StateRecords::GroupName).eq(group))
            .and_where(Expr::col(StateRecords::RecordKey).eq(key))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        Ok(row.map(|row| row.get("state_data")))
    }

    async fn put(&self, group: &str, key: &str, value: Vec<u8>) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        let query = Query::insert()
            .into_table(StateRecords::Table)
            .columns([
                StateRecords::GroupName,
                StateRecords::RecordKey,
                StateRecords::StateData,
                StateRecords::UpdatedAt,
            ])
            .values_panic([group.into(), key.into(), value.into(), updated_at.into()])
            .on_conflict(
                OnConflict::columns([StateRecords::GroupName, StateRecords::RecordKey])
                    .update_columns([StateRecords::StateData, StateRecords::UpdatedAt])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }
}
