//! SQLite implementations of storage interfaces.

use std::sync::Arc;

use sqlx::SqlitePool;

use super::{Result, Stores};

mod compensation_store;
mod offset_store;
mod table_store;

pub use compensation_store::SqliteCompensationStore;
pub use offset_store::SqliteOffsetStore;
pub use table_store::SqliteTableStore;

/// Create all three stores on one pool and initialize their schemas.
pub async fn init(pool: SqlitePool) -> Result<Stores> {
    let tables = SqliteTableStore::new(pool.clone());
    tables.init().await?;

    let offsets = SqliteOffsetStore::new(pool.clone());
    offsets.init().await?;

    let compensations = SqliteCompensationStore::new(pool);
    compensations.init().await?;

    Ok(Stores {
        tables: Arc::new(tables),
        offsets: Arc::new(offsets),
        compensations: Arc::new(compensations),
    })
}
