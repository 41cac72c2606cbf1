//! Administrator lookups.

use async_trait::async_trait;

use crate::db::DbPool;
use crate::engine::ports::PermissionOracle;
use crate::error::AppResult;

/// Reads `sqlgate.users.is_admin`; unknown users are not administrators.
#[derive(Clone)]
pub struct PgPermissionOracle {
    db: DbPool,
}

impl PgPermissionOracle {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PermissionOracle for PgPermissionOracle {
    async fn is_admin(&self, user: &str) -> AppResult<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT is_admin FROM sqlgate.users WHERE name = $1")
                .bind(user)
                .fetch_optional(&self.db)
                .await?;
        Ok(row.is_some_and(|(is_admin,)| is_admin))
    }
}
