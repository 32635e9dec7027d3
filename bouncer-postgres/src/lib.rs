//! Postgres access-list store for `bouncer` (companion crate).
//!
//! One table per list, `whitelist` and `blacklist`, each `(network TEXT PRIMARY KEY)`.
//! Table names come from [`AccessList`]; statements are fixed per variant and every value
//! is a bind parameter.

use async_trait::async_trait;
use bouncer::access::{AccessList, AccessListStore};
use bouncer::StoreError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

struct Statements {
    create: &'static str,
    insert: &'static str,
    delete: &'static str,
    select_all: &'static str,
    exists: &'static str,
}

const WHITELIST: Statements = Statements {
    create: "CREATE TABLE IF NOT EXISTS whitelist (network TEXT PRIMARY KEY)",
    insert: "INSERT INTO whitelist (network) VALUES ($1) ON CONFLICT DO NOTHING",
    delete: "DELETE FROM whitelist WHERE network = $1",
    select_all: "SELECT network FROM whitelist",
    exists: "SELECT EXISTS (SELECT 1 FROM whitelist WHERE network = $1)",
};

const BLACKLIST: Statements = Statements {
    create: "CREATE TABLE IF NOT EXISTS blacklist (network TEXT PRIMARY KEY)",
    insert: "INSERT INTO blacklist (network) VALUES ($1) ON CONFLICT DO NOTHING",
    delete: "DELETE FROM blacklist WHERE network = $1",
    select_all: "SELECT network FROM blacklist",
    exists: "SELECT EXISTS (SELECT 1 FROM blacklist WHERE network = $1)",
};

fn statements(list: AccessList) -> &'static Statements {
    match list {
        AccessList::Whitelist => &WHITELIST,
        AccessList::Blacklist => &BLACKLIST,
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Tls(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::backend(other),
    }
}

#[derive(Clone, Debug)]
pub struct PgAccessListStore {
    pool: PgPool,
}

impl PgAccessListStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool of at most `max_connections` connections to `dsn`.
    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(dsn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Create both list tables if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for list in AccessList::ALL {
            sqlx::query(statements(list).create)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        tracing::debug!(target: "bouncer::postgres", "access list schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AccessListStore for PgAccessListStore {
    async fn insert(&self, list: AccessList, network: &str) -> Result<(), StoreError> {
        sqlx::query(statements(list).insert)
            .bind(network)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete(&self, list: AccessList, network: &str) -> Result<u64, StoreError> {
        let res = sqlx::query(statements(list).delete)
            .bind(network)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(res.rows_affected())
    }

    async fn get_all(&self, list: AccessList) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(statements(list).select_all)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("network").map_err(map_sqlx_error))
            .collect()
    }

    async fn exists_exact(&self, list: AccessList, network: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(statements(list).exists)
            .bind(network)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.try_get::<bool, _>(0).map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_list_targets_its_own_table() {
        for list in AccessList::ALL {
            let st = statements(list);
            let table = list.table();
            for sql in [st.create, st.insert, st.delete, st.select_all, st.exists] {
                assert!(sql.contains(table), "{sql}");
                assert!(!sql.contains(list.other().table()), "{sql}");
            }
        }
    }

    #[test]
    fn values_are_always_bound() {
        for list in AccessList::ALL {
            let st = statements(list);
            for sql in [st.insert, st.delete, st.exists] {
                assert!(sql.contains("$1"), "{sql}");
            }
        }
    }
}
