//! Per-user integer counters backed by a `(key PRIMARY KEY, value)` table.
//!
//! Every write is a single `INSERT ... ON CONFLICT` statement so concurrent updates to the same
//! user can't lose increments.  Counters never drop below zero.

use super::{Database, Result, StoreError};
use rusqlite::{params, OptionalExtension};
use serenity::all::UserId;

/// Table holding one counter per user.
#[derive(Clone, Copy, Debug)]
pub struct CounterTable {
    pub table: &'static str,
    pub key: &'static str,
    pub value: &'static str,
}

/// Experience points
pub const LEVELS: CounterTable = CounterTable {
    table: "levels",
    key: "user_id",
    value: "exp",
};

/// Coin balances
pub const ECONOMY: CounterTable = CounterTable {
    table: "economy",
    key: "user_id",
    value: "balance",
};

/// Result of a bulk operation for one user.  Bulk operations are not transactional across
/// users: earlier users keep their update even if a later one fails.
pub type BulkOutcome = (UserId, std::result::Result<u64, StoreError>);

#[derive(Clone)]
pub struct CounterStore {
    db: Database,
    table: CounterTable,
}

impl CounterTable {
    fn select_sql(&self) -> String {
        format!(
            "SELECT {v} FROM {t} WHERE {k} = ?1",
            t = self.table,
            k = self.key,
            v = self.value
        )
    }

    fn get_or_insert_sql(&self) -> String {
        format!(
            "INSERT INTO {t} ({k}, {v}) VALUES (?1, 0) \
             ON CONFLICT({k}) DO UPDATE SET {v} = {v} \
             RETURNING {v}",
            t = self.table,
            k = self.key,
            v = self.value
        )
    }

    // SQLite turns an overflowing integer sum into a REAL, so clamp before adding.
    fn add_sql(&self) -> String {
        format!(
            "INSERT INTO {t} ({k}, {v}) VALUES (?1, MAX(?2, 0)) \
             ON CONFLICT({k}) DO UPDATE SET {v} = CASE \
                 WHEN ?2 > 0 AND {v} > {max} - ?2 THEN {max} \
                 ELSE MAX({v} + ?2, 0) \
             END \
             RETURNING {v}",
            t = self.table,
            k = self.key,
            v = self.value,
            max = i64::MAX
        )
    }

    fn set_sql(&self) -> String {
        format!(
            "INSERT INTO {t} ({k}, {v}) VALUES (?1, ?2) \
             ON CONFLICT({k}) DO UPDATE SET {v} = excluded.{v} \
             RETURNING {v}",
            t = self.table,
            k = self.key,
            v = self.value
        )
    }

    fn delete_sql(&self) -> String {
        format!("DELETE FROM {t} WHERE {k} = ?1", t = self.table, k = self.key)
    }
}

impl CounterStore {
    pub fn new(db: Database, table: CounterTable) -> Self {
        Self { db, table }
    }

    /// Current value, `0` if the user has no record.  Never creates a record.
    pub async fn get(&self, user: UserId) -> Result<u64> {
        let sql = self.table.select_sql();
        self.db
            .with_conn(move |conn| {
                let value = conn
                    .query_row(&sql, params![user.get()], |row| row.get::<_, u64>(0))
                    .optional()?;
                Ok(value.unwrap_or(0))
            })
            .await
    }

    /// Whether a record exists for the user.
    #[cfg(test)]
    pub async fn exists(&self, user: UserId) -> Result<bool> {
        let sql = self.table.select_sql();
        self.db
            .with_conn(move |conn| {
                let value = conn
                    .query_row(&sql, params![user.get()], |row| row.get::<_, u64>(0))
                    .optional()?;
                Ok(value.is_some())
            })
            .await
    }

    /// Like [`CounterStore::get`], but creates a zeroed record if none exists.
    pub async fn get_or_insert(&self, user: UserId) -> Result<u64> {
        let sql = self.table.get_or_insert_sql();
        self.db
            .with_conn(move |conn| {
                Ok(conn.query_row(&sql, params![user.get()], |row| row.get(0))?)
            })
            .await
    }

    /// Atomically add `delta` (which may be negative) and return the new value.  Creates the
    /// record if it is missing.
    pub async fn add(&self, user: UserId, delta: i64) -> Result<u64> {
        let sql = self.table.add_sql();
        self.db
            .with_conn(move |conn| {
                Ok(conn.query_row(&sql, params![user.get(), delta], |row| row.get(0))?)
            })
            .await
    }

    /// Overwrite the value, creating the record if it is missing.
    pub async fn set(&self, user: UserId, value: u64) -> Result<u64> {
        let sql = self.table.set_sql();
        self.db
            .with_conn(move |conn| {
                Ok(conn.query_row(&sql, params![user.get(), value], |row| row.get(0))?)
            })
            .await
    }

    /// Remove the record.  Returns whether one existed.
    pub async fn delete(&self, user: UserId) -> Result<bool> {
        let sql = self.table.delete_sql();
        self.db
            .with_conn(move |conn| Ok(conn.execute(&sql, params![user.get()])? > 0))
            .await
    }

    /// [`CounterStore::add`] for each user in turn.
    pub async fn bulk_add(&self, users: &[UserId], delta: i64) -> Result<Vec<BulkOutcome>> {
        let sql = self.table.add_sql();
        let users = users.to_vec();
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let outcomes: Vec<BulkOutcome> = users
                    .into_iter()
                    .map(|user| {
                        let result = stmt
                            .query_row(params![user.get(), delta], |row| row.get(0))
                            .map_err(StoreError::from);
                        (user, result)
                    })
                    .collect();
                Ok(outcomes)
            })
            .await
    }

    /// [`CounterStore::set`] for each user in turn.
    pub async fn bulk_set(&self, users: &[UserId], value: u64) -> Result<Vec<BulkOutcome>> {
        let sql = self.table.set_sql();
        let users = users.to_vec();
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let outcomes: Vec<BulkOutcome> = users
                    .into_iter()
                    .map(|user| {
                        let result = stmt
                            .query_row(params![user.get(), value], |row| row.get(0))
                            .map_err(StoreError::from);
                        (user, result)
                    })
                    .collect();
                Ok(outcomes)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::temp_db;

    fn user(id: u64) -> UserId {
        UserId::new(id)
    }

    #[tokio::test]
    async fn get_does_not_create_record() {
        let (_dir, db) = temp_db().await;
        let store = CounterStore::new(db, LEVELS);

        assert_eq!(store.get(user(1)).await.unwrap(), 0);
        assert!(!store.exists(user(1)).await.unwrap());
    }

    #[tokio::test]
    async fn get_or_insert_is_idempotent() {
        let (_dir, db) = temp_db().await;
        let store = CounterStore::new(db.clone(), LEVELS);

        assert_eq!(store.get_or_insert(user(1)).await.unwrap(), 0);
        assert_eq!(store.get_or_insert(user(1)).await.unwrap(), 0);

        let rows: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM levels WHERE user_id = 1", [], |r| {
                    r.get(0)
                })?)
            })
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn get_or_insert_keeps_existing_value() {
        let (_dir, db) = temp_db().await;
        let store = CounterStore::new(db, LEVELS);

        store.add(user(1), 40).await.unwrap();
        assert_eq!(store.get_or_insert(user(1)).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn add_creates_then_increments() {
        let (_dir, db) = temp_db().await;
        let store = CounterStore::new(db, LEVELS);

        assert_eq!(store.add(user(7), 20).await.unwrap(), 20);
        assert_eq!(store.add(user(7), 15).await.unwrap(), 35);
        assert_eq!(store.get(user(7)).await.unwrap(), 35);
    }

    #[tokio::test]
    async fn negative_add_saturates_at_zero() {
        let (_dir, db) = temp_db().await;
        let store = CounterStore::new(db, LEVELS);

        store.add(user(3), 10).await.unwrap();
        assert_eq!(store.add(user(3), -25).await.unwrap(), 0);
        assert_eq!(store.add(user(4), -5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_saturates_at_largest_integer() {
        let (_dir, db) = temp_db().await;
        let store = CounterStore::new(db, LEVELS);
        let max = i64::MAX as u64;

        store.add(user(1), 1).await.unwrap();
        assert_eq!(store.add(user(1), i64::MAX).await.unwrap(), max);
        assert_eq!(store.add(user(1), i64::MAX).await.unwrap(), max);
        assert_eq!(store.get(user(1)).await.unwrap(), max);
        assert_eq!(store.get_or_insert(user(1)).await.unwrap(), max);
        assert_eq!(store.add(user(1), -5).await.unwrap(), max - 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_lose_nothing() {
        const N: u64 = 32;
        let (_dir, db) = temp_db().await;
        let store = CounterStore::new(db, LEVELS);

        let tasks: Vec<_> = (0..N)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.add(user(99), 1).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.get(user(99)).await.unwrap(), N);
    }

    #[tokio::test]
    async fn set_overwrites_and_creates() {
        let (_dir, db) = temp_db().await;
        let store = CounterStore::new(db, LEVELS);

        assert_eq!(store.set(user(1), 500).await.unwrap(), 500);
        store.add(user(1), 5).await.unwrap();
        assert_eq!(store.set(user(1), 12).await.unwrap(), 12);
        assert_eq!(store.get(user(1)).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, db) = temp_db().await;
        let store = CounterStore::new(db, LEVELS);

        store.add(user(5), 100).await.unwrap();
        assert!(store.delete(user(5)).await.unwrap());
        assert!(!store.delete(user(5)).await.unwrap());
        assert_eq!(store.get(user(5)).await.unwrap(), 0);
        assert!(!store.exists(user(5)).await.unwrap());
    }

    #[tokio::test]
    async fn bulk_operations_report_each_user() {
        let (_dir, db) = temp_db().await;
        let store = CounterStore::new(db, LEVELS);
        store.add(user(1), 10).await.unwrap();

        let added = store.bulk_add(&[user(1), user(2)], 5).await.unwrap();
        let added: Vec<_> = added.into_iter().map(|(u, r)| (u, r.unwrap())).collect();
        assert_eq!(added, vec![(user(1), 15), (user(2), 5)]);

        let set = store.bulk_set(&[user(1), user(2)], 3).await.unwrap();
        assert!(set.iter().all(|(_, r)| matches!(r, Ok(3))));
    }

    #[tokio::test]
    async fn tables_are_independent() {
        let (_dir, db) = temp_db().await;
        let levels = CounterStore::new(db.clone(), LEVELS);
        let economy = CounterStore::new(db, ECONOMY);

        levels.add(user(1), 10).await.unwrap();
        economy.add(user(1), 250).await.unwrap();

        assert_eq!(levels.get(user(1)).await.unwrap(), 10);
        assert_eq!(economy.get(user(1)).await.unwrap(), 250);
    }
}
