//! In-memory SQL test infrastructure
//!
//! Provides a `TestDatabase` backed by SQLite in memory. Tables are created
//! from sea-orm entities, so a domain crate's own entity defines the schema
//! its integration tests run against.

use sea_orm::sea_query::SqliteQueryBuilder;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};

/// Test database wrapper
///
/// Every instance is a separate in-memory database, dropped with its
/// connection.
pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    /// Create an empty in-memory database
    ///
    /// # Example
    ///
    /// ```no_run
    /// use test_utils::TestDatabase;
    ///
    /// # async fn example() {
    /// let db = TestDatabase::new().await;
    /// // Use db.connection() to create your repository
    /// # }
    /// ```
    pub async fn new() -> Self {
        // One connection: each new connection would open a different in-memory database
        let mut options = ConnectOptions::new("sqlite::memory:");
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let connection = Database::connect(options)
            .await
            .expect("Failed to open in-memory SQLite database");

        tracing::debug!("Test database ready (SQLite in-memory)");

        Self { connection }
    }

    /// Create a database with the table of `entity` in place
    ///
    /// ```no_run
    /// use test_utils::TestDatabase;
    ///
    /// # async fn example<E: sea_orm::EntityTrait>(entity: E) {
    /// let db = TestDatabase::with_entity(entity).await;
    /// # }
    /// ```
    pub async fn with_entity<E: EntityTrait>(entity: E) -> Self {
        let db = Self::new().await;
        db.create_table(entity).await;
        db
    }

    /// Create the table for an entity
    pub async fn create_table<E: EntityTrait>(&self, entity: E) {
        let backend = self.connection.get_database_backend();
        let statement = Schema::new(backend)
            .create_table_from_entity(entity)
            .to_string(SqliteQueryBuilder);

        self.connection
            .execute_unprepared(&statement)
            .await
            .unwrap_or_else(|e| panic!("Failed to create table: {e}\n{statement}"));
    }

    /// Get a cloned connection (useful for passing to repositories)
    pub fn connection(&self) -> DatabaseConnection {
        self.connection.clone()
    }

    /// Run raw SQL, panicking on failure
    pub async fn execute(&self, sql: &str) -> u64 {
        self.connection
            .execute_unprepared(sql)
            .await
            .unwrap_or_else(|e| panic!("Failed to execute `{sql}`: {e}"))
            .rows_affected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_creation() {
        let db = TestDatabase::new().await;
        db.execute("CREATE TABLE scratch (id INTEGER PRIMARY KEY, label TEXT)").await;
        assert_eq!(db.execute("INSERT INTO scratch (label) VALUES ('a'), ('b')").await, 2);
    }

    #[tokio::test]
    async fn test_databases_are_isolated() {
        let db1 = TestDatabase::new().await;
        let db2 = TestDatabase::new().await;

        db1.execute("CREATE TABLE scratch (id INTEGER PRIMARY KEY)").await;
        // Same name in the second database must not collide
        db2.execute("CREATE TABLE scratch (id INTEGER PRIMARY KEY)").await;
    }
}
