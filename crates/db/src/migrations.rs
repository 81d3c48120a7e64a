use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Reverts every applied migration, newest first.
pub async fn revert_all(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.undo(pool, 0).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{revert_all, run_pending};
    use crate::connect_with_settings;

    const MANAGED_TABLES: &[&str] = &["territory", "brand", "pos", "visit", "visit_item"];

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "territory",
        "brand",
        "pos",
        "visit",
        "visit_item",
        "idx_territory_parent_id",
        "idx_pos_country_id",
        "idx_pos_commune_id",
        "idx_visit_country_visited_at",
        "idx_visit_pos_id",
        "idx_visit_item_visit_id",
        "idx_visit_item_brand_id",
    ];

    async fn table_count(pool: &sqlx::SqlitePool, table: &str) -> i64 {
        sqlx::query("SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(pool)
            .await
            .expect("check table")
            .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_fact_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in MANAGED_TABLES {
            assert_eq!(table_count(&pool, table).await, 1, "table `{table}` should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        revert_all(&pool).await.expect("undo migrations");

        for table in MANAGED_TABLES {
            assert_eq!(table_count(&pool, table).await, 0, "table `{table}` should be dropped");
        }
    }

    #[tokio::test]
    async fn visit_items_reject_negative_stock() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        // isolate the CHECK constraint from the foreign keys
        sqlx::query("PRAGMA foreign_keys = OFF").execute(&pool).await.expect("disable fks");
        let rejected = sqlx::query(
            "INSERT INTO visit_item (id, visit_id, brand_id, stock_units) VALUES (1, 1, 1, -2.0)",
        )
        .execute(&pool)
        .await;

        assert!(rejected.is_err());
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        revert_all(&pool).await.expect("undo migrations");
        assert!(
            managed_schema_signature(&pool).await.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(
            managed_schema_signature(&pool).await,
            initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
