use chrono::Utc;
use itemdesk_core::domain::item::SYSTEM_USER;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Deterministic catalog rows used by demos and smoke checks.
const SEED_ITEMS: &[SeedItemContract] = &[
    SeedItemContract {
        code: "ABC123",
        description: "Sample Item",
        unit_id: 4,
        cost_price: "45.50",
        selling_price: "65.75",
    },
    SeedItemContract {
        code: "BOLT-M8",
        description: "Hex bolt M8 x 40mm",
        unit_id: 1,
        cost_price: "0.12",
        selling_price: "0.30",
    },
    SeedItemContract {
        code: "PAINT-5L",
        description: "Interior wall paint, white, 5 litre",
        unit_id: 2,
        cost_price: "18.00",
        selling_price: "27.90",
    },
];

pub struct SampleItemDataset;

impl SampleItemDataset {
    /// Inserts the sample items; codes that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        let mut inserted = Vec::new();

        for item in SEED_ITEMS {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO item_master
                     (item_code, item_description, unit_id, cost_price, selling_price,
                      user_created, user_modified, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(item.code)
            .bind(item.description)
            .bind(item.unit_id)
            .bind(item.cost_price)
            .bind(item.selling_price)
            .bind(SYSTEM_USER)
            .bind(SYSTEM_USER)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted.push(item.code);
            }
        }

        tx.commit().await?;
        Ok(SeedResult { inserted, total: SEED_ITEMS.len() })
    }

    /// Checks that every sample item is present with its seeded prices.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for item in SEED_ITEMS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                     SELECT 1 FROM item_master
                     WHERE item_code = ?1 AND cost_price = ?2 AND selling_price = ?3
                 )",
            )
            .bind(item.code)
            .bind(item.cost_price)
            .bind(item.selling_price)
            .fetch_one(pool)
            .await?;
            checks.push((item.code, present == 1));
        }

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for item in SEED_ITEMS {
            sqlx::query("DELETE FROM item_master WHERE item_code = ?")
                .bind(item.code)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub fn codes() -> Vec<&'static str> {
        SEED_ITEMS.iter().map(|item| item.code).collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedItemContract {
    code: &'static str,
    description: &'static str,
    unit_id: i64,
    cost_price: &'static str,
    selling_price: &'static str,
}

#[derive(Debug)]
pub struct SeedResult {
    pub inserted: Vec<&'static str>,
    pub total: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn load_then_verify_passes() {
        let pool = setup().await;

        let result = SampleItemDataset::load(&pool).await.expect("load");
        assert_eq!(result.inserted.len(), result.total);

        let verification = SampleItemDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "checks: {:?}", verification.checks);
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let pool = setup().await;
        SampleItemDataset::load(&pool).await.expect("first load");

        let second = SampleItemDataset::load(&pool).await.expect("second load");
        assert!(second.inserted.is_empty());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM item_master")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count as usize, SampleItemDataset::codes().len());
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = setup().await;
        SampleItemDataset::load(&pool).await.expect("load");
        SampleItemDataset::clean(&pool).await.expect("clean");

        let verification = SampleItemDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, passed)| !passed));
    }
}
