use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use itemdesk_core::domain::item::{Item, ItemChanges, ItemId, NewItem, SYSTEM_USER};

use super::{ItemRepository, RepositoryError};
use crate::DbPool;

const ITEM_COLUMNS: &str = "item_id, item_code, item_description, unit_id, cost_price,
    selling_price, user_created, user_modified, created_at, updated_at";

pub struct SqlItemRepository {
    pool: DbPool,
}

impl SqlItemRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_price(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|e| RepositoryError::Decode(format!("invalid {field} `{value}`: {e}")))
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid {field} `{value}`: {e}")))
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<Item, RepositoryError> {
    let id: i64 = decode(row.try_get("item_id"))?;
    let code: String = decode(row.try_get("item_code"))?;
    let description: String = decode(row.try_get("item_description"))?;
    let unit_id: i64 = decode(row.try_get("unit_id"))?;
    let cost_price: String = decode(row.try_get("cost_price"))?;
    let selling_price: String = decode(row.try_get("selling_price"))?;
    let user_created: String = decode(row.try_get("user_created"))?;
    let user_modified: String = decode(row.try_get("user_modified"))?;
    let created_at: String = decode(row.try_get("created_at"))?;
    let updated_at: String = decode(row.try_get("updated_at"))?;

    Ok(Item {
        id: ItemId(id),
        code,
        description,
        unit_id,
        cost_price: parse_price("cost_price", &cost_price)?,
        selling_price: parse_price("selling_price", &selling_price)?,
        user_created,
        user_modified,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn map_write_error(error: sqlx::Error, code: &str) -> RepositoryError {
    match &error {
        sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
            RepositoryError::Conflict(format!("item code `{code}` already exists"))
        }
        _ => RepositoryError::Database(error),
    }
}

#[async_trait::async_trait]
impl ItemRepository for SqlItemRepository {
    async fn create(&self, item: NewItem) -> Result<Item, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let code = item.code.trim().to_string();

        let result = sqlx::query(
            "INSERT INTO item_master (item_code, item_description, unit_id, cost_price,
                                      selling_price, user_created, user_modified,
                                      created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&code)
        .bind(item.description.trim())
        .bind(item.unit_id)
        .bind(item.cost_price.to_string())
        .bind(item.selling_price.to_string())
        .bind(SYSTEM_USER)
        .bind(SYSTEM_USER)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|error| map_write_error(error, &code))?;

        let id = ItemId(result.last_insert_rowid());
        self.find_by_id(id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("item {} vanished after insert", id.0))
        })
    }

    async fn find_by_id(&self, id: ItemId) -> Result<Option<Item>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM item_master WHERE item_id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_item).transpose()
    }

    async fn list(&self) -> Result<Vec<Item>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> =
            sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM item_master ORDER BY item_id ASC"))
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_item).collect::<Result<Vec<_>, _>>()
    }

    async fn update(
        &self,
        id: ItemId,
        changes: ItemChanges,
    ) -> Result<Option<Item>, RepositoryError> {
        let Some(mut item) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        changes.apply_to(&mut item, Utc::now());

        sqlx::query(
            "UPDATE item_master SET
                 item_code = ?,
                 item_description = ?,
                 unit_id = ?,
                 cost_price = ?,
                 selling_price = ?,
                 user_modified = ?,
                 updated_at = ?
             WHERE item_id = ?",
        )
        .bind(&item.code)
        .bind(&item.description)
        .bind(item.unit_id)
        .bind(item.cost_price.to_string())
        .bind(item.selling_price.to_string())
        .bind(&item.user_modified)
        .bind(item.updated_at.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|error| map_write_error(error, &item.code))?;

        Ok(Some(item))
    }
}
