use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const SYSTEM_USER: &str = "System";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub i64);

/// A row of the item master catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub code: String,
    pub description: String,
    pub unit_id: i64,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub user_created: String,
    pub user_modified: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub code: String,
    pub description: String,
    pub unit_id: i64,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
}

impl NewItem {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_code(&self.code)?;
        validate_description(&self.description)?;
        validate_unit_id(self.unit_id)?;
        validate_price("cost price", self.cost_price)?;
        validate_price("selling price", self.selling_price)?;
        Ok(())
    }
}

/// Partial update of an item; `None` leaves the field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemChanges {
    pub code: Option<String>,
    pub description: Option<String>,
    pub unit_id: Option<i64>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
}

impl ItemChanges {
    pub fn is_empty(&self) -> bool {
        self.code.is_none()
            && self.description.is_none()
            && self.unit_id.is_none()
            && self.cost_price.is_none()
            && self.selling_price.is_none()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.is_empty() {
            return Err(DomainError::InvariantViolation(
                "an item update must change at least one field".to_string(),
            ));
        }
        if let Some(code) = &self.code {
            validate_code(code)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if let Some(unit_id) = self.unit_id {
            validate_unit_id(unit_id)?;
        }
        if let Some(cost_price) = self.cost_price {
            validate_price("cost price", cost_price)?;
        }
        if let Some(selling_price) = self.selling_price {
            validate_price("selling price", selling_price)?;
        }
        Ok(())
    }

    /// Applies the changes in place and stamps the modification.
    pub fn apply_to(&self, item: &mut Item, modified_at: DateTime<Utc>) {
        if let Some(code) = &self.code {
            item.code = code.trim().to_string();
        }
        if let Some(description) = &self.description {
            item.description = description.trim().to_string();
        }
        if let Some(unit_id) = self.unit_id {
            item.unit_id = unit_id;
        }
        if let Some(cost_price) = self.cost_price {
            item.cost_price = cost_price;
        }
        if let Some(selling_price) = self.selling_price {
            item.selling_price = selling_price;
        }
        item.user_modified = SYSTEM_USER.to_string();
        item.updated_at = modified_at;
    }
}

fn validate_code(code: &str) -> Result<(), DomainError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(DomainError::InvariantViolation("item code is required".to_string()));
    }
    if code.len() > 50 {
        return Err(DomainError::InvariantViolation(
            "item code must be at most 50 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), DomainError> {
    if description.trim().is_empty() {
        return Err(DomainError::InvariantViolation("item description is required".to_string()));
    }
    Ok(())
}

fn validate_unit_id(unit_id: i64) -> Result<(), DomainError> {
    if unit_id <= 0 {
        return Err(DomainError::InvariantViolation("unit id must be positive".to_string()));
    }
    Ok(())
}

fn validate_price(label: &str, price: Decimal) -> Result<(), DomainError> {
    if price.is_sign_negative() {
        return Err(DomainError::InvariantViolation(format!("{label} must not be negative")));
    }
    Ok(())
}
