//! Item master operations exposed to the agent as tools.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use itemdesk_core::domain::item::{ItemChanges, ItemId, NewItem};
use itemdesk_core::errors::{ConversationError, DomainError};
use itemdesk_db::repositories::{ItemRepository, RepositoryError};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use crate::tools::{Tool, ToolDescriptor, ToolError, ToolRegistry};

pub const CREATE_ITEM: &str = "create_item";
pub const GET_ITEMS: &str = "get_items";
pub const UPDATE_ITEM: &str = "update_item";

/// Field order of the positional `entries` form.
const ENTRY_FIELDS: [&str; 5] = ["code", "description", "unitId", "costPrice", "sellingPrice"];

pub fn register_item_tools(
    registry: &mut ToolRegistry,
    repository: Arc<dyn ItemRepository>,
) -> Result<(), ConversationError> {
    registry.register(CreateItemTool::new(repository.clone()))?;
    registry.register(GetItemsTool::new(repository.clone()))?;
    registry.register(UpdateItemTool::new(repository))?;
    Ok(())
}

pub struct CreateItemTool {
    repository: Arc<dyn ItemRepository>,
}

impl CreateItemTool {
    pub fn new(repository: Arc<dyn ItemRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Tool for CreateItemTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: CREATE_ITEM.to_string(),
            description: "Save a confirmed new item to the item master.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "code": { "type": "string", "description": "Unique item code" },
                    "description": { "type": "string" },
                    "unitId": { "type": "integer", "minimum": 1 },
                    "costPrice": { "type": "number" },
                    "sellingPrice": { "type": "number" }
                },
                "required": ["code", "description", "unitId", "costPrice", "sellingPrice"]
            }),
        }
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let fields = normalize_entries(arguments)?;
        let missing: Vec<&str> =
            ENTRY_FIELDS.iter().copied().filter(|field| !fields.contains_key(*field)).collect();
        if !missing.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let item = NewItem {
            code: required_string(&fields, "code")?,
            description: required_string(&fields, "description")?,
            unit_id: required_integer(&fields, "unitId")?,
            cost_price: required_decimal(&fields, "costPrice")?,
            selling_price: required_decimal(&fields, "sellingPrice")?,
        };
        item.validate().map_err(invalid)?;

        let created = self.repository.create(item).await.map_err(storage)?;
        Ok(json!({ "message": "item created", "item": created }))
    }
}

pub struct GetItemsTool {
    repository: Arc<dyn ItemRepository>,
}

impl GetItemsTool {
    pub fn new(repository: Arc<dyn ItemRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Tool for GetItemsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: GET_ITEMS.to_string(),
            description: "Look up one item by itemId, or list every item when itemId is omitted."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "itemId": { "type": "integer" }
                }
            }),
        }
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let items = match optional_integer(&arguments, &["itemId", "item_id"])? {
            Some(id) => {
                self.repository.find_by_id(ItemId(id)).await.map_err(storage)?.into_iter().collect()
            }
            None => self.repository.list().await.map_err(storage)?,
        };
        Ok(json!({ "count": items.len(), "items": items }))
    }
}

pub struct UpdateItemTool {
    repository: Arc<dyn ItemRepository>,
}

impl UpdateItemTool {
    pub fn new(repository: Arc<dyn ItemRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Tool for UpdateItemTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: UPDATE_ITEM.to_string(),
            description: "Change one or more fields of an existing item.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "itemId": { "type": "integer" },
                    "code": { "type": "string" },
                    "description": { "type": "string" },
                    "unitId": { "type": "integer", "minimum": 1 },
                    "costPrice": { "type": "number" },
                    "sellingPrice": { "type": "number" }
                },
                "required": ["itemId"]
            }),
        }
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let id = optional_integer(&arguments, &["itemId", "item_id"])?
            .ok_or_else(|| ToolError::InvalidArguments("itemId is required".to_string()))?;
        let changes = ItemChanges {
            code: optional_string(&arguments, &["code", "item_code"])?,
            description: optional_string(&arguments, &["description", "item_description"])?,
            unit_id: optional_integer(&arguments, &["unitId", "unit_id"])?,
            cost_price: optional_decimal(&arguments, &["costPrice", "cost_price"])?,
            selling_price: optional_decimal(&arguments, &["sellingPrice", "selling_price"])?,
        };
        changes.validate().map_err(invalid)?;

        match self.repository.update(ItemId(id), changes).await.map_err(storage)? {
            Some(item) => Ok(json!({ "message": "item updated", "item": item })),
            None => Err(ToolError::Execution(format!("item {id} does not exist"))),
        }
    }
}

/// Folds the accepted argument spellings into the camelCase field names.
///
/// Besides plain named arguments, `entries` may hold `"key: value"` strings or
/// bare values taken in [`ENTRY_FIELDS`] order.
fn normalize_entries(mut arguments: Map<String, Value>) -> Result<Map<String, Value>, ToolError> {
    let mut fields = Map::new();

    if let Some(entries) = arguments.remove("entries") {
        let Value::Array(entries) = entries else {
            return Err(ToolError::InvalidArguments("entries must be a list".to_string()));
        };
        for (position, entry) in entries.iter().enumerate() {
            let text = match entry {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            match text.split_once(": ") {
                Some((key, value)) => {
                    if let Some(field) = canonical_field(&key.trim().to_ascii_lowercase()) {
                        fields.insert(field.to_string(), Value::String(value.trim().to_string()));
                    }
                }
                None => {
                    if let Some(field) = ENTRY_FIELDS.get(position) {
                        fields.insert((*field).to_string(), Value::String(text.trim().to_string()));
                    }
                }
            }
        }
    }

    for (key, value) in arguments {
        if let Some(field) = canonical_field(&key) {
            fields.insert(field.to_string(), value);
        }
    }
    Ok(fields)
}

fn canonical_field(key: &str) -> Option<&'static str> {
    match key {
        "code" | "itemCode" | "item_code" => Some("code"),
        "description" | "itemDescription" | "item_description" => Some("description"),
        "unitId" | "unit_id" | "unitid" => Some("unitId"),
        "costPrice" | "cost_price" | "costprice" => Some("costPrice"),
        "sellingPrice" | "selling_price" | "sellingprice" => Some("sellingPrice"),
        _ => None,
    }
}

fn required_string(fields: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    optional_string(fields, &[key])?
        .ok_or_else(|| ToolError::InvalidArguments(format!("{key} is required")))
}

fn required_integer(fields: &Map<String, Value>, key: &str) -> Result<i64, ToolError> {
    optional_integer(fields, &[key])?
        .ok_or_else(|| ToolError::InvalidArguments(format!("{key} is required")))
}

fn required_decimal(fields: &Map<String, Value>, key: &str) -> Result<Decimal, ToolError> {
    optional_decimal(fields, &[key])?
        .ok_or_else(|| ToolError::InvalidArguments(format!("{key} is required")))
}

fn lookup<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<(&'a str, &'a Value)> {
    keys.iter().find_map(|key| {
        fields
            .get_key_value(*key)
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.as_str(), value))
    })
}

fn optional_string(
    fields: &Map<String, Value>,
    keys: &[&str],
) -> Result<Option<String>, ToolError> {
    match lookup(fields, keys) {
        None => Ok(None),
        Some((_, Value::String(text))) => Ok(Some(text.clone())),
        Some((_, Value::Number(number))) => Ok(Some(number.to_string())),
        Some((key, _)) => Err(ToolError::InvalidArguments(format!("{key} must be text"))),
    }
}

fn optional_integer(fields: &Map<String, Value>, keys: &[&str]) -> Result<Option<i64>, ToolError> {
    match lookup(fields, keys) {
        None => Ok(None),
        Some((key, Value::Number(number))) => number
            .as_i64()
            .map(Some)
            .ok_or_else(|| ToolError::InvalidArguments(format!("{key} must be a whole number"))),
        Some((key, Value::String(text))) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ToolError::InvalidArguments(format!("{key} must be a whole number"))),
        Some((key, _)) => {
            Err(ToolError::InvalidArguments(format!("{key} must be a whole number")))
        }
    }
}

fn optional_decimal(
    fields: &Map<String, Value>,
    keys: &[&str],
) -> Result<Option<Decimal>, ToolError> {
    let (key, raw) = match lookup(fields, keys) {
        None => return Ok(None),
        Some((key, Value::Number(number))) => (key, number.to_string()),
        Some((key, Value::String(text))) => (key, text.trim().to_string()),
        Some((key, _)) => {
            return Err(ToolError::InvalidArguments(format!("{key} must be a decimal number")))
        }
    };
    Decimal::from_str(&raw)
        .map(Some)
        .map_err(|_| ToolError::InvalidArguments(format!("{key} must be a decimal number")))
}

fn invalid(error: DomainError) -> ToolError {
    match error {
        DomainError::InvariantViolation(message) => ToolError::InvalidArguments(message),
        other => ToolError::InvalidArguments(other.to_string()),
    }
}

fn storage(error: RepositoryError) -> ToolError {
    match error {
        RepositoryError::Conflict(message) => ToolError::Execution(message),
        other => ToolError::Execution(format!("item storage failed: {other}")),
    }
}
