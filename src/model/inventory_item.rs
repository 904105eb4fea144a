use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "item_code": "OS-0001",
    "name": "Bond paper A4",
    "description": "80gsm, 500 sheets",
    "category": "Office Supplies",
    "unit": "ream",
    "unit_cost": 245.0,
    "reorder_level": 20,
    "quantity_on_hand": 134,
    "is_active": true,
    "created_at": "2026-01-02T08:00:00Z",
    "updated_at": "2026-01-02T08:00:00Z"
}))]
pub struct InventoryItem {
    pub id: u64,
    pub item_code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: String,
    pub unit_cost: f64,
    pub reorder_level: i64,
    /// Maintained by the stock ledger only.
    pub quantity_on_hand: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
