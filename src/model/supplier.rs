use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "name": "Acme Office Supplies",
    "contact_person": "Juan Dela Cruz",
    "email": "sales@acme.ph",
    "phone": "+6321234567",
    "address": "123 Rizal Ave, Manila",
    "tin": "123-456-789-000",
    "category": "Office Supplies",
    "is_active": true,
    "created_at": "2026-01-02T08:00:00Z",
    "updated_at": "2026-01-02T08:00:00Z"
}))]
pub struct Supplier {
    pub id: u64,
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tin: Option<String>,
    pub category: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SupplierStatistics {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub by_category: BTreeMap<String, i64>,
}
