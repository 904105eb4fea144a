use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::model::role::Role;

#[derive(Debug, FromRow)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: u8,
    pub employee_id: Option<u64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Public projection, never carries the password hash.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: u64,
    pub name: String,
    pub email: String,
    #[schema(example = "employee")]
    pub role: String,
    pub employee_id: Option<u64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        let role = Role::from_id(user.role_id)
            .map(|r| r.as_ref().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role,
            employee_id: user.employee_id,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}
