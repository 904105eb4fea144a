use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::model::user::UserResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Maria Reyes")]
    pub name: String,
    #[validate(email, length(max = 255))]
    #[schema(example = "maria.reyes@agency.gov")]
    pub email: String,
    #[validate(
        length(min = 8),
        must_match(other = "password_confirmation", message = "The password field confirmation does not match.")
    )]
    #[schema(example = "secret-password")]
    pub password: String,
    #[schema(example = "secret-password")]
    pub password_confirmation: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    #[schema(example = "maria.reyes@agency.gov")]
    pub email: String,
    #[validate(length(min = 1))]
    #[schema(example = "secret-password")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    /// email
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// Body of reject/disapprove actions.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RemarksRequest {
    #[validate(length(min = 1, message = "The remarks field is required."))]
    #[schema(example = "Incomplete supporting documents")]
    pub remarks: String,
}

/// Body of actions where a note is optional, e.g. inspection.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OptionalRemarks {
    pub remarks: Option<String>,
}

/// One requested or ordered line.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LineItemRequest {
    pub inventory_item_id: Option<u64>,
    #[validate(length(min = 1))]
    #[schema(example = "Bond paper, A4, 80gsm")]
    pub description: String,
    #[validate(length(min = 1, max = 30))]
    #[schema(example = "ream")]
    pub unit: String,
    #[validate(range(min = 1))]
    #[schema(example = 50)]
    pub quantity: i64,
    #[validate(range(min = 0.0))]
    #[schema(example = 250.0)]
    pub unit_cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    #[test]
    fn register_requires_matching_confirmation() {
        let payload = RegisterRequest {
            name: "Maria Reyes".to_string(),
            email: "maria.reyes@agency.gov".to_string(),
            password: "secret-password".to_string(),
            password_confirmation: "secret-passw0rd".to_string(),
        };
        let err: ApiError = payload.validate().unwrap_err().into();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors["password"],
            vec!["The password field confirmation does not match.".to_string()]
        );
    }

    #[test]
    fn empty_remarks_use_the_required_message() {
        let err: ApiError = RemarksRequest { remarks: String::new() }.validate().unwrap_err().into();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors["remarks"], vec!["The remarks field is required.".to_string()]);
    }

    #[test]
    fn token_type_round_trips_through_claims() {
        let json = serde_json::to_string(&TokenType::Refresh).unwrap();
        assert_eq!(serde_json::from_str::<TokenType>(&json).unwrap(), TokenType::Refresh);
    }
}
