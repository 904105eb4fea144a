use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

/// Field name -> list of human readable messages, rendered as `errors` in a 422 body.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "Unauthenticated.")]
    Unauthenticated,
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    Conflict(String),
    #[display(fmt = "validation failed")]
    Validation(FieldErrors),
    #[display(fmt = "{}", _0)]
    Unprocessable(String),
    #[display(fmt = "{}", _0)]
    Internal(anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn forbidden() -> Self {
        ApiError::Forbidden("This action is unauthorized.".to_string())
    }

    pub fn not_found(resource: &str) -> Self {
        ApiError::NotFound(format!("{} not found.", resource))
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        ApiError::Unprocessable(message.into())
    }

    /// Single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(errors)
    }

    /// Laravel-style summary: first message, plus a count of the rest.
    fn validation_message(errors: &FieldErrors) -> String {
        let mut all = errors.values().flatten();
        let first = match all.next() {
            Some(m) => m.clone(),
            None => return "The given data was invalid.".to_string(),
        };
        match all.count() {
            0 => first,
            1 => format!("{} (and 1 more error)", first),
            n => format!("{} (and {} more errors)", first, n),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) | ApiError::Unprocessable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation(errors) => json!({
                "message": Self::validation_message(errors),
                "errors": errors,
            }),
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "Unhandled server error");
                json!({ "message": "Server Error" })
            }
            other => json!({ "message": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return ApiError::NotFound("Resource not found.".to_string());
        }
        if let sqlx::Error::Database(db_err) = &err {
            // MySQL reports both duplicate keys and FK violations as SQLSTATE 23000
            if db_err.code().as_deref() == Some("23000") {
                let message = db_err.message();
                if message.contains("Duplicate entry") {
                    return ApiError::Conflict("The record already exists.".to_string());
                }
                return ApiError::Conflict(
                    "The record is referenced by other records.".to_string(),
                );
            }
        }
        tracing::error!(error = %err, "Database error");
        ApiError::Internal(err.into())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        flatten_errors("", &errors, &mut out);
        ApiError::Validation(out)
    }
}

fn flatten_errors(prefix: &str, errors: &ValidationErrors, out: &mut FieldErrors) {
    for (field, kind) in errors.errors() {
        let key = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                let messages = out.entry(key.clone()).or_default();
                for e in list {
                    messages.push(field_message(&key, e));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten_errors(&key, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten_errors(&format!("{}.{}", key, index), inner, out);
                }
            }
        }
    }
}

/// `items.0.unit_cost` -> `items.0.unit cost`
fn display_name(key: &str) -> String {
    key.replace('_', " ")
}

fn field_message(key: &str, error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }
    let name = display_name(key);
    match error.code.as_ref() {
        "required" => format!("The {} field is required.", name),
        "email" => format!("The {} field must be a valid email address.", name),
        "length" => {
            let min = error.params.get("min");
            let max = error.params.get("max");
            match (min, max) {
                (Some(min), None) => format!("The {} field must be at least {} characters.", name, min),
                (None, Some(max)) => format!("The {} field must not be greater than {} characters.", name, max),
                _ => format!("The {} field has an invalid length.", name),
            }
        }
        "range" => {
            let min = error.params.get("min");
            let max = error.params.get("max");
            match (min, max) {
                (Some(min), Some(max)) => format!("The {} field must be between {} and {}.", name, min, max),
                (Some(min), None) => format!("The {} field must be at least {}.", name, min),
                (None, Some(max)) => format!("The {} field must not be greater than {}.", name, max),
                _ => format!("The {} field is out of range.", name),
            }
        }
        "must_match" => format!("The {} field confirmation does not match.", name),
        _ => format!("The {} field is invalid.", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use serde::Deserialize;
    use validator::Validate;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Line {
        #[validate(range(min = 1))]
        quantity: i64,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Payload {
        #[validate(length(min = 1))]
        first_name: String,
        #[validate(email)]
        email: String,
        #[validate(nested)]
        items: Vec<Line>,
    }

    #[actix_web::test]
    async fn unauthenticated_body_matches_contract() {
        let (status, json) = body_json(ApiError::Unauthenticated).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json, serde_json::json!({ "message": "Unauthenticated." }));
    }

    #[actix_web::test]
    async fn not_found_uses_resource_name() {
        let (status, json) = body_json(ApiError::not_found("Supplier")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Supplier not found.");
    }

    #[actix_web::test]
    async fn single_validation_error_has_plain_message() {
        let (status, json) = body_json(ApiError::invalid("end_date", "Bad end date.")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["message"], "Bad end date.");
        assert_eq!(json["errors"]["end_date"][0], "Bad end date.");
    }

    #[actix_web::test]
    async fn internal_error_hides_details() {
        let (status, json) = body_json(ApiError::Internal(anyhow::anyhow!("boom"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["message"], "Server Error");
    }

    #[test]
    fn nested_validation_errors_use_dotted_keys() {
        let payload = Payload {
            first_name: String::new(),
            email: "not-an-email".to_string(),
            items: vec![Line { quantity: 2 }, Line { quantity: 0 }],
        };
        let err: ApiError = payload.validate().unwrap_err().into();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("first_name"));
        assert_eq!(
            errors["email"],
            vec!["The email field must be a valid email address.".to_string()]
        );
        assert_eq!(
            errors["items.1.quantity"],
            vec!["The items.1.quantity field must be at least 1.".to_string()]
        );
        assert!(!errors.contains_key("items.0.quantity"));
    }

    #[test]
    fn summary_counts_remaining_errors() {
        let mut errors = FieldErrors::new();
        errors.insert("a".into(), vec!["first".into(), "second".into()]);
        errors.insert("b".into(), vec!["third".into()]);
        assert_eq!(
            ApiError::validation_message(&errors),
            "first (and 2 more errors)"
        );
    }
}
