use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

/// Body of delete and other data-less responses.
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Supplier deleted successfully.")]
    pub message: String,
}

pub fn message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse {
        message: message.to_string(),
    })
}

pub fn data<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "data": data }))
}

pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Created().json(json!({ "message": message, "data": data }))
}

pub fn ok_with<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": message, "data": data }))
}
