use std::str::FromStr;

use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::auth::{AuthUser, HR_STAFF},
    error::{ApiError, ApiResult},
    model::training::{Training, TrainingStatistics, TrainingStatus, TrainingType},
    utils::{
        amount::round2,
        db_utils::{Filter, SqlValue, count_by, delete_by_id, fetch_page, find_by_id, update_from},
        pagination::{Pagination, TrainingPage},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "trainings";
const RESOURCE: &str = "Training";
const UPDATABLE: &[&str] = &[
    "employee_id",
    "title",
    "training_type",
    "provider",
    "venue",
    "start_date",
    "end_date",
    "hours",
    "status",
    "remarks",
];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTraining {
    pub employee_id: u64,
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Records Management Seminar")]
    pub title: String,
    pub training_type: TrainingType,
    #[validate(length(max = 255))]
    pub provider: Option<String>,
    #[validate(length(max = 255))]
    pub venue: Option<String>,
    #[schema(example = "2026-03-02")]
    pub start_date: NaiveDate,
    #[schema(example = "2026-03-04")]
    pub end_date: NaiveDate,
    #[validate(range(min = 0.0))]
    #[schema(example = 24.0)]
    pub hours: f64,
    pub status: Option<TrainingStatus>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateTraining {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<u64>,
    #[validate(length(min = 1, max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_type: Option<TrainingType>,
    #[validate(length(max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[validate(length(max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TrainingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TrainingQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub employee_id: Option<u64>,
    pub training_type: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

fn check_dates(start: NaiveDate, end: NaiveDate) -> ApiResult<()> {
    if end < start {
        return Err(ApiError::invalid(
            "end_date",
            "The end date must be a date after or equal to start date.",
        ));
    }
    Ok(())
}

async fn page_of(
    pool: &MySqlPool,
    filter: Filter,
    query: &PageQuery,
) -> ApiResult<HttpResponse> {
    let page = fetch_page::<Training>(
        pool,
        "*",
        TABLE,
        &filter,
        "start_date DESC, id DESC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/trainings",
    params(TrainingQuery),
    responses((status = 200, description = "Paginated trainings", body = TrainingPage)),
    tag = "Trainings",
    security(("bearer_auth" = []))
)]
pub async fn list_trainings(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TrainingQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("employee_id", query.employee_id)
        .eq("training_type", query.training_type.clone())
        .eq("status", query.status.clone());

    let paging = PageQuery {
        page: query.page,
        per_page: query.per_page,
    };
    page_of(pool.get_ref(), filter, &paging).await
}

#[utoipa::path(
    get,
    path = "/api/trainings/statistics",
    responses((status = 200, description = "Training counts and hours", body = TrainingStatistics)),
    tag = "Trainings",
    security(("bearer_auth" = []))
)]
pub async fn training_statistics(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    let (total, completed, total_hours): (i64, i64, f64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            CAST(COALESCE(SUM(status = 'completed'), 0) AS SIGNED),
            COALESCE(SUM(CASE WHEN status = 'completed' THEN hours ELSE 0 END), 0)
        FROM trainings
        "#,
    )
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(TrainingStatistics {
        total,
        completed,
        total_hours: round2(total_hours),
        by_type: count_by(pool.get_ref(), TABLE, "training_type").await?,
        by_status: count_by(pool.get_ref(), TABLE, "status").await?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/trainings/type/{type}",
    params(("type", Path, description = "Training type"), PageQuery),
    responses(
        (status = 200, description = "Trainings of the type", body = TrainingPage),
        (status = 422, description = "Unknown training type")
    ),
    tag = "Trainings",
    security(("bearer_auth" = []))
)]
pub async fn trainings_by_type(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    let training_type = TrainingType::from_str(&path)
        .map_err(|_| ApiError::invalid("type", "The selected type is invalid."))?;

    let filter = Filter::new().eq("training_type", Some(training_type.as_ref()));
    page_of(pool.get_ref(), filter, &query).await
}

#[utoipa::path(
    get,
    path = "/api/trainings/year/{year}",
    params(("year", Path, description = "Year of the start date"), PageQuery),
    responses((status = 200, description = "Trainings that started in the year", body = TrainingPage)),
    tag = "Trainings",
    security(("bearer_auth" = []))
)]
pub async fn trainings_by_year(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i32>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new().raw("YEAR(start_date) = ?", vec![SqlValue::from(path.into_inner())]);
    page_of(pool.get_ref(), filter, &query).await
}

#[utoipa::path(
    get,
    path = "/api/trainings/employee/{employee_id}",
    params(("employee_id", Path, description = "Employee ID"), PageQuery),
    responses((status = 200, description = "Trainings of the employee", body = TrainingPage)),
    tag = "Trainings",
    security(("bearer_auth" = []))
)]
pub async fn employee_trainings(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new().eq("employee_id", Some(path.into_inner()));
    page_of(pool.get_ref(), filter, &query).await
}

#[utoipa::path(
    get,
    path = "/api/trainings/employee/{employee_id}/completed",
    params(("employee_id", Path, description = "Employee ID"), PageQuery),
    responses((status = 200, description = "Completed trainings of the employee", body = TrainingPage)),
    tag = "Trainings",
    security(("bearer_auth" = []))
)]
pub async fn employee_completed_trainings(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("employee_id", Some(path.into_inner()))
        .eq("status", Some(TrainingStatus::Completed.as_ref()));
    page_of(pool.get_ref(), filter, &query).await
}

#[utoipa::path(
    post,
    path = "/api/trainings",
    request_body = CreateTraining,
    responses(
        (status = 201, description = "Training created", body = Training),
        (status = 422, description = "Validation error")
    ),
    tag = "Trainings",
    security(("bearer_auth" = []))
)]
pub async fn create_training(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTraining>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    payload.validate()?;
    check_dates(payload.start_date, payload.end_date)?;

    let result = sqlx::query(
        r#"
        INSERT INTO trainings
            (employee_id, title, training_type, provider, venue, start_date, end_date, hours, status, remarks)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(&payload.title)
    .bind(payload.training_type.as_ref())
    .bind(&payload.provider)
    .bind(&payload.venue)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(round2(payload.hours))
    .bind(payload.status.unwrap_or(TrainingStatus::Scheduled).as_ref())
    .bind(&payload.remarks)
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        // only the employee FK can fail here
        ApiError::Conflict(_) => ApiError::invalid("employee_id", "The selected employee id is invalid."),
        other => other,
    })?;

    let training: Training = find_by_id(pool.get_ref(), TABLE, result.last_insert_id(), RESOURCE).await?;
    info!(training_id = training.id, employee_id = training.employee_id, "Training created");

    Ok(response::created("Training created successfully.", training))
}

#[utoipa::path(
    get,
    path = "/api/trainings/{id}",
    params(("id", Path, description = "Training ID")),
    responses(
        (status = 200, description = "Training", body = Training),
        (status = 404, description = "Training not found", body = MessageResponse)
    ),
    tag = "Trainings",
    security(("bearer_auth" = []))
)]
pub async fn get_training(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let training: Training = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    Ok(response::data(training))
}

#[utoipa::path(
    put,
    path = "/api/trainings/{id}",
    params(("id", Path, description = "Training ID")),
    request_body = UpdateTraining,
    responses(
        (status = 200, description = "Training updated", body = Training),
        (status = 404, description = "Training not found", body = MessageResponse)
    ),
    tag = "Trainings",
    security(("bearer_auth" = []))
)]
pub async fn update_training(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateTraining>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let current: Training = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    check_dates(
        payload.start_date.unwrap_or(current.start_date),
        payload.end_date.unwrap_or(current.end_date),
    )?;

    update_from(pool.get_ref(), TABLE, UPDATABLE, id, &payload.into_inner()).await?;

    let training: Training = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    Ok(response::ok_with("Training updated successfully.", training))
}

#[utoipa::path(
    delete,
    path = "/api/trainings/{id}",
    params(("id", Path, description = "Training ID")),
    responses(
        (status = 200, description = "Training deleted", body = MessageResponse),
        (status = 404, description = "Training not found", body = MessageResponse)
    ),
    tag = "Trainings",
    security(("bearer_auth" = []))
)]
pub async fn delete_training(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    let id = path.into_inner();

    find_by_id::<Training, _>(pool.get_ref(), TABLE, id, RESOURCE).await?;
    delete_by_id(pool.get_ref(), TABLE, id).await?;

    Ok(response::message("Training deleted successfully."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn single_day_training_is_allowed() {
        assert!(check_dates(date(2), date(2)).is_ok());
    }

    #[test]
    fn end_before_start_is_keyed_on_end_date() {
        let Err(ApiError::Validation(errors)) = check_dates(date(4), date(2)) else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("end_date"));
    }

    #[test]
    fn unknown_training_type_is_rejected() {
        let body = r#"{"employee_id":1,"title":"X","training_type":"retreat",
            "start_date":"2026-03-02","end_date":"2026-03-02","hours":8}"#;
        assert!(serde_json::from_str::<CreateTraining>(body).is_err());
    }
}
