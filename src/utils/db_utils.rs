use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::query::{Query, QueryAs, QueryScalar};
use sqlx::{Executor, FromRow, MySql, MySqlConnection, MySqlPool};

use crate::error::{ApiError, ApiResult};
use crate::utils::pagination::{Paginated, Pagination};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

impl SqlValue {
    /// Current UTC time for `*_at` stamps; the pool's session zone is UTC.
    pub fn now() -> Self {
        SqlValue::DateTime(Utc::now().naive_utc())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I64(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

pub fn bind_query<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: Vec<SqlValue>,
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

pub fn bind_query_as<'q, O>(
    mut query: QueryAs<'q, MySql, O, MySqlArguments>,
    values: Vec<SqlValue>,
) -> QueryAs<'q, MySql, O, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

pub fn bind_query_scalar<'q, O>(
    mut query: QueryScalar<'q, MySql, O, MySqlArguments>,
    values: Vec<SqlValue>,
) -> QueryScalar<'q, MySql, O, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

/// LIKE escape character. Not `\\`, whose meaning depends on `NO_BACKSLASH_ESCAPES`.
const LIKE_ESCAPE: char = '!';

/// Makes `%`, `_` and the escape character match literally.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// ===============================
/// WHERE clause builder
/// ===============================
#[derive(Debug, Default)]
pub struct Filter {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = ?` when a value is present.
    pub fn eq<V: Into<SqlValue>>(mut self, column: &str, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.conditions.push(format!("{} = ?", column));
            self.values.push(v.into());
        }
        self
    }

    /// `(a LIKE ? OR b LIKE ? ...)` for a non-blank term.
    pub fn like_any(mut self, columns: &[&str], term: Option<&str>) -> Self {
        let term = match term.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return self,
        };
        let like = format!("%{}%", escape_like(term));
        let parts: Vec<String> = columns
            .iter()
            .map(|c| format!("{} LIKE ? ESCAPE '{}'", c, LIKE_ESCAPE))
            .collect();
        self.conditions.push(format!("({})", parts.join(" OR ")));
        for _ in columns {
            self.values.push(SqlValue::String(like.clone()));
        }
        self
    }

    /// Arbitrary condition with its own placeholders.
    pub fn raw(mut self, condition: &str, values: Vec<SqlValue>) -> Self {
        self.conditions.push(condition.to_string());
        self.values.extend(values);
        self
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> Vec<SqlValue> {
        self.values.clone()
    }
}

/// Runs a COUNT and a LIMIT/OFFSET query over the same filter.
pub async fn fetch_page<T>(
    pool: &MySqlPool,
    columns: &str,
    from: &str,
    filter: &Filter,
    order_by: &str,
    pagination: Pagination,
) -> Result<Paginated<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    let where_sql = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM {}{}", from, where_sql);
    tracing::debug!(sql = %count_sql, "Counting rows");
    let total: i64 = bind_query_scalar(sqlx::query_scalar(&count_sql), filter.values())
        .fetch_one(pool)
        .await?;

    let data_sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
        columns, from, where_sql, order_by
    );
    tracing::debug!(sql = %data_sql, page = pagination.page, per_page = pagination.per_page, "Fetching page");
    let data: Vec<T> = bind_query_as(sqlx::query_as::<_, T>(&data_sql), filter.values())
        .bind(pagination.per_page)
        .bind(pagination.offset())
        .fetch_all(pool)
        .await?;

    Ok(Paginated {
        data,
        page: pagination.page,
        per_page: pagination.per_page,
        total,
    })
}

/// Loads one row by primary key, 404 `"<resource> not found."` when absent.
pub async fn find_by_id<'c, T, E>(executor: E, table: &str, id: u64, resource: &str) -> ApiResult<T>
where
    E: Executor<'c, Database = MySql>,
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    let sql = format!("SELECT * FROM {} WHERE id = ?", table);
    sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| ApiError::not_found(resource))
}

/// Same as `find_by_id` but takes a row lock for the rest of the transaction.
pub async fn lock_by_id<T>(
    conn: &mut MySqlConnection,
    table: &str,
    id: u64,
    resource: &str,
) -> ApiResult<T>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    let sql = format!("SELECT * FROM {} WHERE id = ? FOR UPDATE", table);
    sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::not_found(resource))
}

pub async fn delete_by_id(pool: &MySqlPool, table: &str, id: u64) -> ApiResult<()> {
    let sql = format!("DELETE FROM {} WHERE id = ?", table);
    sqlx::query(&sql).bind(id).execute(pool).await?;
    Ok(())
}

/// Moves a document to `status`, stamping extra columns (e.g. `approved_by = ?`).
pub async fn set_status(
    conn: &mut MySqlConnection,
    table: &str,
    id: u64,
    status: &str,
    stamps: &[(&str, SqlValue)],
) -> Result<(), sqlx::Error> {
    let mut columns = vec!["status = ?".to_string()];
    let mut values = vec![SqlValue::from(status)];
    for (column, value) in stamps {
        columns.push(format!("{} = ?", column));
        values.push(value.clone());
    }
    values.push(SqlValue::U64(id));

    let sql = format!("UPDATE {} SET {} WHERE id = ?", table, columns.join(", "));
    bind_query(sqlx::query(&sql), values).execute(conn).await?;
    Ok(())
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Only keys listed in `allowed` may appear in the payload.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[&str],
    id_value: u64,
) -> ApiResult<SqlUpdate> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::invalid("body", "The payload must be a JSON object."))?;

    if obj.is_empty() {
        return Err(ApiError::invalid("body", "No fields provided for update."));
    }

    let mut columns = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        if !allowed.contains(&key.as_str()) {
            return Err(ApiError::invalid(
                key,
                format!("The {} field cannot be updated.", key.replace('_', " ")),
            ));
        }
        columns.push(format!("{} = ?", key));

        // Convert JSON values → SqlValue
        let sql_value = match value {
            Value::String(s) => {
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    SqlValue::Date(d)
                } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                    SqlValue::DateTime(dt)
                } else {
                    SqlValue::String(s.clone())
                }
            }
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::I64(i)
                } else if let Some(u) = n.as_u64() {
                    SqlValue::U64(u)
                } else if let Some(f) = n.as_f64() {
                    SqlValue::F64(f)
                } else {
                    return Err(ApiError::invalid(key, "Unsupported number."));
                }
            }
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Null => SqlValue::Null,
            _ => {
                return Err(ApiError::invalid(key, "Unsupported JSON value type."));
            }
        };
        values.push(sql_value);
    }

    let sql = format!("UPDATE {} SET {} WHERE id = ?", table, columns.join(", "));

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(conn: &mut MySqlConnection, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let result = bind_query(sqlx::query(&update.sql), update.values)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Typed update DTO → partial UPDATE. `None` fields are skipped by serde.
pub async fn update_from<T: serde::Serialize>(
    pool: &MySqlPool,
    table: &str,
    allowed: &[&str],
    id: u64,
    payload: &T,
) -> ApiResult<()> {
    let mut conn = pool.acquire().await?;
    update_in(&mut conn, table, allowed, id, payload).await
}

/// `update_from` on an open connection or transaction.
pub async fn update_in<T: serde::Serialize>(
    conn: &mut MySqlConnection,
    table: &str,
    allowed: &[&str],
    id: u64,
    payload: &T,
) -> ApiResult<()> {
    let value = serde_json::to_value(payload).map_err(|e| ApiError::Internal(e.into()))?;
    let update = build_update_sql(table, &value, allowed, id)?;
    execute_update(conn, update).await?;
    Ok(())
}

/// True when the DTO serializes to a non-empty object.
pub fn has_changes<T: serde::Serialize>(payload: &T) -> bool {
    serde_json::to_value(payload)
        .ok()
        .and_then(|v| v.as_object().map(|o| !o.is_empty()))
        .unwrap_or(false)
}

/// Counts rows grouped by a column, e.g. statistics breakdowns.
pub async fn count_by(
    pool: &MySqlPool,
    table: &str,
    column: &str,
) -> Result<std::collections::BTreeMap<String, i64>, sqlx::Error> {
    let sql = format!(
        "SELECT COALESCE({col}, 'unspecified'), COUNT(*) FROM {table} GROUP BY {col}",
        col = column,
        table = table
    );
    let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_sql_binds_values_in_key_order_then_id() {
        let payload = json!({ "name": "Acme", "is_active": false, "hire": "2026-01-02" });
        let update = build_update_sql("suppliers", &payload, &["name", "is_active", "hire"], 7).unwrap();
        assert!(update.sql.starts_with("UPDATE suppliers SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert_eq!(update.values.len(), 4);
        assert_eq!(update.values.last(), Some(&SqlValue::U64(7)));
        assert!(update.values.contains(&SqlValue::Bool(false)));
        assert!(update
            .values
            .contains(&SqlValue::Date(NaiveDate::from_ymd_opt(2026, 1, 2).unwrap())));
    }

    #[test]
    fn update_sql_rejects_unknown_columns() {
        let payload = json!({ "quantity_on_hand": 1000 });
        let err = build_update_sql("inventory_items", &payload, &["name"], 1).unwrap_err();
        match err {
            ApiError::Validation(errors) => assert!(errors.contains_key("quantity_on_hand")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn update_sql_rejects_empty_payload() {
        assert!(build_update_sql("budgets", &json!({}), &["department"], 1).is_err());
        assert!(build_update_sql("budgets", &json!([1, 2]), &["department"], 1).is_err());
    }

    #[test]
    fn float_values_keep_their_fraction() {
        let update = build_update_sql("employees", &json!({ "monthly_salary": 35000.5 }), &["monthly_salary"], 1).unwrap();
        assert_eq!(update.values[0], SqlValue::F64(35000.5));
    }

    #[test]
    fn filter_builds_where_clause_and_values() {
        let filter = Filter::new()
            .eq("status", Some("active"))
            .eq::<u64>("department_id", None)
            .like_any(&["name", "email"], Some(" acme "));
        assert_eq!(
            filter.where_clause(),
            " WHERE status = ? AND (name LIKE ? ESCAPE '!' OR email LIKE ? ESCAPE '!')"
        );
        assert_eq!(
            filter.values(),
            vec![
                SqlValue::String("active".into()),
                SqlValue::String("%acme%".into()),
                SqlValue::String("%acme%".into()),
            ]
        );
    }

    #[test]
    fn skipped_fields_do_not_count_as_changes() {
        #[derive(serde::Serialize)]
        struct Changes {
            #[serde(skip_serializing_if = "Option::is_none")]
            purpose: Option<String>,
        }
        assert!(!has_changes(&Changes { purpose: None }));
        assert!(has_changes(&Changes { purpose: Some("Q2 supplies".into()) }));
    }

    #[test]
    fn wildcards_in_search_terms_match_literally() {
        assert_eq!(escape_like("50%_off!"), "50!%!_off!!");
        assert_eq!(escape_like("plain"), "plain");

        let filter = Filter::new().like_any(&["code"], Some("A_1"));
        assert_eq!(filter.values(), vec![SqlValue::String("%A!_1%".into())]);
    }

    #[test]
    fn blank_search_term_is_ignored() {
        let filter = Filter::new().like_any(&["name"], Some("   "));
        assert_eq!(filter.where_clause(), "");
    }
}
