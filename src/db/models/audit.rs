//! Audit log models and queries for tracking user actions.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Audit log entry for a mutation performed through the API
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}

/// Response for listing audit logs with pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogListResponse {
    pub items: Vec<AuditLog>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// Query parameters for filtering audit logs
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    /// Filter by action (e.g., "owner.create")
    pub action: Option<String>,
    /// Filter by resource type (e.g., "pet", "visit")
    pub resource_type: Option<String>,
    /// Filter by user ID
    pub user_id: Option<String>,
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<i64>,
    /// Items per page (defaults to 50, max 100)
    pub per_page: Option<i64>,
}

/// Common audit action types
pub mod actions {
    pub const OWNER_CREATE: &str = "owner.create";
    pub const OWNER_UPDATE: &str = "owner.update";
    pub const OWNER_DELETE: &str = "owner.delete";

    pub const PET_CREATE: &str = "pet.create";
    pub const PET_UPDATE: &str = "pet.update";
    pub const PET_DELETE: &str = "pet.delete";

    pub const VISIT_CREATE: &str = "visit.create";
    pub const VISIT_UPDATE: &str = "visit.update";
    pub const VISIT_DELETE: &str = "visit.delete";

    pub const VET_CREATE: &str = "vet.create";
    pub const VET_UPDATE: &str = "vet.update";
    pub const VET_DELETE: &str = "vet.delete";

    pub const USER_LOGIN: &str = "user.login";
    pub const USER_REGISTER: &str = "user.register";
    pub const USER_PASSWORD_RESET: &str = "user.password_reset";
}

/// Resource type names used in audit rows
pub mod resource_types {
    pub const OWNER: &str = "owner";
    pub const PET: &str = "pet";
    pub const VISIT: &str = "visit";
    pub const VET: &str = "veterinarian";
    pub const USER: &str = "user";
}

/// Insert an audit log row
#[allow(clippy::too_many_arguments)]
pub async fn log_audit(
    pool: &SqlitePool,
    action: &str,
    resource_type: &str,
    resource_id: Option<&str>,
    resource_name: Option<&str>,
    user_id: Option<&str>,
    ip_address: Option<&str>,
    details: Option<serde_json::Value>,
) -> Result<(), sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let details_json = details.map(|d| d.to_string());

    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, action, resource_type, resource_id, resource_name, user_id, ip_address, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(action)
    .bind(resource_type)
    .bind(resource_id)
    .bind(resource_name)
    .bind(user_id)
    .bind(ip_address)
    .bind(&details_json)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// List audit logs, newest first, with optional filters and pagination
pub async fn list_audit_logs(
    pool: &SqlitePool,
    query: &AuditLogQuery,
) -> Result<AuditLogListResponse, sqlx::Error> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(50).clamp(1, 100);

    let mut where_clauses: Vec<&str> = Vec::new();
    if query.action.is_some() {
        where_clauses.push("action = ?");
    }
    if query.resource_type.is_some() {
        where_clauses.push("resource_type = ?");
    }
    if query.user_id.is_some() {
        where_clauses.push("user_id = ?");
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_clauses.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM audit_logs{}", where_sql);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    for value in [&query.action, &query.resource_type, &query.user_id]
        .into_iter()
        .flatten()
    {
        count_query = count_query.bind(value);
    }
    let (total,) = count_query.fetch_one(pool).await?;

    let list_sql = format!(
        "SELECT * FROM audit_logs{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        where_sql
    );
    let mut list_query = sqlx::query_as::<_, AuditLog>(&list_sql);
    for value in [&query.action, &query.resource_type, &query.user_id]
        .into_iter()
        .flatten()
    {
        list_query = list_query.bind(value);
    }
    let items = list_query
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(pool)
        .await?;

    let total_pages = if total == 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    };

    Ok(AuditLogListResponse {
        items,
        total,
        page,
        per_page,
        total_pages,
    })
}
