//! Audit log API endpoints and helpers.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use std::{net::SocketAddr, sync::Arc};

use crate::db::{list_audit_logs, log_audit, AuditLogListResponse, AuditLogQuery, Section, User};
use crate::AppState;

use super::auth::require_section;
use super::error::ApiError;

/// Extract client IP address from request headers or connection info.
/// Checks X-Forwarded-For and X-Real-IP first (reverse proxy scenarios),
/// then falls back to the connection info.
pub fn extract_client_ip(headers: &HeaderMap, conn_info: Option<&SocketAddr>) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first_ip) = forwarded.split(',').next() {
            let ip = first_ip.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|h| h.to_str().ok()) {
        let ip = real_ip.trim();
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }

    conn_info.map(|addr| addr.ip().to_string())
}

/// Record an audit event. Failures are logged, never surfaced: an audit
/// write must not fail the mutation it describes.
#[allow(clippy::too_many_arguments)]
pub async fn audit_log(
    state: &AppState,
    action: &str,
    resource_type: &str,
    resource_id: Option<&str>,
    resource_name: Option<&str>,
    user_id: Option<&str>,
    ip_address: Option<&str>,
    details: Option<serde_json::Value>,
) {
    if let Err(e) = log_audit(
        &state.db,
        action,
        resource_type,
        resource_id,
        resource_name,
        user_id,
        ip_address,
        details,
    )
    .await
    {
        tracing::warn!(
            action = action,
            resource_type = resource_type,
            error = %e,
            "Failed to create audit log entry"
        );
    }
}

/// List audit logs with filtering and pagination. Admin only.
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<AuditLogListResponse>, ApiError> {
    require_section(&user, Section::Audit)?;

    let result = list_audit_logs(&state.db, &query).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 192.168.1.1".parse().unwrap());
        assert_eq!(extract_client_ip(&headers, None), Some("10.0.0.1".to_string()));
    }

    #[test]
    fn falls_back_to_real_ip_then_conn_info() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());
        assert_eq!(extract_client_ip(&headers, None), Some("10.0.0.2".to_string()));

        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(
            extract_client_ip(&HeaderMap::new(), Some(&addr)),
            Some("127.0.0.1".to_string())
        );
        assert_eq!(extract_client_ip(&HeaderMap::new(), None), None);
    }
}
