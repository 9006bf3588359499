//! Owner API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    actions, resource_types, CreateOwnerRequest, Owner, OwnerWithPetCount, OwnerWithPets, Pet,
    Section, UpdateOwnerRequest, User,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::auth::require_section;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_email, validate_name, validate_optional_text, validate_phone, validate_uuid,
};

/// Optional list filters
#[derive(Debug, Deserialize, Default)]
pub struct OwnerListQuery {
    /// Case-insensitive substring match over name and email
    pub q: Option<String>,
}

fn validate_create_request(req: &CreateOwnerRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_name(&req.first_name, "First name") {
        errors.add("first_name", e);
    }
    if let Err(e) = validate_name(&req.last_name, "Last name") {
        errors.add("last_name", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_phone(&req.phone) {
        errors.add("phone", e);
    }
    if let Err(e) = validate_optional_text(&req.address, "Address", 200) {
        errors.add("address", e);
    }
    if let Err(e) = validate_optional_text(&req.city, "City", 100) {
        errors.add("city", e);
    }

    errors.finish()
}

fn validate_update_request(req: &UpdateOwnerRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref first_name) = req.first_name {
        if let Err(e) = validate_name(first_name, "First name") {
            errors.add("first_name", e);
        }
    }
    if let Some(ref last_name) = req.last_name {
        if let Err(e) = validate_name(last_name, "Last name") {
            errors.add("last_name", e);
        }
    }
    if let Some(ref email) = req.email {
        if let Err(e) = validate_email(email) {
            errors.add("email", e);
        }
    }
    if let Err(e) = validate_phone(&req.phone) {
        errors.add("phone", e);
    }
    if let Err(e) = validate_optional_text(&req.address, "Address", 200) {
        errors.add("address", e);
    }
    if let Err(e) = validate_optional_text(&req.city, "City", 100) {
        errors.add("city", e);
    }

    errors.finish()
}

/// List owners with pet counts, optionally filtered by a search term
pub async fn list_owners(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<OwnerListQuery>,
) -> Result<Json<Vec<OwnerWithPetCount>>, ApiError> {
    require_section(&user, Section::Owners)?;

    let owners: Vec<Owner> = match &query.q {
        Some(q) if !q.trim().is_empty() => {
            let pattern = format!("%{}%", q.trim());
            sqlx::query_as(
                r#"
                SELECT * FROM owners
                WHERE first_name LIKE ? COLLATE NOCASE
                   OR last_name LIKE ? COLLATE NOCASE
                   OR email LIKE ? COLLATE NOCASE
                ORDER BY created_at DESC
                "#,
            )
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .fetch_all(&state.db)
            .await?
        }
        _ => {
            sqlx::query_as("SELECT * FROM owners ORDER BY created_at DESC")
                .fetch_all(&state.db)
                .await?
        }
    };

    let mut results = Vec::with_capacity(owners.len());
    for owner in owners {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pets WHERE owner_id = ?")
            .bind(&owner.id)
            .fetch_one(&state.db)
            .await?;

        results.push(OwnerWithPetCount {
            id: owner.id,
            first_name: owner.first_name,
            last_name: owner.last_name,
            email: owner.email,
            phone: owner.phone,
            address: owner.address,
            city: owner.city,
            created_at: owner.created_at,
            updated_at: owner.updated_at,
            pet_count: count.0,
        });
    }

    Ok(Json(results))
}

/// Get an owner with their pets
pub async fn get_owner(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<OwnerWithPets>, ApiError> {
    require_section(&user, Section::Owners)?;

    if let Err(e) = validate_uuid(&id, "owner_id") {
        return Err(ApiError::validation_field("owner_id", e));
    }

    let owner = sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Owner not found"))?;

    let pets = sqlx::query_as::<_, Pet>(
        "SELECT * FROM pets WHERE owner_id = ? ORDER BY created_at DESC",
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(OwnerWithPets { owner, pets }))
}

/// Create a new owner
pub async fn create_owner(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Json(req): Json<CreateOwnerRequest>,
) -> Result<(StatusCode, Json<Owner>), ApiError> {
    require_section(&user, Section::Owners)?;
    validate_create_request(&req)?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO owners (id, first_name, last_name, email, phone, address, city, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.address)
    .bind(&req.city)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let owner = sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers, None);
    let name = format!("{} {}", owner.first_name, owner.last_name);
    audit_log(
        &state,
        actions::OWNER_CREATE,
        resource_types::OWNER,
        Some(&owner.id),
        Some(&name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(owner)))
}

/// Update an owner
pub async fn update_owner(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateOwnerRequest>,
) -> Result<Json<Owner>, ApiError> {
    require_section(&user, Section::Owners)?;

    if let Err(e) = validate_uuid(&id, "owner_id") {
        return Err(ApiError::validation_field("owner_id", e));
    }
    validate_update_request(&req)?;

    let _existing = sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Owner not found"))?;

    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE owners SET
            first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            email = COALESCE(?, email),
            phone = COALESCE(?, phone),
            address = COALESCE(?, address),
            city = COALESCE(?, city),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.address)
    .bind(&req.city)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let owner = sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers, None);
    let name = format!("{} {}", owner.first_name, owner.last_name);
    audit_log(
        &state,
        actions::OWNER_UPDATE,
        resource_types::OWNER,
        Some(&owner.id),
        Some(&name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(owner))
}

/// Delete an owner. Their pets (and those pets' visits) cascade.
pub async fn delete_owner(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_section(&user, Section::Owners)?;

    if let Err(e) = validate_uuid(&id, "owner_id") {
        return Err(ApiError::validation_field("owner_id", e));
    }

    let owner = sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Owner not found"))?;

    let result = sqlx::query("DELETE FROM owners WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Owner not found"));
    }

    let ip = extract_client_ip(&headers, None);
    let name = format!("{} {}", owner.first_name, owner.last_name);
    audit_log(
        &state,
        actions::OWNER_DELETE,
        resource_types::OWNER,
        Some(&owner.id),
        Some(&name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db;

    async fn test_state() -> Arc<AppState> {
        let pool = db::init_in_memory().await.unwrap();
        Arc::new(AppState::new(Config::default(), pool))
    }

    fn staff_user(role: &str) -> User {
        let now = chrono::Utc::now().to_rfc3339();
        User {
            id: Uuid::new_v4().to_string(),
            email: "staff@clinic.test".to_string(),
            password_hash: String::new(),
            name: "Staff".to_string(),
            role: role.to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn john_doe() -> CreateOwnerRequest {
        CreateOwnerRequest {
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: "john@doe.com".to_string(),
            phone: None,
            address: None,
            city: None,
        }
    }

    #[tokio::test]
    async fn create_then_list_round_trip() {
        let state = test_state().await;
        let doctor = staff_user("doctor");

        let (status, _) = create_owner(
            State(state.clone()),
            doctor.clone(),
            HeaderMap::new(),
            Json(john_doe()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(owners) = list_owners(
            State(state),
            doctor,
            Query(OwnerListQuery::default()),
        )
        .await
        .unwrap();

        let matching: Vec<_> = owners
            .iter()
            .filter(|o| o.first_name == "John" && o.last_name == "Doe" && o.email == "john@doe.com")
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].pet_count, 0);
    }

    #[tokio::test]
    async fn invalid_email_blocks_insert() {
        let state = test_state().await;
        let doctor = staff_user("doctor");

        let mut req = john_doe();
        req.email = "not-an-email".to_string();

        let err = create_owner(State(state.clone()), doctor, HeaderMap::new(), Json(req))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        // The failed create must leave no row behind
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM owners")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn customer_role_is_forbidden() {
        let state = test_state().await;
        let customer = staff_user("customer");

        let err = list_owners(State(state), customer, Query(OwnerListQuery::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn search_filters_by_substring() {
        let state = test_state().await;
        let admin = staff_user("admin");

        create_owner(State(state.clone()), admin.clone(), HeaderMap::new(), Json(john_doe()))
            .await
            .unwrap();
        let mut other = john_doe();
        other.first_name = "Emily".to_string();
        other.last_name = "Davis".to_string();
        other.email = "emily@davis.com".to_string();
        create_owner(State(state.clone()), admin.clone(), HeaderMap::new(), Json(other))
            .await
            .unwrap();

        let Json(found) = list_owners(
            State(state),
            admin,
            Query(OwnerListQuery {
                q: Some("davis".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].last_name, "Davis");
    }
}
