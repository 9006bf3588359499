//! Veterinarian API endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    actions, resource_types, CreateVetRequest, Section, UpdateVetRequest, User, Veterinarian,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::auth::require_section;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_email, validate_experience_years, validate_name, validate_optional_text,
    validate_phone, validate_uuid,
};

fn validate_create_request(req: &CreateVetRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_name(&req.first_name, "First name") {
        errors.add("first_name", e);
    }
    if let Err(e) = validate_name(&req.last_name, "Last name") {
        errors.add("last_name", e);
    }
    if let Err(e) = validate_name(&req.specialty, "Specialty") {
        errors.add("specialty", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_phone(&req.phone) {
        errors.add("phone", e);
    }
    if let Err(e) = validate_experience_years(&req.experience_years) {
        errors.add("experience_years", e);
    }
    if let Err(e) = validate_optional_text(&req.availability, "Availability", 100) {
        errors.add("availability", e);
    }

    errors.finish()
}

fn validate_update_request(req: &UpdateVetRequest) -> Result<(), ApiError> {
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
    if let Some(ref specialty) = req.specialty {
        if let Err(e) = validate_name(specialty, "Specialty") {
            errors.add("specialty", e);
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
    if let Err(e) = validate_experience_years(&req.experience_years) {
        errors.add("experience_years", e);
    }
    if let Err(e) = validate_optional_text(&req.availability, "Availability", 100) {
        errors.add("availability", e);
    }

    errors.finish()
}

/// List veterinarians. Any authenticated user may read the roster,
/// since scheduling a visit needs the doctor list.
pub async fn list_vets(
    State(state): State<Arc<AppState>>,
    _user: User,
) -> Result<Json<Vec<Veterinarian>>, ApiError> {
    let vets = sqlx::query_as::<_, Veterinarian>(
        "SELECT * FROM veterinarians ORDER BY last_name, first_name",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(vets))
}

/// Get a single veterinarian
pub async fn get_vet(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
) -> Result<Json<Veterinarian>, ApiError> {
    if let Err(e) = validate_uuid(&id, "vet_id") {
        return Err(ApiError::validation_field("vet_id", e));
    }

    let vet = sqlx::query_as::<_, Veterinarian>("SELECT * FROM veterinarians WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Veterinarian not found"))?;

    Ok(Json(vet))
}

/// Add a veterinarian to the roster. Admin only.
pub async fn create_vet(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Json(req): Json<CreateVetRequest>,
) -> Result<(StatusCode, Json<Veterinarian>), ApiError> {
    require_section(&user, Section::Vets)?;
    validate_create_request(&req)?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO veterinarians (id, first_name, last_name, specialty, email, phone,
                                   experience_years, availability, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.specialty)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(req.experience_years)
    .bind(&req.availability)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let vet = sqlx::query_as::<_, Veterinarian>("SELECT * FROM veterinarians WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let name = format!("{} {}", vet.first_name, vet.last_name);
    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::VET_CREATE,
        resource_types::VET,
        Some(&vet.id),
        Some(&name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(vet)))
}

/// Update a veterinarian. Admin only.
pub async fn update_vet(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateVetRequest>,
) -> Result<Json<Veterinarian>, ApiError> {
    require_section(&user, Section::Vets)?;

    if let Err(e) = validate_uuid(&id, "vet_id") {
        return Err(ApiError::validation_field("vet_id", e));
    }
    validate_update_request(&req)?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM veterinarians WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Veterinarian not found"));
    }

    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE veterinarians SET
            first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            specialty = COALESCE(?, specialty),
            email = COALESCE(?, email),
            phone = COALESCE(?, phone),
            experience_years = COALESCE(?, experience_years),
            availability = COALESCE(?, availability),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.specialty)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(req.experience_years)
    .bind(&req.availability)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let vet = sqlx::query_as::<_, Veterinarian>("SELECT * FROM veterinarians WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let name = format!("{} {}", vet.first_name, vet.last_name);
    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::VET_UPDATE,
        resource_types::VET,
        Some(&vet.id),
        Some(&name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(vet))
}

/// Remove a veterinarian. Admin only. Visits that referenced the doctor
/// keep their record with doctor_id set to NULL.
pub async fn delete_vet(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_section(&user, Section::Vets)?;

    if let Err(e) = validate_uuid(&id, "vet_id") {
        return Err(ApiError::validation_field("vet_id", e));
    }

    let vet = sqlx::query_as::<_, Veterinarian>("SELECT * FROM veterinarians WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Veterinarian not found"))?;

    let result = sqlx::query("DELETE FROM veterinarians WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Veterinarian not found"));
    }

    let name = format!("{} {}", vet.first_name, vet.last_name);
    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::VET_DELETE,
        resource_types::VET,
        Some(&vet.id),
        Some(&name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
