//! Visit API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    actions, resource_types, CreateVisitRequest, Section, UpdateVisitRequest, User, Visit,
    VisitStatus, VisitWithNames,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::auth::require_section;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_datetime, validate_optional_text, validate_uuid, validate_visit_status,
};

/// Optional list filters
#[derive(Debug, Deserialize, Default)]
pub struct VisitListQuery {
    /// Filter to one lifecycle status
    pub status: Option<String>,
}

pub(super) const VISIT_WITH_NAMES_SELECT: &str = r#"
    SELECT v.id, v.pet_id, v.doctor_id, v.visit_date, v.reason, v.status,
           v.notes, v.diagnosis, v.treatment,
           p.name AS pet_name,
           o.first_name AS owner_first_name, o.last_name AS owner_last_name,
           d.first_name AS doctor_first_name, d.last_name AS doctor_last_name,
           v.created_at, v.updated_at
    FROM visits v
    JOIN pets p ON p.id = v.pet_id
    JOIN owners o ON o.id = p.owner_id
    LEFT JOIN veterinarians d ON d.id = v.doctor_id
"#;

fn validate_create_request(req: &CreateVisitRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_uuid(&req.pet_id, "pet_id") {
        errors.add("pet_id", e);
    }
    if let Some(ref doctor_id) = req.doctor_id {
        if let Err(e) = validate_uuid(doctor_id, "doctor_id") {
            errors.add("doctor_id", e);
        }
    }
    if let Err(e) = validate_datetime(&req.visit_date, "Visit date") {
        errors.add("visit_date", e);
    }
    if req.reason.trim().is_empty() {
        errors.add("reason", "Reason is required");
    } else if req.reason.len() > 200 {
        errors.add("reason", "Reason is too long (max 200 characters)");
    }
    if let Some(ref status) = req.status {
        if let Err(e) = validate_visit_status(status) {
            errors.add("status", e);
        }
    }
    if let Err(e) = validate_optional_text(&req.notes, "Notes", 500) {
        errors.add("notes", e);
    }

    errors.finish()
}

fn validate_update_request(req: &UpdateVisitRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref doctor_id) = req.doctor_id {
        if let Err(e) = validate_uuid(doctor_id, "doctor_id") {
            errors.add("doctor_id", e);
        }
    }
    if let Some(ref visit_date) = req.visit_date {
        if let Err(e) = validate_datetime(visit_date, "Visit date") {
            errors.add("visit_date", e);
        }
    }
    if let Some(ref reason) = req.reason {
        if reason.trim().is_empty() {
            errors.add("reason", "Reason is required");
        } else if reason.len() > 200 {
            errors.add("reason", "Reason is too long (max 200 characters)");
        }
    }
    if let Some(ref status) = req.status {
        if let Err(e) = validate_visit_status(status) {
            errors.add("status", e);
        }
    }
    if let Err(e) = validate_optional_text(&req.notes, "Notes", 500) {
        errors.add("notes", e);
    }
    if let Err(e) = validate_optional_text(&req.diagnosis, "Diagnosis", 500) {
        errors.add("diagnosis", e);
    }
    if let Err(e) = validate_optional_text(&req.treatment, "Treatment", 500) {
        errors.add("treatment", e);
    }

    errors.finish()
}

async fn pet_exists(state: &AppState, pet_id: &str) -> Result<(), ApiError> {
    let pet: Option<(String,)> = sqlx::query_as("SELECT id FROM pets WHERE id = ?")
        .bind(pet_id)
        .fetch_optional(&state.db)
        .await?;
    if pet.is_none() {
        return Err(ApiError::not_found("Pet not found"));
    }
    Ok(())
}

async fn doctor_exists(state: &AppState, doctor_id: &str) -> Result<(), ApiError> {
    let doctor: Option<(String,)> = sqlx::query_as("SELECT id FROM veterinarians WHERE id = ?")
        .bind(doctor_id)
        .fetch_optional(&state.db)
        .await?;
    if doctor.is_none() {
        return Err(ApiError::not_found("Veterinarian not found"));
    }
    Ok(())
}

/// List visits with pet, owner and doctor names, optionally filtered by status
pub async fn list_visits(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<VisitListQuery>,
) -> Result<Json<Vec<VisitWithNames>>, ApiError> {
    require_section(&user, Section::Visits)?;

    let visits: Vec<VisitWithNames> = match &query.status {
        Some(status) => {
            if let Err(e) = validate_visit_status(status) {
                return Err(ApiError::validation_field("status", e));
            }
            let sql = format!(
                "{} WHERE v.status = ? ORDER BY v.visit_date DESC",
                VISIT_WITH_NAMES_SELECT
            );
            sqlx::query_as(&sql)
                .bind(status.to_lowercase())
                .fetch_all(&state.db)
                .await?
        }
        None => {
            let sql = format!("{} ORDER BY v.visit_date DESC", VISIT_WITH_NAMES_SELECT);
            sqlx::query_as(&sql).fetch_all(&state.db).await?
        }
    };

    Ok(Json(visits))
}

/// Get a single visit
pub async fn get_visit(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Visit>, ApiError> {
    require_section(&user, Section::Visits)?;

    if let Err(e) = validate_uuid(&id, "visit_id") {
        return Err(ApiError::validation_field("visit_id", e));
    }

    let visit = sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Visit not found"))?;

    Ok(Json(visit))
}

/// List the visits of one pet
pub async fn list_pet_visits(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(pet_id): Path<String>,
) -> Result<Json<Vec<Visit>>, ApiError> {
    require_section(&user, Section::Visits)?;

    if let Err(e) = validate_uuid(&pet_id, "pet_id") {
        return Err(ApiError::validation_field("pet_id", e));
    }
    pet_exists(&state, &pet_id).await?;

    let visits = sqlx::query_as::<_, Visit>(
        "SELECT * FROM visits WHERE pet_id = ? ORDER BY visit_date DESC",
    )
    .bind(&pet_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(visits))
}

/// Schedule a new visit. Status defaults to "scheduled" when omitted.
pub async fn create_visit(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Json(req): Json<CreateVisitRequest>,
) -> Result<(StatusCode, Json<Visit>), ApiError> {
    require_section(&user, Section::Visits)?;
    validate_create_request(&req)?;
    pet_exists(&state, &req.pet_id).await?;
    if let Some(ref doctor_id) = req.doctor_id {
        doctor_exists(&state, doctor_id).await?;
    }

    let status = match &req.status {
        // Validated above; normalize to the canonical spelling
        Some(s) => s.parse::<VisitStatus>().map_err(ApiError::bad_request)?,
        None => VisitStatus::Scheduled,
    };

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO visits (id, pet_id, doctor_id, visit_date, reason, status, notes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.pet_id)
    .bind(&req.doctor_id)
    .bind(&req.visit_date)
    .bind(&req.reason)
    .bind(status.to_string())
    .bind(&req.notes)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let visit = sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::VISIT_CREATE,
        resource_types::VISIT,
        Some(&visit.id),
        Some(&visit.reason),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(visit)))
}

/// Update a visit
pub async fn update_visit(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateVisitRequest>,
) -> Result<Json<Visit>, ApiError> {
    require_section(&user, Section::Visits)?;

    if let Err(e) = validate_uuid(&id, "visit_id") {
        return Err(ApiError::validation_field("visit_id", e));
    }
    validate_update_request(&req)?;

    let _existing = sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Visit not found"))?;

    if let Some(ref doctor_id) = req.doctor_id {
        doctor_exists(&state, doctor_id).await?;
    }

    let status = match &req.status {
        Some(s) => Some(
            s.parse::<VisitStatus>()
                .map_err(ApiError::bad_request)?
                .to_string(),
        ),
        None => None,
    };

    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE visits SET
            doctor_id = COALESCE(?, doctor_id),
            visit_date = COALESCE(?, visit_date),
            reason = COALESCE(?, reason),
            status = COALESCE(?, status),
            notes = COALESCE(?, notes),
            diagnosis = COALESCE(?, diagnosis),
            treatment = COALESCE(?, treatment),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.doctor_id)
    .bind(&req.visit_date)
    .bind(&req.reason)
    .bind(&status)
    .bind(&req.notes)
    .bind(&req.diagnosis)
    .bind(&req.treatment)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let visit = sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::VISIT_UPDATE,
        resource_types::VISIT,
        Some(&visit.id),
        Some(&visit.reason),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(visit))
}

/// Cancel-delete a visit record
pub async fn delete_visit(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_section(&user, Section::Visits)?;

    if let Err(e) = validate_uuid(&id, "visit_id") {
        return Err(ApiError::validation_field("visit_id", e));
    }

    let visit = sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Visit not found"))?;

    let result = sqlx::query("DELETE FROM visits WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Visit not found"));
    }

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::VISIT_DELETE,
        resource_types::VISIT,
        Some(&visit.id),
        Some(&visit.reason),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
