//! Pet API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    actions, resource_types, CreatePetRequest, Pet, PetWithOwner, Section, UpdatePetRequest, User,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::auth::require_section;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_date, validate_name, validate_optional_text, validate_uuid, validate_weight,
};

/// Optional list filters
#[derive(Debug, Deserialize, Default)]
pub struct PetListQuery {
    /// Case-insensitive substring match over name, species and breed
    pub q: Option<String>,
}

fn validate_create_request(req: &CreatePetRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_name(&req.name, "Pet name") {
        errors.add("name", e);
    }
    if req.species.trim().is_empty() {
        errors.add("species", "Species is required");
    }
    if let Err(e) = validate_optional_text(&req.breed, "Breed", 50) {
        errors.add("breed", e);
    }
    if let Some(ref birth_date) = req.birth_date {
        if let Err(e) = validate_date(birth_date, "Birth date") {
            errors.add("birth_date", e);
        }
    }
    if let Err(e) = validate_weight(&req.weight) {
        errors.add("weight", e);
    }
    if let Err(e) = validate_optional_text(&req.notes, "Notes", 500) {
        errors.add("notes", e);
    }
    if let Err(e) = validate_uuid(&req.owner_id, "owner_id") {
        errors.add("owner_id", e);
    }

    errors.finish()
}

fn validate_update_request(req: &UpdatePetRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref name) = req.name {
        if let Err(e) = validate_name(name, "Pet name") {
            errors.add("name", e);
        }
    }
    if let Some(ref species) = req.species {
        if species.trim().is_empty() {
            errors.add("species", "Species is required");
        }
    }
    if let Err(e) = validate_optional_text(&req.breed, "Breed", 50) {
        errors.add("breed", e);
    }
    if let Some(ref birth_date) = req.birth_date {
        if let Err(e) = validate_date(birth_date, "Birth date") {
            errors.add("birth_date", e);
        }
    }
    if let Err(e) = validate_weight(&req.weight) {
        errors.add("weight", e);
    }
    if let Err(e) = validate_optional_text(&req.notes, "Notes", 500) {
        errors.add("notes", e);
    }
    if let Some(ref owner_id) = req.owner_id {
        if let Err(e) = validate_uuid(owner_id, "owner_id") {
            errors.add("owner_id", e);
        }
    }

    errors.finish()
}

async fn owner_exists(state: &AppState, owner_id: &str) -> Result<(), ApiError> {
    let owner: Option<(String,)> = sqlx::query_as("SELECT id FROM owners WHERE id = ?")
        .bind(owner_id)
        .fetch_optional(&state.db)
        .await?;
    if owner.is_none() {
        return Err(ApiError::not_found("Owner not found"));
    }
    Ok(())
}

/// List pets with owner names, optionally filtered by a search term
pub async fn list_pets(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<PetListQuery>,
) -> Result<Json<Vec<PetWithOwner>>, ApiError> {
    require_section(&user, Section::Pets)?;

    let base = r#"
        SELECT p.id, p.name, p.species, p.breed, p.birth_date, p.weight, p.notes,
               p.owner_id, o.first_name AS owner_first_name, o.last_name AS owner_last_name,
               p.created_at, p.updated_at
        FROM pets p
        JOIN owners o ON o.id = p.owner_id
    "#;

    let pets: Vec<PetWithOwner> = match &query.q {
        Some(q) if !q.trim().is_empty() => {
            let pattern = format!("%{}%", q.trim());
            let sql = format!(
                "{} WHERE p.name LIKE ? COLLATE NOCASE OR p.species LIKE ? COLLATE NOCASE OR p.breed LIKE ? COLLATE NOCASE ORDER BY p.created_at DESC",
                base
            );
            sqlx::query_as(&sql)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .fetch_all(&state.db)
                .await?
        }
        _ => {
            let sql = format!("{} ORDER BY p.created_at DESC", base);
            sqlx::query_as(&sql).fetch_all(&state.db).await?
        }
    };

    Ok(Json(pets))
}

/// Get a single pet
pub async fn get_pet(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Pet>, ApiError> {
    require_section(&user, Section::Pets)?;

    if let Err(e) = validate_uuid(&id, "pet_id") {
        return Err(ApiError::validation_field("pet_id", e));
    }

    let pet = sqlx::query_as::<_, Pet>("SELECT * FROM pets WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Pet not found"))?;

    Ok(Json(pet))
}

/// List the pets of one owner
pub async fn list_owner_pets(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(owner_id): Path<String>,
) -> Result<Json<Vec<Pet>>, ApiError> {
    require_section(&user, Section::Pets)?;

    if let Err(e) = validate_uuid(&owner_id, "owner_id") {
        return Err(ApiError::validation_field("owner_id", e));
    }
    owner_exists(&state, &owner_id).await?;

    let pets = sqlx::query_as::<_, Pet>(
        "SELECT * FROM pets WHERE owner_id = ? ORDER BY created_at DESC",
    )
    .bind(&owner_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(pets))
}

/// Register a new pet
pub async fn create_pet(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Json(req): Json<CreatePetRequest>,
) -> Result<(StatusCode, Json<Pet>), ApiError> {
    require_section(&user, Section::Pets)?;
    validate_create_request(&req)?;
    owner_exists(&state, &req.owner_id).await?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO pets (id, name, species, breed, birth_date, weight, notes, owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.name)
    .bind(&req.species)
    .bind(&req.breed)
    .bind(&req.birth_date)
    .bind(req.weight)
    .bind(&req.notes)
    .bind(&req.owner_id)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let pet = sqlx::query_as::<_, Pet>("SELECT * FROM pets WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::PET_CREATE,
        resource_types::PET,
        Some(&pet.id),
        Some(&pet.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(pet)))
}

/// Update a pet
pub async fn update_pet(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdatePetRequest>,
) -> Result<Json<Pet>, ApiError> {
    require_section(&user, Section::Pets)?;

    if let Err(e) = validate_uuid(&id, "pet_id") {
        return Err(ApiError::validation_field("pet_id", e));
    }
    validate_update_request(&req)?;

    let _existing = sqlx::query_as::<_, Pet>("SELECT * FROM pets WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Pet not found"))?;

    if let Some(ref owner_id) = req.owner_id {
        owner_exists(&state, owner_id).await?;
    }

    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE pets SET
            name = COALESCE(?, name),
            species = COALESCE(?, species),
            breed = COALESCE(?, breed),
            birth_date = COALESCE(?, birth_date),
            weight = COALESCE(?, weight),
            notes = COALESCE(?, notes),
            owner_id = COALESCE(?, owner_id),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.name)
    .bind(&req.species)
    .bind(&req.breed)
    .bind(&req.birth_date)
    .bind(req.weight)
    .bind(&req.notes)
    .bind(&req.owner_id)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let pet = sqlx::query_as::<_, Pet>("SELECT * FROM pets WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::PET_UPDATE,
        resource_types::PET,
        Some(&pet.id),
        Some(&pet.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(pet))
}

/// Delete a pet. Its visits cascade.
pub async fn delete_pet(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_section(&user, Section::Pets)?;

    if let Err(e) = validate_uuid(&id, "pet_id") {
        return Err(ApiError::validation_field("pet_id", e));
    }

    let pet = sqlx::query_as::<_, Pet>("SELECT * FROM pets WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Pet not found"))?;

    let result = sqlx::query("DELETE FROM pets WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Pet not found"));
    }

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::PET_DELETE,
        resource_types::PET,
        Some(&pet.id),
        Some(&pet.name),
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
    use crate::db::{self, CreateOwnerRequest};

    async fn test_state() -> Arc<AppState> {
        let pool = db::init_in_memory().await.unwrap();
        Arc::new(AppState::new(Config::default(), pool))
    }

    fn admin() -> User {
        let now = chrono::Utc::now().to_rfc3339();
        User {
            id: Uuid::new_v4().to_string(),
            email: "admin@clinic.test".to_string(),
            password_hash: String::new(),
            name: "Admin".to_string(),
            role: "admin".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    async fn seed_owner(state: &Arc<AppState>) -> String {
        let (_, Json(owner)) = super::super::owners::create_owner(
            State(state.clone()),
            admin(),
            HeaderMap::new(),
            Json(CreateOwnerRequest {
                first_name: "John".to_string(),
                last_name: "Smith".to_string(),
                email: "john@smith.com".to_string(),
                phone: None,
                address: None,
                city: None,
            }),
        )
        .await
        .unwrap();
        owner.id
    }

    #[tokio::test]
    async fn pet_requires_existing_owner() {
        let state = test_state().await;

        let err = create_pet(
            State(state),
            admin(),
            HeaderMap::new(),
            Json(CreatePetRequest {
                name: "Max".to_string(),
                species: "Dog".to_string(),
                breed: None,
                birth_date: None,
                weight: None,
                notes: None,
                owner_id: Uuid::new_v4().to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn owner_sub_listing_returns_only_their_pets() {
        let state = test_state().await;
        let owner_id = seed_owner(&state).await;

        create_pet(
            State(state.clone()),
            admin(),
            HeaderMap::new(),
            Json(CreatePetRequest {
                name: "Max".to_string(),
                species: "Dog".to_string(),
                breed: Some("Labrador".to_string()),
                birth_date: Some("2020-03-14".to_string()),
                weight: Some(28.5),
                notes: None,
                owner_id: owner_id.clone(),
            }),
        )
        .await
        .unwrap();

        let Json(pets) = list_owner_pets(State(state), admin(), Path(owner_id.clone()))
            .await
            .unwrap();
        assert_eq!(pets.len(), 1);
        assert_eq!(pets[0].name, "Max");
        assert_eq!(pets[0].owner_id, owner_id);
    }

    #[tokio::test]
    async fn bad_birth_date_is_a_validation_error() {
        let state = test_state().await;
        let owner_id = seed_owner(&state).await;

        let err = create_pet(
            State(state),
            admin(),
            HeaderMap::new(),
            Json(CreatePetRequest {
                name: "Whiskers".to_string(),
                species: "Cat".to_string(),
                breed: None,
                birth_date: Some("14/03/2020".to_string()),
                weight: None,
                notes: None,
                owner_id,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
