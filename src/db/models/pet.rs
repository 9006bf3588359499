//! Pet models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Pet {
    pub id: String,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub birth_date: Option<String>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Pet joined with its owner's name, for the list view
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PetWithOwner {
    pub id: String,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub birth_date: Option<String>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
    pub owner_id: String,
    pub owner_first_name: String,
    pub owner_last_name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePetRequest {
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub birth_date: Option<String>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
    pub owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePetRequest {
    pub name: Option<String>,
    pub species: Option<String>,
    pub breed: Option<String>,
    pub birth_date: Option<String>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
    pub owner_id: Option<String>,
}
