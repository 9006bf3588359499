//! Pet owner models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::pet::Pet;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Owner {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Owner with the number of registered pets, for the list view
#[derive(Debug, Clone, Serialize)]
pub struct OwnerWithPetCount {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub pet_count: i64,
}

/// Owner detail including their pets
#[derive(Debug, Clone, Serialize)]
pub struct OwnerWithPets {
    #[serde(flatten)]
    pub owner: Owner,
    pub pets: Vec<Pet>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOwnerRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOwnerRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
}
