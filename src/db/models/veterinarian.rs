//! Veterinarian models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Veterinarian {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub specialty: String,
    pub email: String,
    pub phone: Option<String>,
    pub experience_years: Option<i64>,
    pub availability: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateVetRequest {
    pub first_name: String,
    pub last_name: String,
    pub specialty: String,
    pub email: String,
    pub phone: Option<String>,
    pub experience_years: Option<i64>,
    pub availability: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVetRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub specialty: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub experience_years: Option<i64>,
    pub availability: Option<String>,
}
