//! Visit models and status lifecycle.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Visit lifecycle states. Stored in the database as the display strings
/// ("scheduled", "in progress", "completed", "cancelled").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VisitStatus {
    #[serde(rename = "scheduled")]
    Scheduled,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl std::fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::InProgress => write!(f, "in progress"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for VisitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "in progress" | "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown visit status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Visit {
    pub id: String,
    pub pet_id: String,
    pub doctor_id: Option<String>,
    pub visit_date: String,
    pub reason: String,
    pub status: String,
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Visit {
    pub fn status_enum(&self) -> Option<VisitStatus> {
        self.status.parse().ok()
    }
}

/// Visit joined with pet and doctor names, for the list view
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VisitWithNames {
    pub id: String,
    pub pet_id: String,
    pub doctor_id: Option<String>,
    pub visit_date: String,
    pub reason: String,
    pub status: String,
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub pet_name: String,
    pub owner_first_name: String,
    pub owner_last_name: String,
    pub doctor_first_name: Option<String>,
    pub doctor_last_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateVisitRequest {
    pub pet_id: String,
    pub doctor_id: Option<String>,
    pub visit_date: String,
    pub reason: String,
    /// Defaults to "scheduled" when omitted
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVisitRequest {
    pub doctor_id: Option<String>,
    pub visit_date: Option<String>,
    pub reason: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
}
