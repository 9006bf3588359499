//! User, session and role models.
//!
//! `Role` is a closed enumeration. Access decisions go through
//! `Role::permits`, a total function over the guarded sections of the
//! console, so no handler compares role strings directly.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The three console roles. Assigned at registration, read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access to every section, including the vet registry and audit trail
    Admin,
    /// Clinical staff: owners, pets and visits
    Doctor,
    /// Pet owners: dashboard and visit records only
    Customer,
}

/// Guarded areas of the console, one per protected route group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Dashboard,
    Owners,
    Pets,
    Visits,
    Vets,
    Audit,
}

impl Role {
    /// Whether this role may access the given section. Total over both
    /// enums; adding a section without a row here is a compile error.
    pub fn permits(&self, section: Section) -> bool {
        match section {
            Section::Dashboard | Section::Visits => true,
            Section::Owners | Section::Pets => matches!(self, Role::Admin | Role::Doctor),
            Section::Vets | Section::Audit => matches!(self, Role::Admin),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Doctor => write!(f, "doctor"),
            Role::Customer => write!(f, "customer"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "customer" => Ok(Role::Customer),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Parse the stored role string. An unrecognized value is an error,
    /// never a silent default: an access decision must not guess.
    pub fn role_enum(&self) -> Result<Role, String> {
        self.role.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PasswordReset {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub used: i64,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}
