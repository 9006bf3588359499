//! Session and authentication endpoints, plus the access guard used by
//! every protected route.
//!
//! Tokens are 32 random bytes, handed to the client as hex and stored only
//! as SHA-256 hashes. The guard decision is a pure function of
//! (session presence, role, section): missing or expired session is 401,
//! a role outside the section's allowed set is 403.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use lazy_static::lazy_static;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::db::{
    actions, resource_types, ForgotPasswordRequest, LoginRequest, LoginResponse, PasswordReset,
    RegisterRequest, ResetPasswordRequest, Role, Section, Session, User, UserResponse,
};
use crate::AppState;
use serde::{Deserialize, Serialize};

use super::audit::{audit_log, extract_client_ip};
use super::error::ApiError;
use super::validation::validate_email;

/// Response for setup status check
#[derive(Serialize)]
pub struct SetupStatusResponse {
    pub needs_setup: bool,
}

/// Request for initial setup
#[derive(Deserialize)]
pub struct SetupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Format a UTC instant the way SQLite's datetime() renders it. Expiry
/// columns are compared against datetime('now') as strings, so they must
/// share that exact format; RFC 3339 ('T' separator) would sort after it
/// and keep same-day expiries alive until midnight.
fn sqlite_timestamp(t: chrono::DateTime<chrono::Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

lazy_static! {
    // Verified on the unknown-account path so login latency does not
    // depend on whether the email exists
    static ref DUMMY_HASH: String = hash_password("decoy-password-0").unwrap_or_default();
}

/// Validate password strength.
/// Returns None if valid, or Some(error_message) if invalid
fn validate_password_strength(password: &str) -> Option<String> {
    if password.len() < 8 {
        return Some("Password must be at least 8 characters".to_string());
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_letter {
        return Some("Password must contain at least one letter".to_string());
    }
    if !has_digit {
        return Some("Password must contain at least one digit".to_string());
    }

    let common_passwords = ["password1", "12345678a", "qwerty123", "letmein12"];
    let lower = password.to_lowercase();
    for common in common_passwords {
        if lower == common {
            return Some("Password is too common. Please choose a stronger password.".to_string());
        }
    }

    None
}

/// Create a session row for a user and return the raw token
async fn create_session(state: &AppState, user_id: &str) -> Result<String, ApiError> {
    let token = generate_token();
    let token_hash = hash_token(&token);

    let expires_at = chrono::Utc::now()
        + chrono::Duration::days(state.config.auth.session_ttl_days.max(1));

    let session_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&session_id)
    .bind(user_id)
    .bind(&token_hash)
    .bind(sqlite_timestamp(expires_at))
    .execute(&state.db)
    .await?;

    Ok(token)
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&request.email)
        .fetch_optional(&state.db)
        .await?;

    // Uniform rejection: never reveal whether the account exists, and burn
    // the same argon2 cost either way
    let user = match user {
        Some(user) => user,
        None => {
            verify_password(&request.password, &DUMMY_HASH);
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = create_session(&state, &user.id).await?;

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::USER_LOGIN,
        resource_types::USER,
        Some(&user.id),
        Some(&user.email),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

/// Logout endpoint. Clears the session server-side; always succeeds from the
/// client's point of view even when the session is already gone.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> StatusCode {
    if let Some(token) = extract_token(request.headers()) {
        let token_hash = hash_token(&token);
        if let Err(e) = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(&token_hash)
            .execute(&state.db)
            .await
        {
            tracing::warn!(error = %e, "Failed to delete session on logout");
        }
    }

    StatusCode::NO_CONTENT
}

/// Current-user endpoint. The SPA calls this after every session change to
/// re-resolve the role.
pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Validate token endpoint
pub async fn validate(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> StatusCode {
    let token = match extract_token(request.headers()) {
        Some(t) => t,
        None => return StatusCode::UNAUTHORIZED,
    };

    let token_hash = hash_token(&token);

    let session: Option<Session> = sqlx::query_as(
        "SELECT * FROM sessions WHERE token_hash = ? AND expires_at > datetime('now')",
    )
    .bind(&token_hash)
    .fetch_optional(&state.db)
    .await
    .ok()
    .flatten();

    match session {
        Some(_) => StatusCode::OK,
        None => StatusCode::UNAUTHORIZED,
    }
}

/// Check if initial setup is needed (no users exist)
pub async fn setup_status(State(state): State<Arc<AppState>>) -> Json<SetupStatusResponse> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await
        .unwrap_or((0,));

    Json(SetupStatusResponse {
        needs_setup: count.0 == 0,
    })
}

/// Initial setup endpoint - creates the first admin user
pub async fn setup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetupRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    validate_new_user(&request.email, &request.password, &request.name)?;

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    // Count and insert under one transaction; two racing setup calls must
    // not both create an admin
    let mut tx = state.db.begin().await?;
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    if count.0 > 0 {
        return Err(ApiError::forbidden("Setup has already been completed"));
    }
    insert_user(&mut tx, &id, &request.email, &password_hash, &request.name, Role::Admin).await?;
    tx.commit().await?;

    let token = create_session(&state, &id).await?;

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token,
            user: UserResponse {
                id,
                email: request.email,
                name: request.name,
                role: Role::Admin.to_string(),
            },
        }),
    ))
}

/// Create the configured bootstrap admin at startup. A no-op when the
/// credentials are absent from config or any user already exists.
pub async fn bootstrap_admin(state: &AppState) -> Result<(), ApiError> {
    let (email, password) = match (
        &state.config.auth.bootstrap_admin_email,
        &state.config.auth.bootstrap_admin_password,
    ) {
        (Some(email), Some(password)) => (email.clone(), password.clone()),
        _ => return Ok(()),
    };

    validate_new_user(&email, &password, "Administrator")?;

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(&password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let mut tx = state.db.begin().await?;
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    if count.0 > 0 {
        return Ok(());
    }
    insert_user(&mut tx, &id, &email, &password_hash, "Administrator", Role::Admin).await?;
    tx.commit().await?;

    tracing::info!(email = %email, "Created bootstrap admin account");
    Ok(())
}

/// Self-registration. New accounts always get the customer role; staff
/// accounts are provisioned by an administrator.
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let response =
        create_user_checked(&state, &request.email, &request.password, &request.name, Role::Customer)
            .await?;

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::USER_REGISTER,
        resource_types::USER,
        Some(&response.user.id),
        Some(&response.user.email),
        Some(&response.user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Field checks shared by setup, register and the config bootstrap
fn validate_new_user(email: &str, password: &str, name: &str) -> Result<(), ApiError> {
    if let Err(e) = validate_email(email) {
        return Err(ApiError::validation_field("email", e));
    }
    if let Some(error) = validate_password_strength(password) {
        return Err(ApiError::validation_field("password", error));
    }
    if name.trim().is_empty() {
        return Err(ApiError::validation_field("name", "Name is required"));
    }
    Ok(())
}

/// Insert a user row inside an open transaction
async fn insert_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &str,
    email: &str,
    password_hash: &str,
    name: &str,
    role: Role,
) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(role.to_string())
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Validate input, insert the user and auto-login
async fn create_user_checked(
    state: &AppState,
    email: &str,
    password: &str,
    name: &str,
    role: Role,
) -> Result<LoginResponse, ApiError> {
    validate_new_user(email, password, name)?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash =
        hash_password(password).map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let mut tx = state.db.begin().await?;
    insert_user(&mut tx, &id, email, &password_hash, name, role).await?;
    tx.commit().await?;

    tracing::info!(email = %email, role = %role, "Created user account");

    let token = create_session(state, &id).await?;

    Ok(LoginResponse {
        token,
        user: UserResponse {
            id,
            email: email.to_string(),
            name: name.to_string(),
            role: role.to_string(),
        },
    })
}

/// Start a password reset. Always answers 202 so the endpoint cannot be used
/// to probe for accounts. Without an outbound mail channel the token is
/// surfaced through the server log for an operator to relay.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&request.email)
        .fetch_optional(&state.db)
        .await?;

    if let Some(user) = user {
        let token = generate_token();
        let token_hash = hash_token(&token);
        let expires_at = chrono::Utc::now() + chrono::Duration::hours(1);
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO password_resets (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&user.id)
        .bind(&token_hash)
        .bind(sqlite_timestamp(expires_at))
        .execute(&state.db)
        .await?;

        tracing::info!(
            email = %user.email,
            "Password reset requested; token: {} (valid 1 hour)",
            token
        );
    }

    Ok(StatusCode::ACCEPTED)
}

/// Complete a password reset. Consumes the token and revokes every open
/// session for the account.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    if let Some(error) = validate_password_strength(&request.password) {
        return Err(ApiError::validation_field("password", error));
    }

    let token_hash = hash_token(&request.token);
    let reset: Option<PasswordReset> = sqlx::query_as(
        "SELECT * FROM password_resets WHERE token_hash = ? AND used = 0 AND expires_at > datetime('now')",
    )
    .bind(&token_hash)
    .fetch_optional(&state.db)
    .await?;

    let reset = reset.ok_or_else(|| ApiError::bad_request("Invalid or expired reset token"))?;

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(&now)
        .bind(&reset.user_id)
        .execute(&state.db)
        .await?;

    sqlx::query("UPDATE password_resets SET used = 1 WHERE id = ?")
        .bind(&reset.id)
        .execute(&state.db)
        .await?;

    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(&reset.user_id)
        .execute(&state.db)
        .await?;

    audit_log(
        &state,
        actions::USER_PASSWORD_RESET,
        resource_types::USER,
        Some(&reset.user_id),
        None,
        Some(&reset.user_id),
        None,
        None,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Auth middleware guarding the /api data routes. Rejects with 401 when no
/// valid session (or admin token) accompanies the request.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    // Static admin token from config, compared in constant time
    let admin_token = state.config.auth.admin_token.as_bytes();
    let provided_token = token.as_bytes();
    if admin_token.len() == provided_token.len() && admin_token.ct_eq(provided_token).into() {
        return Ok(next.run(request).await);
    }

    let token_hash = hash_token(&token);
    let session: Option<Session> = sqlx::query_as(
        "SELECT * FROM sessions WHERE token_hash = ? AND expires_at > datetime('now')",
    )
    .bind(&token_hash)
    .fetch_optional(&state.db)
    .await?;

    match session {
        Some(_) => Ok(next.run(request).await),
        None => Err(ApiError::unauthorized("Session expired or invalid")),
    }
}

/// Extract the bearer token from request headers
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    headers
        .get("X-API-Key")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

/// Get the current user from a token
pub async fn get_current_user(
    pool: &sqlx::SqlitePool,
    config: &crate::config::Config,
    token: &str,
) -> Result<User, ApiError> {
    // The config admin token maps to a synthetic admin identity
    let admin_token = config.auth.admin_token.as_bytes();
    if admin_token.len() == token.len() && admin_token.ct_eq(token.as_bytes()).into() {
        let now = chrono::Utc::now().to_rfc3339();
        return Ok(User {
            id: "system".to_string(),
            email: "system@vetdesk.local".to_string(),
            password_hash: String::new(),
            name: "System Admin".to_string(),
            role: Role::Admin.to_string(),
            created_at: now.clone(),
            updated_at: now,
        });
    }

    let token_hash = hash_token(token);
    let session: Option<Session> = sqlx::query_as(
        "SELECT * FROM sessions WHERE token_hash = ? AND expires_at > datetime('now')",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    let session = session.ok_or_else(|| ApiError::unauthorized("Session expired or invalid"))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&session.user_id)
        .fetch_optional(pool)
        .await?;

    user.ok_or_else(|| ApiError::unauthorized("Session expired or invalid"))
}

/// Extractor for getting the current authenticated user from a request
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        get_current_user(&state.db, &state.config, &token).await
    }
}

/// Gate a handler on the caller's role. Returns the parsed role so handlers
/// can branch further if they need to.
pub fn require_section(user: &User, section: Section) -> Result<Role, ApiError> {
    let role = user
        .role_enum()
        .map_err(|e| ApiError::internal(format!("Corrupt role on account: {}", e)))?;

    if !role.permits(section) {
        return Err(ApiError::forbidden(
            "Your role does not have access to this section",
        ));
    }

    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Section;

    async fn test_state() -> Arc<AppState> {
        let pool = crate::db::init_in_memory().await.unwrap();
        Arc::new(AppState::new(Config::default(), pool))
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("correct-horse9").unwrap();
        assert!(verify_password("correct-horse9", &hash));
        assert!(!verify_password("wrong-horse9", &hash));
        assert!(!verify_password("correct-horse9", "not-a-hash"));
    }

    #[test]
    fn token_hash_is_stable_and_opaque() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
    }

    #[test]
    fn password_strength_rules() {
        assert!(validate_password_strength("short1").is_some());
        assert!(validate_password_strength("onlyletters").is_some());
        assert!(validate_password_strength("12345678").is_some());
        assert!(validate_password_strength("password1").is_some());
        assert!(validate_password_strength("clinic-pass42").is_none());
    }

    fn user_with_role(role: &str) -> User {
        User {
            id: "u1".to_string(),
            email: "u@example.com".to_string(),
            password_hash: String::new(),
            name: "U".to_string(),
            role: role.to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn guard_forbids_out_of_set_roles() {
        let customer = user_with_role("customer");
        assert!(require_section(&customer, Section::Visits).is_ok());
        let err = require_section(&customer, Section::Owners).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn guard_rejects_corrupt_role() {
        let odd = user_with_role("superuser");
        let err = require_section(&odd, Section::Dashboard).unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn decoy_hash_is_a_real_argon2_hash() {
        assert!(DUMMY_HASH.starts_with("$argon2"));
        assert!(!verify_password("anything9", &DUMMY_HASH));
    }

    #[test]
    fn expiry_timestamps_match_sqlite_datetime_format() {
        let t = chrono::DateTime::parse_from_rfc3339("2024-12-26T10:05:09+00:00")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(sqlite_timestamp(t), "2024-12-26 10:05:09");
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let state = test_state().await;
        let login =
            create_user_checked(&state, "pat@example.com", "clinic-pass42", "Pat", Role::Customer)
                .await
                .unwrap();

        // a freshly minted session resolves
        let user = get_current_user(&state.db, &state.config, &login.token)
            .await
            .unwrap();
        assert_eq!(user.email, "pat@example.com");

        // a session that lapsed one second ago must not
        let stale = generate_token();
        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&user.id)
        .bind(hash_token(&stale))
        .bind(sqlite_timestamp(chrono::Utc::now() - chrono::Duration::seconds(1)))
        .execute(&state.db)
        .await
        .unwrap();

        assert!(get_current_user(&state.db, &state.config, &stale)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn password_reset_round_trip_is_single_use() {
        let state = test_state().await;
        let login =
            create_user_checked(&state, "pat@example.com", "clinic-pass42", "Pat", Role::Customer)
                .await
                .unwrap();

        // known and unknown accounts get the same answer
        let status = forgot_password(
            State(state.clone()),
            Json(ForgotPasswordRequest {
                email: "pat@example.com".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        let status = forgot_password(
            State(state.clone()),
            Json(ForgotPasswordRequest {
                email: "ghost@example.com".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);

        // the handler only logs the raw token, so seed a row with a known one
        let token = generate_token();
        sqlx::query(
            "INSERT INTO password_resets (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&login.user.id)
        .bind(hash_token(&token))
        .bind(sqlite_timestamp(chrono::Utc::now() + chrono::Duration::hours(1)))
        .execute(&state.db)
        .await
        .unwrap();

        let status = reset_password(
            State(state.clone()),
            Json(ResetPasswordRequest {
                token: token.clone(),
                password: "fresh-pass42".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        // every open session is revoked and the new password is in force
        assert!(get_current_user(&state.db, &state.config, &login.token)
            .await
            .is_err());
        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&login.user.id)
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert!(verify_password("fresh-pass42", &user.password_hash));

        // the token is spent
        let err = reset_password(
            State(state),
            Json(ResetPasswordRequest {
                token,
                password: "another-pass42".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let state = test_state().await;
        let login =
            create_user_checked(&state, "pat@example.com", "clinic-pass42", "Pat", Role::Customer)
                .await
                .unwrap();

        let token = generate_token();
        sqlx::query(
            "INSERT INTO password_resets (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&login.user.id)
        .bind(hash_token(&token))
        .bind(sqlite_timestamp(chrono::Utc::now() - chrono::Duration::seconds(1)))
        .execute(&state.db)
        .await
        .unwrap();

        let err = reset_password(
            State(state),
            Json(ResetPasswordRequest {
                token,
                password: "fresh-pass42".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn setup_only_creates_the_first_admin() {
        let state = test_state().await;

        let (status, Json(response)) = setup(
            State(state.clone()),
            Json(SetupRequest {
                email: "root@clinic.test".to_string(),
                password: "clinic-pass42".to_string(),
                name: "Root".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response.user.role, "admin");

        let err = setup(
            State(state),
            Json(SetupRequest {
                email: "other@clinic.test".to_string(),
                password: "clinic-pass42".to_string(),
                name: "Other".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn bootstrap_admin_is_created_once_from_config() {
        let pool = crate::db::init_in_memory().await.unwrap();
        let mut config = Config::default();
        config.auth.bootstrap_admin_email = Some("root@clinic.test".to_string());
        config.auth.bootstrap_admin_password = Some("clinic-pass42".to_string());
        let state = Arc::new(AppState::new(config, pool));

        bootstrap_admin(&state).await.unwrap();
        // second run finds a user and leaves the table alone
        bootstrap_admin(&state).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(count.0, 1);

        let user: User = sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind("root@clinic.test")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(user.role, "admin");
        assert!(verify_password("clinic-pass42", &user.password_hash));
    }
}
