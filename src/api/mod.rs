mod audit;
pub mod auth;
mod dashboard;
pub mod error;
mod owners;
mod pets;
mod validation;
mod vets;
mod visits;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public; handlers that need an identity use the User extractor)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/validate", get(auth::validate))
        .route("/setup-status", get(auth::setup_status))
        .route("/setup", post(auth::setup))
        .route("/register", post(auth::register))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password));

    // Protected API routes
    let api_routes = Router::new()
        // Owners
        .route("/owners", get(owners::list_owners))
        .route("/owners", post(owners::create_owner))
        .route("/owners/:id", get(owners::get_owner))
        .route("/owners/:id", put(owners::update_owner))
        .route("/owners/:id", delete(owners::delete_owner))
        .route("/owners/:id/pets", get(pets::list_owner_pets))
        // Pets
        .route("/pets", get(pets::list_pets))
        .route("/pets", post(pets::create_pet))
        .route("/pets/:id", get(pets::get_pet))
        .route("/pets/:id", put(pets::update_pet))
        .route("/pets/:id", delete(pets::delete_pet))
        .route("/pets/:id/visits", get(visits::list_pet_visits))
        // Visits
        .route("/visits", get(visits::list_visits))
        .route("/visits", post(visits::create_visit))
        .route("/visits/:id", get(visits::get_visit))
        .route("/visits/:id", put(visits::update_visit))
        .route("/visits/:id", delete(visits::delete_visit))
        // Veterinarians
        .route("/vets", get(vets::list_vets))
        .route("/vets", post(vets::create_vet))
        .route("/vets/:id", get(vets::get_vet))
        .route("/vets/:id", put(vets::update_vet))
        .route("/vets/:id", delete(vets::delete_vet))
        // Dashboard
        .route("/dashboard/stats", get(dashboard::get_stats))
        // Audit
        .route("/audit-logs", get(audit::list_logs))
        // Protected by auth
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn test_state() -> Arc<AppState> {
        let pool = db::init_in_memory().await.unwrap();
        Arc::new(AppState::new(Config::default(), pool))
    }

    async fn seed_user(state: &AppState, email: &str, password: &str, role: &str) {
        let hash = auth::hash_password(password).unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(email)
        .bind(&hash)
        .bind("Test User")
        .bind(role)
        .bind(&now)
        .bind(&now)
        .execute(&state.db)
        .await
        .unwrap();
    }

    async fn login(router: &Router, email: &str, password: &str) -> String {
        let body = serde_json::json!({ "email": email, "password": password });
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        json["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_endpoint_is_open() {
        let router = create_router(test_state().await);
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let router = create_router(test_state().await);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/owners")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn customer_is_forbidden_on_owner_records() {
        let state = test_state().await;
        seed_user(&state, "pat@example.com", "hunter2pass", "customer").await;
        let router = create_router(state);

        let token = login(&router, "pat@example.com", "hunter2pass").await;
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/owners")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn doctor_reaches_owner_records() {
        let state = test_state().await;
        seed_user(&state, "doc@example.com", "hunter2pass", "doctor").await;
        let router = create_router(state);

        let token = login(&router, "doc@example.com", "hunter2pass").await;
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/owners")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn customer_still_sees_dashboard_and_visits() {
        let state = test_state().await;
        seed_user(&state, "pat@example.com", "hunter2pass", "customer").await;
        let router = create_router(state);

        let token = login(&router, "pat@example.com", "hunter2pass").await;
        for uri in ["/api/dashboard/stats", "/api/visits"] {
            let response = router
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(uri)
                        .header("Authorization", format!("Bearer {token}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "uri: {uri}");
        }
    }

    #[tokio::test]
    async fn bad_login_is_uniform_unauthorized() {
        let state = test_state().await;
        seed_user(&state, "pat@example.com", "hunter2pass", "customer").await;
        let router = create_router(state);

        for body in [
            serde_json::json!({ "email": "pat@example.com", "password": "wrongpass1" }),
            serde_json::json!({ "email": "nobody@example.com", "password": "hunter2pass" }),
        ] {
            let response = router
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/auth/login")
                        .header("content-type", "application/json")
                        .body(Body::from(body.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
