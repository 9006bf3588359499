//! Dashboard statistics endpoint.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::db::{Section, User, VisitWithNames};
use crate::AppState;

use super::auth::require_section;
use super::error::ApiError;
use super::visits::VISIT_WITH_NAMES_SELECT;

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_owners: i64,
    pub total_pets: i64,
    pub active_vets: i64,
    pub visits_this_month: i64,
    pub recent_visits: Vec<VisitWithNames>,
    pub todays_schedule: Vec<VisitWithNames>,
}

/// Aggregate counts and today's schedule for the landing page.
/// Available to every authenticated role.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<DashboardStats>, ApiError> {
    require_section(&user, Section::Dashboard)?;

    let (total_owners,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM owners")
        .fetch_one(&state.db)
        .await?;
    let (total_pets,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pets")
        .fetch_one(&state.db)
        .await?;
    let (active_vets,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM veterinarians")
        .fetch_one(&state.db)
        .await?;

    // visit_date is stored as an ISO-8601 string, so a month is a prefix match
    let month_prefix = chrono::Utc::now().format("%Y-%m").to_string();
    let (visits_this_month,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM visits WHERE visit_date LIKE ? || '%'")
            .bind(&month_prefix)
            .fetch_one(&state.db)
            .await?;

    let recent_sql = format!("{} ORDER BY v.visit_date DESC LIMIT 5", VISIT_WITH_NAMES_SELECT);
    let recent_visits: Vec<VisitWithNames> =
        sqlx::query_as(&recent_sql).fetch_all(&state.db).await?;

    let today_prefix = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let today_sql = format!(
        "{} WHERE v.visit_date LIKE ? || '%' AND v.status = 'scheduled' ORDER BY v.visit_date",
        VISIT_WITH_NAMES_SELECT
    );
    let todays_schedule: Vec<VisitWithNames> = sqlx::query_as(&today_sql)
        .bind(&today_prefix)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(DashboardStats {
        total_owners,
        total_pets,
        active_vets,
        visits_this_month,
        recent_visits,
        todays_schedule,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{self, CreateOwnerRequest, CreatePetRequest, CreateVisitRequest};
    use axum::http::HeaderMap;
    use uuid::Uuid;

    async fn test_state() -> Arc<AppState> {
        let pool = db::init_in_memory().await.unwrap();
        Arc::new(AppState::new(Config::default(), pool))
    }

    fn customer() -> User {
        let now = chrono::Utc::now().to_rfc3339();
        User {
            id: Uuid::new_v4().to_string(),
            email: "customer@clinic.test".to_string(),
            password_hash: String::new(),
            name: "Customer".to_string(),
            role: "customer".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
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

    #[tokio::test]
    async fn empty_clinic_reports_zeroes() {
        let state = test_state().await;
        let Json(stats) = get_stats(State(state), customer()).await.unwrap();
        assert_eq!(stats.total_owners, 0);
        assert_eq!(stats.total_pets, 0);
        assert_eq!(stats.active_vets, 0);
        assert_eq!(stats.visits_this_month, 0);
        assert!(stats.recent_visits.is_empty());
        assert!(stats.todays_schedule.is_empty());
    }

    #[tokio::test]
    async fn counts_reflect_seeded_data() {
        let state = test_state().await;

        let (_, Json(owner)) = super::super::owners::create_owner(
            State(state.clone()),
            admin(),
            HeaderMap::new(),
            Json(CreateOwnerRequest {
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                email: "jane@doe.com".to_string(),
                phone: None,
                address: None,
                city: None,
            }),
        )
        .await
        .unwrap();

        let (_, Json(pet)) = super::super::pets::create_pet(
            State(state.clone()),
            admin(),
            HeaderMap::new(),
            Json(CreatePetRequest {
                name: "Bella".to_string(),
                species: "Cat".to_string(),
                breed: None,
                birth_date: None,
                weight: None,
                notes: None,
                owner_id: owner.id,
            }),
        )
        .await
        .unwrap();

        let today = chrono::Utc::now().format("%Y-%m-%dT09:30:00").to_string();
        super::super::visits::create_visit(
            State(state.clone()),
            admin(),
            HeaderMap::new(),
            Json(CreateVisitRequest {
                pet_id: pet.id,
                doctor_id: None,
                visit_date: today,
                reason: "Dental cleaning".to_string(),
                status: None,
                notes: None,
            }),
        )
        .await
        .unwrap();

        let Json(stats) = get_stats(State(state), customer()).await.unwrap();
        assert_eq!(stats.total_owners, 1);
        assert_eq!(stats.total_pets, 1);
        assert_eq!(stats.visits_this_month, 1);
        assert_eq!(stats.recent_visits.len(), 1);
        assert_eq!(stats.recent_visits[0].pet_name, "Bella");
        assert_eq!(stats.todays_schedule.len(), 1);
    }
}
