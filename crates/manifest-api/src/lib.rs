pub mod auth;
pub mod error;
pub mod extract;
pub mod goals;
pub mod habits;
pub mod health;
pub mod middleware;
pub mod password_reset;
pub mod stats;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use tracing::{error, warn};

use manifest_db::Database;

use crate::error::ApiError;
use crate::password_reset::ResetSettings;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt: JwtSettings,
    pub resets: ResetSettings,
}

pub struct JwtSettings {
    pub secret: String,
    pub ttl: chrono::Duration,
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/", get(health::root))
        .route("/api/health", get(health::health))
        .route("/api/stats", get(stats::global_stats))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/forgot-password", post(password_reset::forgot_password))
        .route("/api/auth/validate-reset-token", post(password_reset::validate_reset_token))
        .route("/api/auth/reset-password", post(password_reset::reset_password_handler));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me).put(auth::update_me))
        .route("/api/habits", get(habits::list_habits).post(habits::create_habit))
        .route(
            "/api/habits/{habit_id}",
            get(habits::get_habit).put(habits::update_habit).delete(habits::delete_habit),
        )
        .route("/api/habits/{habit_id}/toggle", post(habits::toggle_habit))
        .route("/api/goals", get(goals::list_goals).post(goals::create_goal))
        .route(
            "/api/goals/{goal_id}",
            get(goals::get_goal).put(goals::update_goal).delete(goals::delete_goal),
        )
        .route("/api/stats/user", get(stats::user_stats))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Run blocking store work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("blocking task failed"))
    })?
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
pub(crate) fn parse_timestamp(raw: &str, row_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on row '{}': {}", raw, row_id, e);
            DateTime::default()
        })
}

pub(crate) fn parse_uuid(raw: &str, column: &str, row_id: &str) -> uuid::Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", column, raw, row_id, e);
        uuid::Uuid::default()
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::password_reset::ResetDelivery;

    pub fn state(delivery: ResetDelivery) -> AppState {
        Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt: JwtSettings {
                secret: "test-secret".into(),
                ttl: chrono::Duration::hours(1),
            },
            resets: ResetSettings {
                ttl: chrono::Duration::hours(1),
                delivery,
            },
        })
    }

    pub async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = router(state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Send a raw body with an optional content type.
    pub async fn send_raw(
        state: &AppState,
        method: &str,
        uri: &str,
        content_type: Option<&str>,
        body: &'static str,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let response = router(state.clone())
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Register an account and return its access token.
    pub async fn register(state: &AppState, email: &str, password: &str) -> String {
        let (status, body) = send(
            state,
            "POST",
            "/api/auth/register",
            None,
            Some(serde_json::json!({ "email": email, "password": password, "full_name": "Test User" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["access_token"].as_str().unwrap().to_string()
    }
}
