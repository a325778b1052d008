use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use manifest_db::models::{GoalPatch, GoalRow, NewGoal};
use manifest_types::api::{Claims, CreateGoalRequest, GoalResponse, UpdateGoalRequest};
use manifest_types::models::GoalStatus;

use crate::error::ApiError;
use crate::extract::{ApiJson, resource_id};
use crate::{AppState, parse_timestamp, parse_uuid, run_blocking};

pub async fn create_goal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateGoalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Goal title is required".into()));
    }
    check_target_date(req.target_date.as_deref())?;

    let db = state.clone();
    let goal_id = Uuid::new_v4().to_string();
    let uid = claims.sub.to_string();
    let row = run_blocking(move || {
        db.db.create_goal(&NewGoal {
            id: &goal_id,
            user_id: &uid,
            title: &title,
            description: &req.description,
            category: &req.category,
            target_date: req.target_date.as_deref(),
            milestones: &req.milestones,
        })?;
        db.db
            .get_goal(&goal_id)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("goal {} vanished after insert", goal_id)))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(goal_response(row))))
}

pub async fn list_goals(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<GoalResponse>>, ApiError> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let rows = run_blocking(move || Ok(db.db.list_goals(&uid)?)).await?;

    Ok(Json(rows.into_iter().map(goal_response).collect()))
}

pub async fn get_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<GoalResponse>, ApiError> {
    let goal_id = resource_id(&goal_id, "Goal")?;
    let db = state.clone();
    let row = run_blocking(move || owned_goal(&db, goal_id, &claims)).await?;
    Ok(Json(goal_response(row)))
}

pub async fn update_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<String>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateGoalRequest>,
) -> Result<Json<GoalResponse>, ApiError> {
    let goal_id = resource_id(&goal_id, "Goal")?;
    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            return Err(ApiError::BadRequest("Goal title is required".into()));
        }
    }
    check_target_date(req.target_date.as_ref().and_then(Option::as_deref))?;

    let patch = GoalPatch {
        title: req.title.map(|t| t.trim().to_string()),
        description: req.description,
        category: req.category,
        target_date: req.target_date,
        progress: req.progress.map(clamp_progress),
        status: req.status.map(|s| s.as_str().to_string()),
        milestones: req.milestones,
    };

    let db = state.clone();
    let row = run_blocking(move || {
        owned_goal(&db, goal_id, &claims)?;
        let key = goal_id.to_string();
        if !db.db.update_goal(&key, &patch)? {
            return Err(ApiError::NotFound("Goal"));
        }
        db.db.get_goal(&key)?.ok_or(ApiError::NotFound("Goal"))
    })
    .await?;

    Ok(Json(goal_response(row)))
}

pub async fn delete_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let goal_id = resource_id(&goal_id, "Goal")?;
    let db = state.clone();
    run_blocking(move || {
        owned_goal(&db, goal_id, &claims)?;
        if !db.db.delete_goal(&goal_id.to_string())? {
            return Err(ApiError::NotFound("Goal"));
        }
        Ok(())
    })
    .await?;

    Ok(Json(json!({ "message": "Goal deleted successfully" })))
}

fn clamp_progress(progress: i64) -> u8 {
    progress.clamp(0, 100) as u8
}

fn check_target_date(date: Option<&str>) -> Result<(), ApiError> {
    match date {
        Some(d) if manifest_streak::parse_date(d).is_none() => {
            Err(ApiError::BadRequest("target_date must be YYYY-MM-DD".into()))
        }
        _ => Ok(()),
    }
}

fn owned_goal(state: &AppState, goal_id: Uuid, claims: &Claims) -> Result<GoalRow, ApiError> {
    state
        .db
        .get_goal(&goal_id.to_string())?
        .filter(|g| g.user_id == claims.sub.to_string())
        .ok_or(ApiError::NotFound("Goal"))
}

fn goal_response(row: GoalRow) -> GoalResponse {
    let status = row.status.parse().unwrap_or_else(|e| {
        warn!("Goal '{}': {}", row.id, e);
        GoalStatus::default()
    });
    GoalResponse {
        id: parse_uuid(&row.id, "id", &row.id),
        user_id: parse_uuid(&row.user_id, "user_id", &row.id),
        created_at: parse_timestamp(&row.created_at, &row.id),
        updated_at: parse_timestamp(&row.updated_at, &row.id),
        title: row.title,
        description: row.description,
        category: row.category,
        target_date: row.target_date,
        progress: row.progress,
        status,
        milestones: row.milestones,
    }
}
