use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use manifest_db::models::{HabitPatch, HabitRow, NewHabit};
use manifest_streak::{evaluate, normalize, today_utc, toggle};
use manifest_types::api::{
    Claims, CreateHabitRequest, HabitResponse, ToggleHabitResponse, UpdateHabitRequest,
};
use manifest_types::models::HabitFrequency;

use crate::error::ApiError;
use crate::extract::{ApiJson, resource_id};
use crate::{AppState, parse_timestamp, parse_uuid, run_blocking};

pub async fn create_habit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateHabitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Habit name is required".into()));
    }
    if req.target <= 0 {
        return Err(ApiError::BadRequest("Target must be positive".into()));
    }

    let db = state.clone();
    let habit_id = Uuid::new_v4().to_string();
    let uid = claims.sub.to_string();
    let row = run_blocking(move || {
        db.db.create_habit(&NewHabit {
            id: &habit_id,
            user_id: &uid,
            name: &name,
            description: &req.description,
            category: &req.category,
            frequency: req.frequency.as_str(),
            target: req.target,
        })?;
        db.db
            .get_habit(&habit_id)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("habit {} vanished after insert", habit_id)))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(habit_response(row))))
}

pub async fn list_habits(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<HabitResponse>>, ApiError> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let rows = run_blocking(move || Ok(db.db.list_habits(&uid)?)).await?;

    Ok(Json(rows.into_iter().map(habit_response).collect()))
}

pub async fn get_habit(
    State(state): State<AppState>,
    Path(habit_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<HabitResponse>, ApiError> {
    let habit_id = resource_id(&habit_id, "Habit")?;
    let db = state.clone();
    let row = run_blocking(move || owned_habit(&db, habit_id, &claims)).await?;
    Ok(Json(habit_response(row)))
}

/// Partial update. A new completion list (or a new target) triggers a
/// recomputation of the derived streak and progress.
pub async fn update_habit(
    State(state): State<AppState>,
    Path(habit_id): Path<String>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateHabitRequest>,
) -> Result<Json<HabitResponse>, ApiError> {
    let habit_id = resource_id(&habit_id, "Habit")?;
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("Habit name is required".into()));
        }
    }
    if req.target.is_some_and(|t| t <= 0) {
        return Err(ApiError::BadRequest("Target must be positive".into()));
    }

    let db = state.clone();
    let today = today_utc();
    let row = run_blocking(move || {
        let current = owned_habit(&db, habit_id, &claims)?;

        let mut patch = HabitPatch {
            name: req.name.map(|n| n.trim().to_string()),
            description: req.description,
            category: req.category,
            frequency: req.frequency.map(|f| f.as_str().to_string()),
            target: req.target,
            ..Default::default()
        };

        let target = req.target.unwrap_or(current.target);
        match req.completed_dates {
            Some(dates) => {
                let dates = normalize(&dates);
                let result = evaluate(&dates, target, today);
                patch.streak = Some(result.streak);
                patch.progress = Some(result.progress);
                patch.completed_dates = Some(dates);
            }
            None if req.target.is_some() => {
                let result = evaluate(&current.completed_dates, target, today);
                patch.streak = Some(result.streak);
                patch.progress = Some(result.progress);
            }
            None => {}
        }

        let key = habit_id.to_string();
        if !db.db.update_habit(&key, &patch)? {
            return Err(ApiError::NotFound("Habit"));
        }
        db.db.get_habit(&key)?.ok_or(ApiError::NotFound("Habit"))
    })
    .await?;

    Ok(Json(habit_response(row)))
}

pub async fn delete_habit(
    State(state): State<AppState>,
    Path(habit_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let habit_id = resource_id(&habit_id, "Habit")?;
    let db = state.clone();
    run_blocking(move || {
        owned_habit(&db, habit_id, &claims)?;
        if !db.db.delete_habit(&habit_id.to_string())? {
            return Err(ApiError::NotFound("Habit"));
        }
        Ok(())
    })
    .await?;

    Ok(Json(json!({ "message": "Habit deleted successfully" })))
}

/// Mark or unmark today (UTC) and persist the recomputed streak and progress
/// together with the dates.
pub async fn toggle_habit(
    State(state): State<AppState>,
    Path(habit_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ToggleHabitResponse>, ApiError> {
    let habit_id = resource_id(&habit_id, "Habit")?;
    let db = state.clone();
    let today = today_utc();
    let (completed, streak, progress) = run_blocking(move || {
        let current = owned_habit(&db, habit_id, &claims)?;

        let (dates, completed) = toggle(&current.completed_dates, today);
        let result = evaluate(&dates, current.target, today);

        let patch = HabitPatch {
            completed_dates: Some(dates),
            streak: Some(result.streak),
            progress: Some(result.progress),
            ..Default::default()
        };
        if !db.db.update_habit(&current.id, &patch)? {
            return Err(ApiError::NotFound("Habit"));
        }
        Ok((completed, result.streak, result.progress))
    })
    .await?;

    Ok(Json(ToggleHabitResponse {
        message: "Habit completion toggled successfully",
        completed,
        streak,
        progress,
    }))
}

/// Habits of other users are reported as missing.
fn owned_habit(state: &AppState, habit_id: Uuid, claims: &Claims) -> Result<HabitRow, ApiError> {
    state
        .db
        .get_habit(&habit_id.to_string())?
        .filter(|h| h.user_id == claims.sub.to_string())
        .ok_or(ApiError::NotFound("Habit"))
}

fn habit_response(row: HabitRow) -> HabitResponse {
    let frequency = row.frequency.parse().unwrap_or_else(|e| {
        warn!("Habit '{}': {}", row.id, e);
        HabitFrequency::default()
    });
    HabitResponse {
        id: parse_uuid(&row.id, "id", &row.id),
        user_id: parse_uuid(&row.user_id, "user_id", &row.id),
        created_at: parse_timestamp(&row.created_at, &row.id),
        updated_at: parse_timestamp(&row.updated_at, &row.id),
        name: row.name,
        description: row.description,
        category: row.category,
        frequency,
        target: row.target,
        completed_dates: row.completed_dates,
        streak: row.streak,
        progress: row.progress,
    }
}
