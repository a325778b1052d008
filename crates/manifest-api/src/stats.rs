use axum::{Extension, Json, extract::State};

use manifest_db::Database;
use manifest_types::api::{Achievement, Claims, GlobalStatsResponse, ProfileStats, UserStatsResponse};
use manifest_types::models::GoalStatus;

use crate::error::ApiError;
use crate::{AppState, run_blocking};

/// Per-user counters behind the stats endpoint and the profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCounters {
    pub total_goals: u64,
    pub completed_goals: u64,
    pub total_habits: u64,
    pub max_streak: u32,
}

impl UserCounters {
    pub fn load(db: &Database, user_id: &str) -> anyhow::Result<Self> {
        Ok(Self {
            total_goals: db.count_goals(user_id, None)?,
            completed_goals: db.count_goals(user_id, Some(GoalStatus::Completed.as_str()))?,
            total_habits: db.count_habits(user_id)?,
            max_streak: db.max_habit_streak(user_id)?,
        })
    }

    pub fn level(&self) -> &'static str {
        user_level(self.total_goals, self.completed_goals, self.max_streak)
    }

    pub fn profile_stats(&self) -> ProfileStats {
        ProfileStats {
            streak: self.max_streak,
            total_goals: self.total_goals,
            completed_goals: self.completed_goals,
            level: self.level(),
        }
    }
}

/// Achievement tier from goal and streak counters.
pub fn user_level(total_goals: u64, completed_goals: u64, max_streak: u32) -> &'static str {
    let score = completed_goals * 10 + u64::from(max_streak) * 2 + total_goals;
    if score >= 100 {
        "Manifestation Master"
    } else if score >= 50 {
        "Vision Keeper"
    } else {
        "Rising Star"
    }
}

/// Badges derived from the counters. Always the full list, each flagged
/// achieved or not, so clients can render locked badges.
pub fn achievements(counters: &UserCounters) -> Vec<Achievement> {
    vec![
        Achievement {
            name: "First Goal",
            description: "Created your first goal",
            achieved: counters.total_goals >= 1,
            icon: "Target",
        },
        Achievement {
            name: "Week Warrior",
            description: "7-day streak achieved",
            achieved: counters.max_streak >= 7,
            icon: "Flame",
        },
        Achievement {
            name: "Goal Crusher",
            description: "Completed 5 goals",
            achieved: counters.completed_goals >= 5,
            icon: "Award",
        },
        Achievement {
            name: "Habit Master",
            description: "21-day streak achieved",
            achieved: counters.max_streak >= 21,
            icon: "Star",
        },
    ]
}

pub async fn user_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserStatsResponse>, ApiError> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let counters = run_blocking(move || Ok(UserCounters::load(&db.db, &uid)?)).await?;

    Ok(Json(UserStatsResponse {
        total_goals: counters.total_goals,
        completed_goals: counters.completed_goals,
        total_habits: counters.total_habits,
        max_streak: counters.max_streak,
        level: counters.level(),
        achievements: achievements(&counters),
    }))
}

pub async fn global_stats(State(state): State<AppState>) -> Result<Json<GlobalStatsResponse>, ApiError> {
    let db = state.clone();
    let stats = run_blocking(move || {
        Ok(GlobalStatsResponse {
            total_users: db.db.count_users()?,
            total_goals: db.db.count_all_goals(None)?,
            goals_achieved: db.db.count_all_goals(Some(GoalStatus::Completed.as_str()))?,
            total_habits: db.db.count_all_habits()?,
        })
    })
    .await?;

    Ok(Json(stats))
}
