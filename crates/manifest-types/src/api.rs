use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::{GoalStatus, HabitFrequency, Milestone};

/// For nullable fields in partial updates: an absent field stays `None`, an
/// explicit `null` becomes `Some(None)`. Pair with `#[serde(default)]`.
pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// -- JWT Claims --

/// Access-token claims. Issued by the login/register handlers and checked by
/// the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: ProfileStats,
}

/// Counters shown on the profile, computed on read.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileStats {
    /// Best current streak across the user's habits.
    pub streak: u32,
    pub total_goals: u64,
    pub completed_goals: u64,
    pub level: &'static str,
}

/// Partial profile update. Nullable fields accept `null` to clear them.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub avatar: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub website: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: UserProfile,
}

// -- Password reset --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Same shape whether or not the email belongs to an account.
#[derive(Debug, Serialize)]
pub struct ForgotPasswordResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateResetTokenQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResetTokenResponse {
    pub valid: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// -- Habits --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateHabitRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub frequency: HabitFrequency,
    #[serde(default = "default_habit_target")]
    pub target: i64,
}

fn default_habit_target() -> i64 {
    30
}

/// Partial update. `streak` and `progress` are derived server-side, so clients
/// that echo them back are not rejected; the values are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateHabitRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub frequency: Option<HabitFrequency>,
    pub target: Option<i64>,
    pub completed_dates: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct HabitResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub frequency: HabitFrequency,
    pub target: i64,
    pub completed_dates: Vec<String>,
    pub streak: u32,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ToggleHabitResponse {
    pub message: &'static str,
    pub completed: bool,
    pub streak: u32,
    pub progress: u8,
}

// -- Goals --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGoalRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub target_date: Option<String>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateGoalRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    /// `null` clears the date.
    #[serde(default, deserialize_with = "nullable")]
    pub target_date: Option<Option<String>>,
    pub progress: Option<i64>,
    pub status: Option<GoalStatus>,
    pub milestones: Option<Vec<Milestone>>,
}

#[derive(Debug, Serialize)]
pub struct GoalResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub target_date: Option<String>,
    pub progress: u8,
    pub status: GoalStatus,
    pub milestones: Vec<Milestone>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Stats --

#[derive(Debug, Serialize)]
pub struct UserStatsResponse {
    pub total_goals: u64,
    pub completed_goals: u64,
    pub total_habits: u64,
    pub max_streak: u32,
    pub level: &'static str,
    pub achievements: Vec<Achievement>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Achievement {
    pub name: &'static str,
    pub description: &'static str,
    pub achieved: bool,
    pub icon: &'static str,
}

/// Application-wide counters; public.
#[derive(Debug, Serialize)]
pub struct GlobalStatsResponse {
    pub total_users: u64,
    pub total_goals: u64,
    pub goals_achieved: u64,
    pub total_habits: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}
