use manifest_types::models::Milestone;

// Database row types. These map directly to SQLite rows and stay distinct
// from the manifest-types API models.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub created_at: String,
}

/// Profile update; `None` leaves the column untouched and `Some(None)` clears
/// a nullable one.
#[derive(Debug, Default)]
pub struct UserPatch {
    pub full_name: Option<String>,
    pub avatar: Option<Option<String>>,
    pub bio: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub website: Option<Option<String>>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.avatar.is_none()
            && self.bio.is_none()
            && self.location.is_none()
            && self.website.is_none()
    }
}

pub struct HabitRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub frequency: String,
    pub target: i64,
    pub completed_dates: Vec<String>,
    pub streak: u32,
    pub progress: u8,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewHabit<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub frequency: &'a str,
    pub target: i64,
}

/// Field-by-field habit update; `None` leaves the column untouched.
#[derive(Debug, Default)]
pub struct HabitPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub frequency: Option<String>,
    pub target: Option<i64>,
    pub completed_dates: Option<Vec<String>>,
    pub streak: Option<u32>,
    pub progress: Option<u8>,
}

pub struct GoalRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub target_date: Option<String>,
    pub progress: u8,
    pub status: String,
    pub milestones: Vec<Milestone>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewGoal<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub target_date: Option<&'a str>,
    pub milestones: &'a [Milestone],
}

/// Field-by-field goal update; `None` leaves the column untouched.
#[derive(Debug, Default)]
pub struct GoalPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    /// `Some(None)` clears the date.
    pub target_date: Option<Option<String>>,
    pub progress: Option<u8>,
    pub status: Option<String>,
    pub milestones: Option<Vec<Milestone>>,
}

pub struct ResetTokenRow {
    pub id: String,
    pub user_id: String,
    pub expires_at: i64,
    pub used: bool,
}
