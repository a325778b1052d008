use anyhow::Result;
use rusqlite::{Row, types::ToSql};

use crate::models::{GoalPatch, GoalRow, NewGoal};
use crate::{Database, OptionalExt, json_column};

const GOAL_COLUMNS: &str = "id, user_id, title, description, category, target_date, progress, \
     status, milestones, created_at, updated_at";

impl Database {
    pub fn create_goal(&self, goal: &NewGoal<'_>) -> Result<()> {
        let milestones = serde_json::to_string(goal.milestones)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO goals (id, user_id, title, description, category, target_date, milestones)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    goal.id,
                    goal.user_id,
                    goal.title,
                    goal.description,
                    goal.category,
                    goal.target_date,
                    milestones,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_goal(&self, id: &str) -> Result<Option<GoalRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = ?1");
            conn.query_row(&sql, [id], map_goal).optional()
        })
    }

    pub fn list_goals(&self, user_id: &str) -> Result<Vec<GoalRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_goal)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply the `Some` fields of `patch`. Returns false if the goal does not exist.
    pub fn update_goal(&self, id: &str, patch: &GoalPatch) -> Result<bool> {
        let milestones_json = patch.milestones.as_ref().map(serde_json::to_string).transpose()?;

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(title) = &patch.title {
            sets.push("title");
            values.push(title);
        }
        if let Some(description) = &patch.description {
            sets.push("description");
            values.push(description);
        }
        if let Some(category) = &patch.category {
            sets.push("category");
            values.push(category);
        }
        if let Some(target_date) = &patch.target_date {
            sets.push("target_date");
            values.push(target_date);
        }
        if let Some(progress) = &patch.progress {
            sets.push("progress");
            values.push(progress);
        }
        if let Some(status) = &patch.status {
            sets.push("status");
            values.push(status);
        }
        if let Some(milestones) = &milestones_json {
            sets.push("milestones");
            values.push(milestones);
        }

        let assignments: Vec<String> = sets
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 2))
            .chain(std::iter::once("updated_at = datetime('now')".to_string()))
            .collect();
        let sql = format!("UPDATE goals SET {} WHERE id = ?1", assignments.join(", "));

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(values.len() + 1);
        params.push(&id);
        params.extend(values);

        self.with_conn(|conn| Ok(conn.execute(&sql, params.as_slice())? > 0))
    }

    pub fn delete_goal(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM goals WHERE id = ?1", [id])? > 0))
    }

    /// Count a user's goals, optionally restricted to one status.
    pub fn count_goals(&self, user_id: &str, status: Option<&str>) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = match status {
                Some(status) => conn.query_row(
                    "SELECT COUNT(*) FROM goals WHERE user_id = ?1 AND status = ?2",
                    [user_id, status],
                    |r| r.get(0),
                )?,
                None => conn.query_row(
                    "SELECT COUNT(*) FROM goals WHERE user_id = ?1",
                    [user_id],
                    |r| r.get(0),
                )?,
            };
            Ok(n as u64)
        })
    }

    /// Count goals across all users, optionally restricted to one status.
    pub fn count_all_goals(&self, status: Option<&str>) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = match status {
                Some(status) => {
                    conn.query_row("SELECT COUNT(*) FROM goals WHERE status = ?1", [status], |r| r.get(0))?
                }
                None => conn.query_row("SELECT COUNT(*) FROM goals", [], |r| r.get(0))?,
            };
            Ok(n as u64)
        })
    }
}

fn map_goal(row: &Row<'_>) -> rusqlite::Result<GoalRow> {
    let id: String = row.get(0)?;
    let milestones: String = row.get(8)?;
    let milestones = json_column(&milestones, "milestones", &id);
    Ok(GoalRow {
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        target_date: row.get(5)?,
        progress: row.get(6)?,
        status: row.get(7)?,
        milestones,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        id,
    })
}
