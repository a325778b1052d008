use anyhow::Result;
use rusqlite::{Row, types::ToSql};

use crate::models::{HabitPatch, HabitRow, NewHabit};
use crate::{Database, OptionalExt, json_column};

const HABIT_COLUMNS: &str = "id, user_id, name, description, category, frequency, target, \
     completed_dates, streak, progress, created_at, updated_at";

impl Database {
    pub fn create_habit(&self, habit: &NewHabit<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO habits (id, user_id, name, description, category, frequency, target)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    habit.id,
                    habit.user_id,
                    habit.name,
                    habit.description,
                    habit.category,
                    habit.frequency,
                    habit.target,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_habit(&self, id: &str) -> Result<Option<HabitRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1");
            conn.query_row(&sql, [id], map_habit).optional()
        })
    }

    /// Newest first.
    pub fn list_habits(&self, user_id: &str) -> Result<Vec<HabitRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_habit)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply the `Some` fields of `patch`. Returns false if the habit does not exist.
    pub fn update_habit(&self, id: &str, patch: &HabitPatch) -> Result<bool> {
        let dates_json = patch
            .completed_dates
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(name) = &patch.name {
            sets.push("name");
            values.push(name);
        }
        if let Some(description) = &patch.description {
            sets.push("description");
            values.push(description);
        }
        if let Some(category) = &patch.category {
            sets.push("category");
            values.push(category);
        }
        if let Some(frequency) = &patch.frequency {
            sets.push("frequency");
            values.push(frequency);
        }
        if let Some(target) = &patch.target {
            sets.push("target");
            values.push(target);
        }
        if let Some(dates) = &dates_json {
            sets.push("completed_dates");
            values.push(dates);
        }
        if let Some(streak) = &patch.streak {
            sets.push("streak");
            values.push(streak);
        }
        if let Some(progress) = &patch.progress {
            sets.push("progress");
            values.push(progress);
        }

        let assignments: Vec<String> = sets
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 2))
            .chain(std::iter::once("updated_at = datetime('now')".to_string()))
            .collect();
        let sql = format!("UPDATE habits SET {} WHERE id = ?1", assignments.join(", "));

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(values.len() + 1);
        params.push(&id);
        params.extend(values);

        self.with_conn(|conn| Ok(conn.execute(&sql, params.as_slice())? > 0))
    }

    pub fn delete_habit(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM habits WHERE id = ?1", [id])? > 0))
    }

    pub fn count_habits(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM habits WHERE user_id = ?1", [user_id], |r| r.get(0))?;
            Ok(n as u64)
        })
    }

    pub fn count_all_habits(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM habits", [], |r| r.get(0))?;
            Ok(n as u64)
        })
    }

    pub fn max_habit_streak(&self, user_id: &str) -> Result<u32> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COALESCE(MAX(streak), 0) FROM habits WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )?;
            Ok(n.max(0) as u32)
        })
    }
}

fn map_habit(row: &Row<'_>) -> rusqlite::Result<HabitRow> {
    let id: String = row.get(0)?;
    let dates: String = row.get(7)?;
    let completed_dates = json_column(&dates, "completed_dates", &id);
    Ok(HabitRow {
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        frequency: row.get(5)?,
        target: row.get(6)?,
        completed_dates,
        streak: row.get(8)?,
        progress: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        id,
    })
}
