use anyhow::Result;
use rusqlite::{Connection, Row, types::ToSql};

use crate::models::{UserPatch, UserRow};
use crate::{Database, OptionalExt};

const USER_COLUMNS: &str = "id, email, full_name, password, avatar, bio, location, website, created_at";

impl Database {
    pub fn create_user(&self, id: &str, email: &str, full_name: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, full_name, password) VALUES (?1, ?2, ?3, ?4)",
                (id, email, full_name, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Apply the `Some` fields of `patch`. Returns false if the user does not
    /// exist or the patch is empty.
    pub fn update_user(&self, id: &str, patch: &UserPatch) -> Result<bool> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(full_name) = &patch.full_name {
            sets.push("full_name");
            values.push(full_name);
        }
        for (column, value) in [
            ("avatar", &patch.avatar),
            ("bio", &patch.bio),
            ("location", &patch.location),
            ("website", &patch.website),
        ] {
            if let Some(value) = value {
                sets.push(column);
                values.push(value);
            }
        }

        if sets.is_empty() {
            return Ok(false);
        }

        let assignments: Vec<String> = sets
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 2))
            .collect();
        let sql = format!("UPDATE users SET {} WHERE id = ?1", assignments.join(", "));

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(values.len() + 1);
        params.push(&id);
        params.extend(values);

        self.with_conn(|conn| Ok(conn.execute(&sql, params.as_slice())? > 0))
    }

    pub fn count_users(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            Ok(n as u64)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        password: row.get(3)?,
        avatar: row.get(4)?,
        bio: row.get(5)?,
        location: row.get(6)?,
        website: row.get(7)?,
        created_at: row.get(8)?,
    })
}
