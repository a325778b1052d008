use anyhow::{Result, bail};
use rusqlite::TransactionBehavior;
use tracing::debug;

use crate::models::ResetTokenRow;
use crate::{Database, OptionalExt};

/// A token is usable only while all three hold. Validation and consumption
/// share this predicate so they can never disagree.
const ACTIVE_TOKEN: &str = "token_hash = ?1 AND used = 0 AND expires_at > ?2";

impl Database {
    /// `expires_at` is unix milliseconds (UTC).
    pub fn insert_reset_token(&self, id: &str, user_id: &str, token_hash: &str, expires_at: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at) VALUES (?1, ?2, ?3, ?4)",
                (id, user_id, token_hash, expires_at),
            )?;
            Ok(())
        })
    }

    pub fn find_active_reset_token(&self, token_hash: &str, now: i64) -> Result<Option<ResetTokenRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, user_id, expires_at, used FROM password_reset_tokens WHERE {ACTIVE_TOKEN}"
            );
            let row = conn
                .query_row(&sql, (token_hash, now), |row| {
                    Ok(ResetTokenRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        expires_at: row.get(2)?,
                        used: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    /// Mark an active token used and replace its owner's password hash, both
    /// in one transaction. Returns the owner's id, or `None` when no active
    /// token matched (wrong value, already used, expired, or lost a race).
    pub fn consume_reset_token(
        &self,
        token_hash: &str,
        now: i64,
        new_password_hash: &str,
    ) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let sql = format!("SELECT id, user_id FROM password_reset_tokens WHERE {ACTIVE_TOKEN}");
            let claimed: Option<(String, String)> = tx
                .query_row(&sql, (token_hash, now), |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?;

            let Some((token_id, user_id)) = claimed else {
                return Ok(None);
            };

            // Conditional write under the same predicate: flips the token only
            // if it is still unused and unexpired.
            let sql = format!("UPDATE password_reset_tokens SET used = 1, used_at = ?2 WHERE {ACTIVE_TOKEN}");
            let changed = tx.execute(&sql, (token_hash, now))?;
            if changed != 1 {
                debug!("Reset token {} was consumed concurrently", token_id);
                return Ok(None);
            }

            let updated = tx.execute(
                "UPDATE users SET password = ?1 WHERE id = ?2",
                (new_password_hash, &user_id),
            )?;
            if updated != 1 {
                bail!("Reset token {} references missing user {}", token_id, user_id);
            }

            tx.commit()?;
            Ok(Some(user_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_750_000_000_000;
    const HOUR: i64 = 3_600_000;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "a@example.com", "A", "old-hash").unwrap();
        db
    }

    #[test]
    fn active_token_is_found_until_expiry() {
        let db = setup();
        db.insert_reset_token("t1", "u1", "h1", NOW + HOUR).unwrap();

        let row = db.find_active_reset_token("h1", NOW).unwrap().unwrap();
        assert_eq!(row.user_id, "u1");
        assert!(!row.used);

        assert!(db.find_active_reset_token("h1", NOW + HOUR).unwrap().is_none());
        assert!(db.find_active_reset_token("other", NOW).unwrap().is_none());
    }

    #[test]
    fn consume_is_single_use_and_updates_password() {
        let db = setup();
        db.insert_reset_token("t1", "u1", "h1", NOW + HOUR).unwrap();

        let owner = db.consume_reset_token("h1", NOW, "new-hash").unwrap();
        assert_eq!(owner.as_deref(), Some("u1"));
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().password, "new-hash");

        assert!(db.consume_reset_token("h1", NOW, "second-hash").unwrap().is_none());
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().password, "new-hash");
        assert!(db.find_active_reset_token("h1", NOW).unwrap().is_none());
    }

    #[test]
    fn expired_token_is_not_consumed() {
        let db = setup();
        db.insert_reset_token("t1", "u1", "h1", NOW - 1).unwrap();

        assert!(db.consume_reset_token("h1", NOW, "new-hash").unwrap().is_none());
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().password, "old-hash");
    }

    #[test]
    fn tokens_for_same_user_are_independent() {
        let db = setup();
        db.insert_reset_token("t1", "u1", "h1", NOW + HOUR).unwrap();
        db.insert_reset_token("t2", "u1", "h2", NOW + HOUR).unwrap();

        db.consume_reset_token("h1", NOW, "new-hash").unwrap().unwrap();
        assert!(db.find_active_reset_token("h2", NOW).unwrap().is_some());
    }
}
