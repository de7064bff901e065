use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{BatchRow, MessageRow, UserRow};
use crate::{Database, now_ts};

pub struct NewUser<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub display_name: &'a str,
    pub college: Option<&'a str>,
    pub graduation_year: Option<i64>,
    pub batch_id: Option<&'a str>,
}

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users
                   (id, username, password, role, display_name, college, graduation_year, batch_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.password_hash,
                    user.role,
                    user.display_name,
                    user.college,
                    user.graduation_year,
                    user.batch_id,
                    now_ts(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_display_name(&self, id: &str) -> Result<String> {
        self.with_conn(|conn| {
            conn.query_row("SELECT display_name FROM users WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .map_err(|_| anyhow!("User not found: {}", id))
        })
    }

    // -- Batches --

    /// Find or create the batch for a (college, graduation_year) pair.
    /// Returns the batch id either way.
    pub fn ensure_batch(&self, new_id: &str, college: &str, graduation_year: i64) -> Result<String> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO batches (id, college, graduation_year, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![new_id, college, graduation_year, now_ts()],
            )?;

            let id: String = conn.query_row(
                "SELECT id FROM batches WHERE college = ?1 AND graduation_year = ?2",
                rusqlite::params![college, graduation_year],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    pub fn get_batch(&self, id: &str) -> Result<Option<BatchRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, college, graduation_year, created_at FROM batches WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(BatchRow {
                            id: row.get(0)?,
                            college: row.get(1)?,
                            graduation_year: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn batch_member_count(&self, batch_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE batch_id = ?1",
                [batch_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn get_batch_members(&self, batch_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLS} FROM users WHERE batch_id = ?1 ORDER BY display_name"
            ))?;
            let rows = stmt
                .query_map([batch_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_batch_member(&self, batch_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM users WHERE id = ?1 AND batch_id = ?2",
                    rusqlite::params![user_id, batch_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Direct messages --

    /// Ungated insert, used when no student->alumni gate applies.
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
        message_type: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, message_type, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                rusqlite::params![id, sender_id, receiver_id, content, message_type, now_ts()],
            )?;
            Ok(())
        })
    }

    /// Both directions of a conversation, newest first, cursor on created_at.
    pub fn get_conversation(
        &self,
        user_a: &str,
        user_b: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, message_type, is_read, created_at
                 FROM messages
                 WHERE ((sender_id = ?1 AND receiver_id = ?2)
                     OR (sender_id = ?2 AND receiver_id = ?1))
                   AND (?3 IS NULL OR created_at < ?3)
                 ORDER BY created_at DESC
                 LIMIT ?4",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_a, user_b, before, limit], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        content: row.get(3)?,
                        message_type: row.get(4)?,
                        is_read: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark everything the other party sent to `reader` as read.
    pub fn mark_conversation_read(&self, reader: &str, other: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE receiver_id = ?1 AND sender_id = ?2 AND is_read = 0",
                rusqlite::params![reader, other],
            )?;
            Ok(changed)
        })
    }
}

const USER_COLS: &str =
    "id, username, password, role, display_name, college, graduation_year, batch_id, created_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        role: row.get(3)?,
        display_name: row.get(4)?,
        college: row.get(5)?,
        graduation_year: row.get(6)?,
        batch_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is a compile-time constant at every call site, never user input.
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLS} FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_user(db: &Database, id: &str, username: &str, role: &str, batch_id: Option<&str>) {
        db.create_user(&NewUser {
            id,
            username,
            password_hash: "hash",
            role,
            display_name: username,
            college: Some("IIT-B"),
            graduation_year: Some(2024),
            batch_id,
        })
        .unwrap();
    }

    #[test]
    fn create_and_fetch_user() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "u1", "ananya", "student", None);

        let fetched = db.get_user_by_username("ananya").unwrap().unwrap();
        assert_eq!(fetched.id, "u1");
        assert_eq!(fetched.role, "student");
        assert!(db.get_user_by_id("nope").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_rejected() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "u1", "ananya", "student", None);
        let dup = db.create_user(&NewUser {
            id: "u2",
            username: "ananya",
            password_hash: "hash",
            role: "alumni",
            display_name: "ananya",
            college: None,
            graduation_year: None,
            batch_id: None,
        });
        assert!(dup.is_err());
    }

    #[test]
    fn ensure_batch_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let first = db.ensure_batch("b1", "IIT-B", 2024).unwrap();
        let second = db.ensure_batch("b2", "IIT-B", 2024).unwrap();
        assert_eq!(first, "b1");
        assert_eq!(second, "b1");

        let other = db.ensure_batch("b3", "IIT-B", 2025).unwrap();
        assert_eq!(other, "b3");
    }

    #[test]
    fn batch_roster_and_membership() {
        let db = Database::open_in_memory().unwrap();
        let batch = db.ensure_batch("b1", "IIT-B", 2024).unwrap();
        add_user(&db, "u1", "ananya", "student", Some("b1"));
        add_user(&db, "u2", "rohan", "student", Some("b1"));
        add_user(&db, "u3", "meera", "student", None);

        assert_eq!(db.batch_member_count(&batch).unwrap(), 2);
        assert_eq!(db.get_batch_members(&batch).unwrap().len(), 2);
        assert!(db.is_batch_member(&batch, "u1").unwrap());
        assert!(!db.is_batch_member(&batch, "u3").unwrap());
    }

    #[test]
    fn conversation_is_bidirectional() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "u1", "ananya", "student", None);
        add_user(&db, "u2", "vikram", "alumni", None);

        db.insert_message("m1", "u1", "u2", "hello", "text").unwrap();
        db.insert_message("m2", "u2", "u1", "hi back", "text").unwrap();
        // Unknown receiver trips the foreign key.
        assert!(db.insert_message("m3", "u1", "nobody", "x", "text").is_err());

        let convo = db.get_conversation("u1", "u2", 50, None).unwrap();
        assert_eq!(convo.len(), 2);

        let changed = db.mark_conversation_read("u1", "u2").unwrap();
        assert_eq!(changed, 1);
        // Second pass is a no-op.
        assert_eq!(db.mark_conversation_read("u1", "u2").unwrap(), 0);
    }
}
