//! Batch chat storage: gating-free group messaging with reactions, flat
//! threaded replies, soft delete, and read receipts.

use anyhow::Result;
use rusqlite::OptionalExtension;

use crate::models::{BatchMessageRow, ReactionRow, ReadReceiptRow};
use crate::{Database, now_ts};

/// Content a deleted message is replaced with.
pub const TOMBSTONE: &str = "This message was deleted";

#[derive(Debug, PartialEq, Eq)]
pub enum ChatInsert {
    Inserted,
    /// `parent_id` referenced a message that does not exist in this batch.
    ParentNotFound,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChatMutation {
    Applied,
    NotFound,
    NotAuthor,
    Deleted,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReactionChange {
    Added,
    /// Same user reacted with a different emoji; previous one replaced.
    Replaced,
    /// Same user sent the same emoji again; reaction removed.
    Removed,
}

impl Database {
    pub fn insert_batch_message(
        &self,
        id: &str,
        batch_id: &str,
        sender_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<ChatInsert> {
        self.with_conn_mut(|conn| {
            if let Some(parent) = parent_id {
                let exists: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM batch_messages WHERE id = ?1 AND batch_id = ?2",
                        rusqlite::params![parent, batch_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Ok(ChatInsert::ParentNotFound);
                }
            }

            conn.execute(
                "INSERT INTO batch_messages
                   (id, batch_id, sender_id, content, parent_id, is_deleted, edited_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6)",
                rusqlite::params![id, batch_id, sender_id, content, parent_id, now_ts()],
            )?;
            Ok(ChatInsert::Inserted)
        })
    }

    pub fn get_batch_messages(
        &self,
        batch_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<BatchMessageRow>> {
        self.with_conn(|conn| {
            // JOIN users for the sender name in one query (no N+1).
            let mut stmt = conn.prepare(
                "SELECT m.id, m.batch_id, m.sender_id, u.display_name, m.content,
                        m.parent_id, m.is_deleted, m.edited_at, m.created_at
                 FROM batch_messages m
                 LEFT JOIN users u ON m.sender_id = u.id
                 WHERE m.batch_id = ?1
                   AND (?2 IS NULL OR m.created_at < ?2)
                 ORDER BY m.created_at DESC
                 LIMIT ?3",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![batch_id, before, limit], |row| {
                    Ok(BatchMessageRow {
                        id: row.get(0)?,
                        batch_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        sender_name: row
                            .get::<_, Option<String>>(3)?
                            .unwrap_or_else(|| "unknown".to_string()),
                        content: row.get(4)?,
                        parent_id: row.get(5)?,
                        is_deleted: row.get(6)?,
                        edited_at: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_batch_message(&self, id: &str) -> Result<Option<BatchMessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT m.id, m.batch_id, m.sender_id, u.display_name, m.content,
                            m.parent_id, m.is_deleted, m.edited_at, m.created_at
                     FROM batch_messages m
                     LEFT JOIN users u ON m.sender_id = u.id
                     WHERE m.id = ?1",
                    [id],
                    |row| {
                        Ok(BatchMessageRow {
                            id: row.get(0)?,
                            batch_id: row.get(1)?,
                            sender_id: row.get(2)?,
                            sender_name: row
                                .get::<_, Option<String>>(3)?
                                .unwrap_or_else(|| "unknown".to_string()),
                            content: row.get(4)?,
                            parent_id: row.get(5)?,
                            is_deleted: row.get(6)?,
                            edited_at: row.get(7)?,
                            created_at: row.get(8)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn edit_batch_message(
        &self,
        message_id: &str,
        editor_id: &str,
        content: &str,
    ) -> Result<ChatMutation> {
        self.with_conn_mut(|conn| {
            let row: Option<(String, bool)> = conn
                .query_row(
                    "SELECT sender_id, is_deleted FROM batch_messages WHERE id = ?1",
                    [message_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((sender_id, is_deleted)) = row else {
                return Ok(ChatMutation::NotFound);
            };
            if sender_id != editor_id {
                return Ok(ChatMutation::NotAuthor);
            }
            if is_deleted {
                return Ok(ChatMutation::Deleted);
            }

            conn.execute(
                "UPDATE batch_messages SET content = ?1, edited_at = ?2 WHERE id = ?3",
                rusqlite::params![content, now_ts(), message_id],
            )?;
            Ok(ChatMutation::Applied)
        })
    }

    /// Soft delete: the row stays, the content becomes a tombstone.
    pub fn delete_batch_message(&self, message_id: &str, deleter_id: &str) -> Result<ChatMutation> {
        self.with_conn_mut(|conn| {
            let row: Option<(String, bool)> = conn
                .query_row(
                    "SELECT sender_id, is_deleted FROM batch_messages WHERE id = ?1",
                    [message_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((sender_id, is_deleted)) = row else {
                return Ok(ChatMutation::NotFound);
            };
            if sender_id != deleter_id {
                return Ok(ChatMutation::NotAuthor);
            }
            if is_deleted {
                return Ok(ChatMutation::Deleted);
            }

            conn.execute(
                "UPDATE batch_messages SET content = ?1, is_deleted = 1 WHERE id = ?2",
                rusqlite::params![TOMBSTONE, message_id],
            )?;
            Ok(ChatMutation::Applied)
        })
    }

    /// One reaction per (message, user), last write wins. Re-sending the
    /// current emoji toggles the reaction off.
    pub fn set_reaction(
        &self,
        id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<ReactionChange> {
        self.with_conn_mut(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT emoji FROM batch_reactions WHERE message_id = ?1 AND user_id = ?2",
                    rusqlite::params![message_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(current) if current == emoji => {
                    conn.execute(
                        "DELETE FROM batch_reactions WHERE message_id = ?1 AND user_id = ?2",
                        rusqlite::params![message_id, user_id],
                    )?;
                    Ok(ReactionChange::Removed)
                }
                Some(_) => {
                    conn.execute(
                        "UPDATE batch_reactions SET emoji = ?1, created_at = ?2
                         WHERE message_id = ?3 AND user_id = ?4",
                        rusqlite::params![emoji, now_ts(), message_id, user_id],
                    )?;
                    Ok(ReactionChange::Replaced)
                }
                None => {
                    conn.execute(
                        "INSERT INTO batch_reactions (id, message_id, user_id, emoji, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![id, message_id, user_id, emoji, now_ts()],
                    )?;
                    Ok(ReactionChange::Added)
                }
            }
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn get_reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, user_id, emoji FROM batch_reactions WHERE message_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        emoji: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Idempotent per (message, user).
    pub fn mark_batch_message_read(&self, message_id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO batch_reads (message_id, user_id, read_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![message_id, user_id, now_ts()],
            )?;
            Ok(())
        })
    }

    pub fn get_reads_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReadReceiptRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, user_id, read_at FROM batch_reads WHERE message_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReadReceiptRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        read_at: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::NewUser;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        let batch = db.ensure_batch("b1", "IIT-B", 2024).unwrap();
        assert_eq!(batch, "b1");
        for (id, username) in [("u1", "ananya"), ("u2", "rohan")] {
            db.create_user(&NewUser {
                id,
                username,
                password_hash: "hash",
                role: "student",
                display_name: username,
                college: Some("IIT-B"),
                graduation_year: Some(2024),
                batch_id: Some("b1"),
            })
            .unwrap();
        }
        db
    }

    #[test]
    fn reply_requires_existing_parent_in_same_batch() {
        let db = setup();
        db.ensure_batch("b2", "IIT-B", 2025).unwrap();

        assert_eq!(
            db.insert_batch_message("bm1", "b1", "u1", "root", None).unwrap(),
            ChatInsert::Inserted
        );
        assert_eq!(
            db.insert_batch_message("bm2", "b1", "u2", "reply", Some("bm1")).unwrap(),
            ChatInsert::Inserted
        );
        // Parent lives in b1, not b2.
        assert_eq!(
            db.insert_batch_message("bm3", "b2", "u1", "cross", Some("bm1")).unwrap(),
            ChatInsert::ParentNotFound
        );
        assert_eq!(
            db.insert_batch_message("bm4", "b1", "u1", "orphan", Some("nope")).unwrap(),
            ChatInsert::ParentNotFound
        );
    }

    #[test]
    fn reaction_is_last_write_wins_per_user() {
        let db = setup();
        db.insert_batch_message("bm1", "b1", "u1", "hello", None).unwrap();

        assert_eq!(
            db.set_reaction("r1", "bm1", "u2", "👍").unwrap(),
            ReactionChange::Added
        );
        assert_eq!(
            db.set_reaction("r2", "bm1", "u2", "🎉").unwrap(),
            ReactionChange::Replaced
        );

        let reactions = db.get_reactions_for_messages(&["bm1".to_string()]).unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].emoji, "🎉");

        // Same emoji again toggles it off.
        assert_eq!(
            db.set_reaction("r3", "bm1", "u2", "🎉").unwrap(),
            ReactionChange::Removed
        );
        assert!(db.get_reactions_for_messages(&["bm1".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn soft_delete_leaves_a_tombstone() {
        let db = setup();
        db.insert_batch_message("bm1", "b1", "u1", "regret this", None).unwrap();

        assert_eq!(
            db.delete_batch_message("bm1", "u2").unwrap(),
            ChatMutation::NotAuthor
        );
        assert_eq!(
            db.delete_batch_message("bm1", "u1").unwrap(),
            ChatMutation::Applied
        );

        let row = db.get_batch_message("bm1").unwrap().unwrap();
        assert!(row.is_deleted);
        assert_eq!(row.content, TOMBSTONE);

        // Editing or re-deleting a tombstone fails.
        assert_eq!(
            db.edit_batch_message("bm1", "u1", "undo").unwrap(),
            ChatMutation::Deleted
        );
        assert_eq!(
            db.delete_batch_message("bm1", "u1").unwrap(),
            ChatMutation::Deleted
        );
    }

    #[test]
    fn edit_stamps_edited_at() {
        let db = setup();
        db.insert_batch_message("bm1", "b1", "u1", "typo", None).unwrap();

        assert_eq!(
            db.edit_batch_message("bm1", "u1", "fixed").unwrap(),
            ChatMutation::Applied
        );
        let row = db.get_batch_message("bm1").unwrap().unwrap();
        assert_eq!(row.content, "fixed");
        assert!(row.edited_at.is_some());

        assert_eq!(
            db.edit_batch_message("nope", "u1", "x").unwrap(),
            ChatMutation::NotFound
        );
    }

    #[test]
    fn read_receipts_are_idempotent() {
        let db = setup();
        db.insert_batch_message("bm1", "b1", "u1", "hello", None).unwrap();

        db.mark_batch_message_read("bm1", "u2").unwrap();
        db.mark_batch_message_read("bm1", "u2").unwrap();

        let reads = db.get_reads_for_messages(&["bm1".to_string()]).unwrap();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].user_id, "u2");
    }
}
