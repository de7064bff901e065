use anyhow::Result;
use rusqlite::OptionalExtension;
use std::collections::HashSet;

use crate::models::JobRow;
use crate::{Database, now_ts};

pub struct NewJob<'a> {
    pub id: &'a str,
    pub alumni_id: &'a str,
    pub title: &'a str,
    pub company: &'a str,
    pub description: &'a str,
    pub apply_link: &'a str,
    pub unlock_price: Option<i64>,
}

impl Database {
    pub fn insert_job(&self, job: &NewJob<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO job_postings
                   (id, alumni_id, title, company, description, apply_link, unlock_price, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    job.id,
                    job.alumni_id,
                    job.title,
                    job.company,
                    job.description,
                    job.apply_link,
                    job.unlock_price,
                    now_ts(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_jobs(&self) -> Result<Vec<JobRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, alumni_id, title, company, description, apply_link, unlock_price, created_at
                 FROM job_postings
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], job_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_job(&self, id: &str) -> Result<Option<JobRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, alumni_id, title, company, description, apply_link, unlock_price, created_at
                     FROM job_postings
                     WHERE id = ?1",
                    [id],
                    job_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Job ids the user has paid to unlock.
    pub fn unlocked_job_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT job_id FROM job_unlocks WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn has_unlocked(&self, job_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM job_unlocks WHERE job_id = ?1 AND user_id = ?2",
                    rusqlite::params![job_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Append-only; re-unlocking is a no-op thanks to UNIQUE(job_id, user_id).
    pub fn insert_unlock(
        &self,
        id: &str,
        job_id: &str,
        user_id: &str,
        payment_id: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO job_unlocks (id, job_id, user_id, payment_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, job_id, user_id, payment_id, now_ts()],
            )?;
            Ok(())
        })
    }
}

fn job_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<JobRow, rusqlite::Error> {
    Ok(JobRow {
        id: row.get(0)?,
        alumni_id: row.get(1)?,
        title: row.get(2)?,
        company: row.get(3)?,
        description: row.get(4)?,
        apply_link: row.get(5)?,
        unlock_price: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::NewUser;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        for (id, username, role) in [("a1", "vikram", "alumni"), ("s1", "ananya", "student")] {
            db.create_user(&NewUser {
                id,
                username,
                password_hash: "hash",
                role,
                display_name: username,
                college: None,
                graduation_year: None,
                batch_id: None,
            })
            .unwrap();
        }
        db
    }

    #[test]
    fn unlock_list_is_a_set() {
        let db = setup();
        db.insert_job(&NewJob {
            id: "j1",
            alumni_id: "a1",
            title: "Backend Engineer",
            company: "Initech",
            description: "Rust services",
            apply_link: "https://example.com/apply",
            unlock_price: Some(50),
        })
        .unwrap();

        assert!(!db.has_unlocked("j1", "s1").unwrap());
        db.insert_unlock("ul1", "j1", "s1", "pay_1").unwrap();
        db.insert_unlock("ul2", "j1", "s1", "pay_2").unwrap();

        assert!(db.has_unlocked("j1", "s1").unwrap());
        assert_eq!(db.unlocked_job_ids("s1").unwrap().len(), 1);
    }

    #[test]
    fn list_and_get_jobs() {
        let db = setup();
        db.insert_job(&NewJob {
            id: "j1",
            alumni_id: "a1",
            title: "Backend Engineer",
            company: "Initech",
            description: "Rust services",
            apply_link: "https://example.com/apply",
            unlock_price: None,
        })
        .unwrap();

        assert_eq!(db.list_jobs().unwrap().len(), 1);
        let job = db.get_job("j1").unwrap().unwrap();
        assert_eq!(job.company, "Initech");
        assert!(job.unlock_price.is_none());
        assert!(db.get_job("nope").unwrap().is_none());
    }
}
