use anyhow::Result;
use rusqlite::OptionalExtension;

use crate::models::PaymentRow;
use crate::{Database, now_ts};

#[derive(Debug, PartialEq, Eq)]
pub enum PaymentInsert {
    Recorded,
    /// The (order_id, payment_id) pair already exists — a replayed gateway
    /// callback. Nothing written.
    Duplicate,
}

impl Database {
    /// Record a verified payment. Rides the UNIQUE(order_id, payment_id)
    /// index, so replaying the same callback is a no-op.
    pub fn insert_payment(
        &self,
        id: &str,
        order_id: &str,
        payment_id: &str,
        student_id: &str,
        alumni_id: Option<&str>,
        purpose: &str,
    ) -> Result<PaymentInsert> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO payments
                   (id, order_id, payment_id, student_id, alumni_id, purpose, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, order_id, payment_id, student_id, alumni_id, purpose, now_ts()],
            )?;
            Ok(if inserted == 1 {
                PaymentInsert::Recorded
            } else {
                PaymentInsert::Duplicate
            })
        })
    }

    /// Whether a verified payment with this gateway payment id exists for
    /// the given student and purpose. Subscription activation requires one
    /// (verify-then-activate); the scoping keeps a payment recorded for one
    /// user or purpose from backing another's activation.
    pub fn payment_verified(&self, payment_id: &str, student_id: &str, purpose: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM payments
                     WHERE payment_id = ?1 AND student_id = ?2 AND purpose = ?3",
                    rusqlite::params![payment_id, student_id, purpose],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_payment(&self, order_id: &str, payment_id: &str) -> Result<Option<PaymentRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, order_id, payment_id, student_id, alumni_id, purpose, created_at
                     FROM payments
                     WHERE order_id = ?1 AND payment_id = ?2",
                    rusqlite::params![order_id, payment_id],
                    |row| {
                        Ok(PaymentRow {
                            id: row.get(0)?,
                            order_id: row.get(1)?,
                            payment_id: row.get(2)?,
                            student_id: row.get(3)?,
                            alumni_id: row.get(4)?,
                            purpose: row.get(5)?,
                            created_at: row.get(6)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::NewUser;

    fn seed(db: &Database) {
        db.create_user(&NewUser {
            id: "s1",
            username: "ananya",
            password_hash: "hash",
            role: "student",
            display_name: "ananya",
            college: None,
            graduation_year: None,
            batch_id: None,
        })
        .unwrap();
    }

    #[test]
    fn replayed_payment_is_a_noop() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        let first = db
            .insert_payment("p1", "order_1", "pay_1", "s1", None, "subscription")
            .unwrap();
        assert_eq!(first, PaymentInsert::Recorded);

        let replay = db
            .insert_payment("p2", "order_1", "pay_1", "s1", None, "subscription")
            .unwrap();
        assert_eq!(replay, PaymentInsert::Duplicate);

        // Only the first row survives.
        let row = db.get_payment("order_1", "pay_1").unwrap().unwrap();
        assert_eq!(row.id, "p1");
    }

    #[test]
    fn payment_verified_is_scoped_to_student_and_purpose() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        assert!(!db.payment_verified("pay_1", "s1", "subscription").unwrap());
        db.insert_payment("p1", "order_1", "pay_1", "s1", None, "subscription")
            .unwrap();
        assert!(db.payment_verified("pay_1", "s1", "subscription").unwrap());

        // Another student, or another purpose, cannot claim the same payment.
        assert!(!db.payment_verified("pay_1", "s2", "subscription").unwrap());
        assert!(!db.payment_verified("pay_1", "s1", "job_unlock").unwrap());
    }
}
