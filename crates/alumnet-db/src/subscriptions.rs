use anyhow::Result;
use chrono::{DateTime, Months, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::models::SubscriptionRow;
use crate::{Database, now_ts, to_ts};

/// Fixed tier pricing. Amounts are whole currency units; the platform keeps
/// its percentage and the remainder is the alumni share.
pub const MONTHLY_AMOUNT: i64 = 300;
pub const MONTHLY_PLATFORM_PCT: i64 = 30;
pub const QUARTERLY_AMOUNT: i64 = 1000;
pub const QUARTERLY_PLATFORM_PCT: i64 = 20;

#[derive(Debug, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated,
    /// An active subscription for the same scope already exists; nothing
    /// created (no stacking or extension semantics).
    AlreadyActive,
}

impl Database {
    /// Active monthly subscription for the exact (student, alumni) pair.
    pub fn active_monthly(
        &self,
        student_id: &str,
        alumni_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SubscriptionRow>> {
        self.with_conn(|conn| query_active_monthly(conn, student_id, alumni_id, now))
    }

    /// Active quarterly (all-alumni) subscription for the student.
    pub fn active_quarterly(
        &self,
        student_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SubscriptionRow>> {
        self.with_conn(|conn| query_active_quarterly(conn, student_id, now))
    }

    /// One month of access to a single alumni. Upserts the pair's limit row
    /// with `is_subscribed = true` in the same transaction.
    pub fn activate_monthly(
        &self,
        id: &str,
        student_id: &str,
        alumni_id: &str,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ActivationOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if query_active_monthly(&tx, student_id, alumni_id, now)?.is_some() {
                return Ok(ActivationOutcome::AlreadyActive);
            }

            let end = now + Months::new(1);
            let platform_fee = MONTHLY_AMOUNT * MONTHLY_PLATFORM_PCT / 100;
            tx.execute(
                "INSERT INTO alumni_subscriptions
                   (id, student_id, alumni_id, amount, platform_fee, alumni_share,
                    start_date, end_date, payment_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    id,
                    student_id,
                    alumni_id,
                    MONTHLY_AMOUNT,
                    platform_fee,
                    MONTHLY_AMOUNT - platform_fee,
                    to_ts(now),
                    to_ts(end),
                    payment_id,
                    now_ts(),
                ],
            )?;

            tx.execute(
                "INSERT INTO per_alumni_message_limits
                   (id, student_id, alumni_id, message_count, is_subscribed, created_at)
                 VALUES (?1, ?2, ?3, 0, 1, ?4)
                 ON CONFLICT(student_id, alumni_id) DO UPDATE SET is_subscribed = 1",
                rusqlite::params![format!("pal_{}", id), student_id, alumni_id, now_ts()],
            )?;

            tx.commit()?;
            info!(student_id, alumni_id, "monthly subscription activated");
            Ok(ActivationOutcome::Activated)
        })
    }

    /// Three months of access to all alumni. Flips `is_subscribed` on every
    /// existing limit row of the student; pairs created later consult the
    /// quarterly table at gate time instead.
    pub fn activate_quarterly(
        &self,
        id: &str,
        student_id: &str,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ActivationOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if query_active_quarterly(&tx, student_id, now)?.is_some() {
                return Ok(ActivationOutcome::AlreadyActive);
            }

            let end = now + Months::new(3);
            let platform_fee = QUARTERLY_AMOUNT * QUARTERLY_PLATFORM_PCT / 100;
            tx.execute(
                "INSERT INTO quarterly_subscriptions
                   (id, student_id, amount, platform_fee, alumni_share,
                    start_date, end_date, payment_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    id,
                    student_id,
                    QUARTERLY_AMOUNT,
                    platform_fee,
                    QUARTERLY_AMOUNT - platform_fee,
                    to_ts(now),
                    to_ts(end),
                    payment_id,
                    now_ts(),
                ],
            )?;

            let flipped = tx.execute(
                "UPDATE per_alumni_message_limits SET is_subscribed = 1 WHERE student_id = ?1",
                [student_id],
            )?;

            tx.commit()?;
            info!(student_id, flipped, "quarterly subscription activated");
            Ok(ActivationOutcome::Activated)
        })
    }
}

pub(crate) fn query_active_monthly(
    conn: &Connection,
    student_id: &str,
    alumni_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<SubscriptionRow>> {
    let row = conn
        .query_row(
            "SELECT id, student_id, alumni_id, amount, platform_fee, alumni_share,
                    start_date, end_date, payment_id
             FROM alumni_subscriptions
             WHERE student_id = ?1 AND alumni_id = ?2 AND end_date > ?3
             ORDER BY end_date DESC
             LIMIT 1",
            rusqlite::params![student_id, alumni_id, to_ts(now)],
            |row| {
                Ok(SubscriptionRow {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    alumni_id: Some(row.get(2)?),
                    amount: row.get(3)?,
                    platform_fee: row.get(4)?,
                    alumni_share: row.get(5)?,
                    start_date: row.get(6)?,
                    end_date: row.get(7)?,
                    payment_id: row.get(8)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn query_active_quarterly(
    conn: &Connection,
    student_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<SubscriptionRow>> {
    let row = conn
        .query_row(
            "SELECT id, student_id, amount, platform_fee, alumni_share,
                    start_date, end_date, payment_id
             FROM quarterly_subscriptions
             WHERE student_id = ?1 AND end_date > ?2
             ORDER BY end_date DESC
             LIMIT 1",
            rusqlite::params![student_id, to_ts(now)],
            |row| {
                Ok(SubscriptionRow {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    alumni_id: None,
                    amount: row.get(2)?,
                    platform_fee: row.get(3)?,
                    alumni_share: row.get(4)?,
                    start_date: row.get(5)?,
                    end_date: row.get(6)?,
                    payment_id: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}
