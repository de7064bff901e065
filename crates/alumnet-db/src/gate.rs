//! The messaging gate: a student gets five free messages per alumni, after
//! which sends are rejected until a subscription covers the pair. Alumni and
//! peer messaging never pass through here.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::models::{PairLimitRow, SubscriptionRow};
use crate::subscriptions::{query_active_monthly, query_active_quarterly};
use crate::{Database, now_ts, to_ts};

/// Free sends per (student, alumni) pair.
pub const FREE_MESSAGE_LIMIT: i64 = 5;

#[derive(Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// An active subscription covers the pair; the counter is left alone.
    Subscribed,
    /// Under the free cap; send and increment.
    Allowed { remaining: i64 },
    /// Cap reached and no subscription.
    LimitReached,
}

/// Pure decision over the three subscription sources and the counter.
/// The cached flag is a denormalized fast path; either live table wins
/// independently so pairs created after a quarterly purchase still unlock.
pub fn decide(
    cached_subscribed: bool,
    monthly_active: bool,
    quarterly_active: bool,
    message_count: i64,
) -> GateDecision {
    if cached_subscribed || monthly_active || quarterly_active {
        return GateDecision::Subscribed;
    }
    if message_count >= FREE_MESSAGE_LIMIT {
        return GateDecision::LimitReached;
    }
    GateDecision::Allowed {
        remaining: FREE_MESSAGE_LIMIT - message_count - 1,
    }
}

#[derive(Debug)]
pub enum GateOutcome {
    /// Message stored. `remaining` is None when a subscription covered the
    /// send, Some(n) when a free-tier slot was consumed.
    Sent { remaining: Option<i64> },
    LimitReached,
}

/// Read-side view for the status endpoint.
#[derive(Debug)]
pub struct GateStatus {
    pub message_count: i64,
    pub cached_subscribed: bool,
    pub monthly: Option<SubscriptionRow>,
    pub quarterly: Option<SubscriptionRow>,
}

impl GateStatus {
    pub fn subscribed(&self) -> bool {
        self.cached_subscribed || self.monthly.is_some() || self.quarterly.is_some()
    }

    pub fn remaining(&self) -> i64 {
        (FREE_MESSAGE_LIMIT - self.message_count).max(0)
    }
}

pub struct GatedSend<'a> {
    pub message_id: &'a str,
    pub student_id: &'a str,
    pub alumni_id: &'a str,
    pub content: &'a str,
    pub message_type: &'a str,
}

impl Database {
    /// Evaluate the gate and, if it passes, store the message. Decision,
    /// insert, counter increment, and daily bookkeeping share one
    /// transaction, so a concurrent send cannot double-spend a free slot.
    pub fn gated_send(&self, send: &GatedSend<'_>, now: DateTime<Utc>) -> Result<GateOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let limit = get_or_create_pair_limit(&tx, send.student_id, send.alumni_id)?;
            let monthly = query_active_monthly(&tx, send.student_id, send.alumni_id, now)?;
            let quarterly = query_active_quarterly(&tx, send.student_id, now)?;

            let decision = decide(
                limit.is_subscribed,
                monthly.is_some(),
                quarterly.is_some(),
                limit.message_count,
            );

            let outcome = match decision {
                GateDecision::LimitReached => GateOutcome::LimitReached,
                GateDecision::Subscribed => {
                    insert_message_tx(&tx, send, now)?;
                    GateOutcome::Sent { remaining: None }
                }
                GateDecision::Allowed { remaining } => {
                    insert_message_tx(&tx, send, now)?;
                    tx.execute(
                        "UPDATE per_alumni_message_limits
                         SET message_count = message_count + 1
                         WHERE student_id = ?1 AND alumni_id = ?2",
                        rusqlite::params![send.student_id, send.alumni_id],
                    )?;
                    bump_daily_counter(&tx, send.student_id, now)?;
                    GateOutcome::Sent {
                        remaining: Some(remaining),
                    }
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    pub fn gate_status(
        &self,
        student_id: &str,
        alumni_id: &str,
        now: DateTime<Utc>,
    ) -> Result<GateStatus> {
        self.with_conn(|conn| {
            let limit = query_pair_limit(conn, student_id, alumni_id)?;
            let monthly = query_active_monthly(conn, student_id, alumni_id, now)?;
            let quarterly = query_active_quarterly(conn, student_id, now)?;

            Ok(GateStatus {
                message_count: limit.as_ref().map(|l| l.message_count).unwrap_or(0),
                cached_subscribed: limit.as_ref().map(|l| l.is_subscribed).unwrap_or(false),
                monthly,
                quarterly,
            })
        })
    }

    pub fn get_pair_limit(&self, student_id: &str, alumni_id: &str) -> Result<Option<PairLimitRow>> {
        self.with_conn(|conn| query_pair_limit(conn, student_id, alumni_id))
    }

    pub fn pair_limits_for_student(&self, student_id: &str) -> Result<Vec<PairLimitRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, student_id, alumni_id, message_count, is_subscribed
                 FROM per_alumni_message_limits
                 WHERE student_id = ?1",
            )?;
            let rows = stmt
                .query_map([student_id], pair_limit_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn insert_message_tx(conn: &Connection, send: &GatedSend<'_>, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, content, message_type, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        rusqlite::params![
            send.message_id,
            send.student_id,
            send.alumni_id,
            send.content,
            send.message_type,
            to_ts(now),
        ],
    )?;
    Ok(())
}

/// Coarse per-user daily counter, reset on UTC day rollover. Bookkeeping
/// only; the per-alumni limit stays authoritative.
fn bump_daily_counter(conn: &Connection, user_id: &str, now: DateTime<Utc>) -> Result<()> {
    let day = now.date_naive().to_string();
    conn.execute(
        "INSERT INTO message_limits (user_id, day, daily_count, is_premium)
         VALUES (?1, ?2, 1, 0)
         ON CONFLICT(user_id) DO UPDATE SET
           daily_count = CASE WHEN day = excluded.day THEN daily_count + 1 ELSE 1 END,
           day = excluded.day",
        rusqlite::params![user_id, day],
    )?;
    Ok(())
}

fn pair_limit_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<PairLimitRow, rusqlite::Error> {
    Ok(PairLimitRow {
        id: row.get(0)?,
        student_id: row.get(1)?,
        alumni_id: row.get(2)?,
        message_count: row.get(3)?,
        is_subscribed: row.get(4)?,
    })
}

fn query_pair_limit(
    conn: &Connection,
    student_id: &str,
    alumni_id: &str,
) -> Result<Option<PairLimitRow>> {
    let row = conn
        .query_row(
            "SELECT id, student_id, alumni_id, message_count, is_subscribed
             FROM per_alumni_message_limits
             WHERE student_id = ?1 AND alumni_id = ?2",
            rusqlite::params![student_id, alumni_id],
            pair_limit_from_row,
        )
        .optional()?;
    Ok(row)
}

fn get_or_create_pair_limit(
    conn: &Connection,
    student_id: &str,
    alumni_id: &str,
) -> Result<PairLimitRow> {
    conn.execute(
        "INSERT OR IGNORE INTO per_alumni_message_limits
           (id, student_id, alumni_id, message_count, is_subscribed, created_at)
         VALUES (?1, ?2, ?3, 0, 0, ?4)",
        rusqlite::params![Uuid::new_v4().to_string(), student_id, alumni_id, now_ts()],
    )?;

    query_pair_limit(conn, student_id, alumni_id)?
        .ok_or_else(|| anyhow::anyhow!("pair limit row missing after upsert"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::NewUser;
    use chrono::{Months, TimeZone};

    fn seed(db: &Database) {
        for (id, username, role) in [
            ("s1", "ananya", "student"),
            ("a1", "vikram", "alumni"),
            ("a2", "priya", "alumni"),
        ] {
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
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()
    }

    fn send(db: &Database, n: usize, student: &str, alumni: &str) -> GateOutcome {
        db.gated_send(
            &GatedSend {
                message_id: &format!("m_{}_{}_{}", student, alumni, n),
                student_id: student,
                alumni_id: alumni,
                content: &format!("hi {}", n),
                message_type: "text",
            },
            t0(),
        )
        .unwrap()
    }

    #[test]
    fn decide_prefers_any_subscription_source() {
        assert_eq!(decide(true, false, false, 99), GateDecision::Subscribed);
        assert_eq!(decide(false, true, false, 99), GateDecision::Subscribed);
        assert_eq!(decide(false, false, true, 99), GateDecision::Subscribed);
        assert_eq!(decide(false, false, false, 5), GateDecision::LimitReached);
        assert_eq!(
            decide(false, false, false, 0),
            GateDecision::Allowed { remaining: 4 }
        );
    }

    #[test]
    fn sixth_message_is_rejected_with_descending_remaining() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        for n in 1..=5 {
            match send(&db, n, "s1", "a1") {
                GateOutcome::Sent { remaining } => {
                    assert_eq!(remaining, Some(5 - n as i64));
                }
                other => panic!("send {} unexpectedly gated: {:?}", n, other),
            }
        }

        assert!(matches!(send(&db, 6, "s1", "a1"), GateOutcome::LimitReached));

        // Counter stuck at the cap, never past it.
        let limit = db.get_pair_limit("s1", "a1").unwrap().unwrap();
        assert_eq!(limit.message_count, 5);
    }

    #[test]
    fn monthly_subscription_unlocks_only_that_alumni() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        for n in 1..=5 {
            send(&db, n, "s1", "a1");
        }
        for n in 1..=5 {
            send(&db, n, "s1", "a2");
        }

        db.activate_monthly("sub1", "s1", "a1", "pay_1", t0()).unwrap();

        assert!(matches!(
            send(&db, 7, "s1", "a1"),
            GateOutcome::Sent { remaining: None }
        ));
        // The other alumni stays capped.
        assert!(matches!(send(&db, 7, "s1", "a2"), GateOutcome::LimitReached));
    }

    #[test]
    fn subscribed_sends_do_not_touch_the_counter() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        send(&db, 1, "s1", "a1");
        db.activate_monthly("sub1", "s1", "a1", "pay_1", t0()).unwrap();
        send(&db, 2, "s1", "a1");
        send(&db, 3, "s1", "a1");

        let limit = db.get_pair_limit("s1", "a1").unwrap().unwrap();
        assert_eq!(limit.message_count, 1);
    }

    #[test]
    fn quarterly_flips_every_existing_pair_and_covers_new_ones() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        for n in 1..=5 {
            send(&db, n, "s1", "a1");
        }
        send(&db, 1, "s1", "a2");

        db.activate_quarterly("q1", "s1", "pay_1", t0()).unwrap();

        // Every existing pair row is flipped.
        let limits = db.pair_limits_for_student("s1").unwrap();
        assert_eq!(limits.len(), 2);
        assert!(limits.iter().all(|l| l.is_subscribed));

        // Previously capped alumni is messageable again.
        assert!(matches!(
            send(&db, 7, "s1", "a1"),
            GateOutcome::Sent { remaining: None }
        ));

        // A pair with no pre-set flag consults the quarterly table.
        let db2 = Database::open_in_memory().unwrap();
        seed(&db2);
        db2.activate_quarterly("q1", "s1", "pay_1", t0()).unwrap();
        assert!(matches!(
            db2.gated_send(
                &GatedSend {
                    message_id: "m_fresh",
                    student_id: "s1",
                    alumni_id: "a1",
                    content: "hello",
                    message_type: "text",
                },
                t0(),
            )
            .unwrap(),
            GateOutcome::Sent { remaining: None }
        ));
    }

    #[test]
    fn expired_quarterly_no_longer_covers_new_pairs() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.activate_quarterly("q1", "s1", "pay_1", t0()).unwrap();

        let later = t0() + Months::new(3);
        let outcome = db
            .gated_send(
                &GatedSend {
                    message_id: "m_late",
                    student_id: "s1",
                    alumni_id: "a1",
                    content: "hello",
                    message_type: "text",
                },
                later,
            )
            .unwrap();
        // No cached flag on a fresh pair and the window is closed, so this
        // consumes a free slot.
        assert!(matches!(outcome, GateOutcome::Sent { remaining: Some(4) }));
    }

    #[test]
    fn cached_flag_matches_live_derivation_after_activation() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        send(&db, 1, "s1", "a1");
        db.activate_monthly("sub1", "s1", "a1", "pay_1", t0()).unwrap();

        let status = db.gate_status("s1", "a1", t0()).unwrap();
        assert_eq!(status.cached_subscribed, status.monthly.is_some());

        send(&db, 1, "s1", "a2");
        db.activate_quarterly("q1", "s1", "pay_2", t0()).unwrap();
        let status2 = db.gate_status("s1", "a2", t0()).unwrap();
        assert_eq!(status2.cached_subscribed, status2.quarterly.is_some());
    }

    #[test]
    fn daily_counter_rolls_over_on_new_day() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        let day1 = t0();
        let day2 = Utc.with_ymd_and_hms(2026, 1, 11, 0, 30, 0).unwrap();

        for n in 1..=3 {
            db.gated_send(
                &GatedSend {
                    message_id: &format!("d1_{}", n),
                    student_id: "s1",
                    alumni_id: "a1",
                    content: "hi",
                    message_type: "text",
                },
                day1,
            )
            .unwrap();
        }

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT daily_count FROM message_limits WHERE user_id = 's1'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 3);

        db.gated_send(
            &GatedSend {
                message_id: "d2_1",
                student_id: "s1",
                alumni_id: "a1",
                content: "hi",
                message_type: "text",
            },
            day2,
        )
        .unwrap();

        let (day, count): (String, i64) = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT day, daily_count FROM message_limits WHERE user_id = 's1'",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .unwrap();
        assert_eq!(day, "2026-01-11");
        assert_eq!(count, 1);
    }
}
