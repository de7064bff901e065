use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS batches (
            id                  TEXT PRIMARY KEY,
            college             TEXT NOT NULL,
            graduation_year     INTEGER NOT NULL,
            created_at          TEXT NOT NULL,
            UNIQUE(college, graduation_year)
        );

        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            role            TEXT NOT NULL,
            display_name    TEXT NOT NULL,
            college         TEXT,
            graduation_year INTEGER,
            batch_id        TEXT REFERENCES batches(id),
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            receiver_id     TEXT NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL,
            message_type    TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, created_at);

        -- Coarse per-user daily free counter; bookkeeping only, the
        -- per-alumni limit below is the authoritative gate.
        CREATE TABLE IF NOT EXISTS message_limits (
            user_id     TEXT PRIMARY KEY REFERENCES users(id),
            day         TEXT NOT NULL,
            daily_count INTEGER NOT NULL DEFAULT 0,
            is_premium  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS per_alumni_message_limits (
            id            TEXT PRIMARY KEY,
            student_id    TEXT NOT NULL REFERENCES users(id),
            alumni_id     TEXT NOT NULL REFERENCES users(id),
            message_count INTEGER NOT NULL DEFAULT 0,
            is_subscribed INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL,
            UNIQUE(student_id, alumni_id)
        );

        CREATE INDEX IF NOT EXISTS idx_pair_limits_student
            ON per_alumni_message_limits(student_id);

        CREATE TABLE IF NOT EXISTS alumni_subscriptions (
            id           TEXT PRIMARY KEY,
            student_id   TEXT NOT NULL REFERENCES users(id),
            alumni_id    TEXT NOT NULL REFERENCES users(id),
            amount       INTEGER NOT NULL,
            platform_fee INTEGER NOT NULL,
            alumni_share INTEGER NOT NULL,
            start_date   TEXT NOT NULL,
            end_date     TEXT NOT NULL,
            payment_id   TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            CHECK(end_date > start_date)
        );

        CREATE INDEX IF NOT EXISTS idx_alumni_subs_pair
            ON alumni_subscriptions(student_id, alumni_id, end_date);

        CREATE TABLE IF NOT EXISTS quarterly_subscriptions (
            id           TEXT PRIMARY KEY,
            student_id   TEXT NOT NULL REFERENCES users(id),
            amount       INTEGER NOT NULL,
            platform_fee INTEGER NOT NULL,
            alumni_share INTEGER NOT NULL,
            start_date   TEXT NOT NULL,
            end_date     TEXT NOT NULL,
            payment_id   TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            CHECK(end_date > start_date)
        );

        CREATE INDEX IF NOT EXISTS idx_quarterly_subs_student
            ON quarterly_subscriptions(student_id, end_date);

        -- UNIQUE(order_id, payment_id) makes gateway callback replay a no-op.
        CREATE TABLE IF NOT EXISTS payments (
            id         TEXT PRIMARY KEY,
            order_id   TEXT NOT NULL,
            payment_id TEXT NOT NULL,
            student_id TEXT NOT NULL REFERENCES users(id),
            alumni_id  TEXT REFERENCES users(id),
            purpose    TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(order_id, payment_id)
        );

        CREATE TABLE IF NOT EXISTS batch_messages (
            id          TEXT PRIMARY KEY,
            batch_id    TEXT NOT NULL REFERENCES batches(id),
            sender_id   TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            parent_id   TEXT REFERENCES batch_messages(id),
            is_deleted  INTEGER NOT NULL DEFAULT 0,
            edited_at   TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_batch_messages_batch
            ON batch_messages(batch_id, created_at);

        -- One reaction per (message, user); the emoji column is overwritten
        -- on re-reaction (last write wins per user).
        CREATE TABLE IF NOT EXISTS batch_reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES batch_messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_batch_reactions_message
            ON batch_reactions(message_id);

        CREATE TABLE IF NOT EXISTS batch_reads (
            message_id  TEXT NOT NULL REFERENCES batch_messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            read_at     TEXT NOT NULL,
            PRIMARY KEY(message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS job_postings (
            id           TEXT PRIMARY KEY,
            alumni_id    TEXT NOT NULL REFERENCES users(id),
            title        TEXT NOT NULL,
            company      TEXT NOT NULL,
            description  TEXT NOT NULL,
            apply_link   TEXT NOT NULL,
            unlock_price INTEGER,
            created_at   TEXT NOT NULL
        );

        -- Append-only unlock list; UNIQUE(job_id, user_id) keeps it a set.
        CREATE TABLE IF NOT EXISTS job_unlocks (
            id         TEXT PRIMARY KEY,
            job_id     TEXT NOT NULL REFERENCES job_postings(id),
            user_id    TEXT NOT NULL REFERENCES users(id),
            payment_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(job_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
