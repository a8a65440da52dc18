use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;

pub const DB_FILE: &str = "staffroom.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // Surface contention as an error instead of hanging a request forever.
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            section TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    // Early workspaces predate the subject specialty column.
    ensure_teachers_subject(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS base_schedule(
            day_name TEXT NOT NULL,
            class_id TEXT NOT NULL,
            period_index INTEGER NOT NULL,
            teacher_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            note TEXT,
            PRIMARY KEY(day_name, class_id, period_index),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_base_schedule_day ON base_schedule(day_name)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_base_schedule_teacher ON base_schedule(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS daily_overrides(
            date TEXT NOT NULL,
            class_id TEXT NOT NULL,
            period_index INTEGER NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY(date, class_id, period_index),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_daily_overrides_date ON daily_overrides(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            date TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            status TEXT NOT NULL,
            PRIMARY KEY(date, teacher_id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            date TEXT NOT NULL,
            subject TEXT NOT NULL,
            note TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exams_class ON exams(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS remarks(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            date TEXT NOT NULL,
            remark TEXT NOT NULL,
            author_role TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_remarks_teacher ON remarks(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meetings(
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            title TEXT NOT NULL,
            minutes TEXT NOT NULL,
            attendees TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;
    seed_default_settings(&conn)?;

    Ok(conn)
}

pub fn settings_get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(value)
}

pub fn settings_set(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value),
    )?;
    Ok(())
}

pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn seed_default_settings(conn: &Connection) -> anyhow::Result<()> {
    let defaults: [(&str, String); 4] = [
        ("auth.principal_sha256", sha256_hex("principal123")),
        ("auth.staff_sha256", sha256_hex("staff123")),
        ("substitution.merge_policy", "first_other".to_string()),
        ("sync.poll_interval_ms", "3000".to_string()),
    ];
    for (key, value) in defaults {
        conn.execute(
            "INSERT INTO settings(key, value) VALUES(?, ?)
             ON CONFLICT(key) DO NOTHING",
            (key, &value),
        )?;
    }
    Ok(())
}

fn ensure_teachers_subject(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "teachers", "subject")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE teachers ADD COLUMN subject TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
