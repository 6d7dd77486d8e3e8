use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "lectured.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS profiles(
            id TEXT PRIMARY KEY,
            login_id TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_plans(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            instructor TEXT NOT NULL,
            target_code TEXT NOT NULL DEFAULT '',
            target_detail TEXT NOT NULL DEFAULT '',
            class_day TEXT NOT NULL DEFAULT '',
            class_time TEXT NOT NULL DEFAULT '',
            course1 TEXT NOT NULL DEFAULT '',
            material1 TEXT NOT NULL DEFAULT '',
            course2 TEXT NOT NULL DEFAULT '',
            material2 TEXT NOT NULL DEFAULT '',
            learning_goal TEXT NOT NULL DEFAULT '',
            management_plan TEXT NOT NULL DEFAULT '',
            parent_intro TEXT NOT NULL DEFAULT '',
            promo_note TEXT NOT NULL DEFAULT '',
            keywords TEXT NOT NULL DEFAULT '',
            etc_note TEXT NOT NULL DEFAULT '',
            template_category TEXT NOT NULL DEFAULT 'basic',
            color_theme TEXT NOT NULL DEFAULT 'navy',
            template_id TEXT,
            page_size TEXT NOT NULL DEFAULT 'A4',
            source_saved_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_plans_instructor ON class_plans(instructor)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_plans_deleted ON class_plans(deleted_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS weekly_plan_items(
            plan_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            week_label TEXT NOT NULL,
            topic TEXT NOT NULL,
            PRIMARY KEY(plan_id, position),
            FOREIGN KEY(plan_id) REFERENCES class_plans(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_rows(
            id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            label TEXT NOT NULL,
            amount INTEGER NOT NULL DEFAULT 0,
            note TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(plan_id) REFERENCES class_plans(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_rows_plan ON fee_rows(plan_id, position)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS templates(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            color_theme TEXT NOT NULL,
            page_size TEXT NOT NULL DEFAULT 'A4',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS template_blocks(
            id TEXT PRIMARY KEY,
            template_id TEXT NOT NULL,
            block_key TEXT NOT NULL,
            kind TEXT NOT NULL,
            x REAL NOT NULL,
            y REAL NOT NULL,
            w REAL NOT NULL,
            h REAL NOT NULL,
            z_index INTEGER NOT NULL DEFAULT 0,
            exclude_from_export INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL,
            UNIQUE(template_id, block_key),
            FOREIGN KEY(template_id) REFERENCES templates(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_template_blocks_template ON template_blocks(template_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_logs(
            id TEXT PRIMARY KEY,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            detail TEXT NOT NULL,
            created_at TEXT NOT NULL,
            seq INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_logs_seq ON activity_logs(seq)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, raw),
    )?;
    Ok(())
}
