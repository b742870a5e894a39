use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

pub const SCHEMA_VERSION: i64 = 2;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS types (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            annotations TEXT NOT NULL DEFAULT '[]',
            project_source INTEGER NOT NULL DEFAULT 1,
            file_path TEXT
        );

        CREATE TABLE IF NOT EXISTS supertypes (
            id INTEGER PRIMARY KEY,
            type_name TEXT NOT NULL,
            super_name TEXT NOT NULL,
            FOREIGN KEY(type_name) REFERENCES types(name) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_supertypes_super ON supertypes(super_name);
        CREATE INDEX IF NOT EXISTS idx_supertypes_type ON supertypes(type_name);

        CREATE TABLE IF NOT EXISTS methods (
            id INTEGER PRIMARY KEY,
            method_id TEXT NOT NULL UNIQUE,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            parameter_types TEXT NOT NULL DEFAULT '[]',
            return_type TEXT NOT NULL DEFAULT 'void',
            visibility TEXT NOT NULL DEFAULT 'public',
            is_static INTEGER NOT NULL DEFAULT 0,
            is_abstract INTEGER NOT NULL DEFAULT 0,
            annotations TEXT NOT NULL DEFAULT '[]',
            file_path TEXT,
            line INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_methods_name ON methods(name);
        CREATE INDEX IF NOT EXISTS idx_methods_owner ON methods(owner);

        CREATE TABLE IF NOT EXISTS call_sites (
            id INTEGER PRIMARY KEY,
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            line INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_call_sites_source ON call_sites(source);
        CREATE INDEX IF NOT EXISTS idx_call_sites_target ON call_sites(target);

        CREATE TABLE IF NOT EXISTS event_listeners (
            id INTEGER PRIMARY KEY,
            event TEXT NOT NULL,
            method_id TEXT NOT NULL,
            UNIQUE(event, method_id)
        );

        CREATE INDEX IF NOT EXISTS idx_event_listeners_event ON event_listeners(event);
        COMMIT;
        ",
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                row.get::<_, String>(0)
                    .map(|v| v.parse::<i64>().unwrap_or(0))
            },
        )
        .optional()?;

    let existing = existing.unwrap_or(0);

    if existing < 2 && !has_column(conn, "call_sites", "published_event")? {
        conn.execute("ALTER TABLE call_sites ADD COLUMN published_event TEXT", [])?;
    }
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_call_sites_event ON call_sites(published_event)",
        [],
    )?;

    if existing < SCHEMA_VERSION {
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [SCHEMA_VERSION.to_string()],
        )?;
    }

    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for row in rows {
        if row? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
