use crate::config::Config;
use crate::index::{
    Annotation, CallSite, IndexSnapshot, MethodInfo, SymbolIndex, TypeInfo, TypeKind,
    listened_event,
};
use crate::model::Visibility;
use anyhow::{Context, Result, anyhow};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

mod migrations;

pub use migrations::SCHEMA_VERSION;

const SNAPSHOT_DIGEST_KEY: &str = "snapshot_digest";
const LAST_IMPORTED_KEY: &str = "last_imported";

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

/// Row counts written by one snapshot import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub types: usize,
    pub methods: usize,
    pub calls: usize,
    pub listeners: usize,
    /// The stored digest matched and nothing was written.
    pub skipped: bool,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexOverview {
    pub db_path: String,
    pub types: usize,
    pub methods: usize,
    pub calls: usize,
    pub listeners: usize,
    pub snapshot_digest: Option<String>,
    pub last_imported: Option<i64>,
}

/// SQLite-backed [`SymbolIndex`].
pub struct Db {
    db_path: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl Db {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db directory {}", parent.display()))?;
        }

        let config = Config::get();
        info!(
            pool_size = config.pool_size,
            min_idle = config.pool_min_idle,
            "initializing connection pool"
        );

        // Open write connection first and run migrations
        let write_conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        migrations::migrate(&write_conn)?;

        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.pool_min_idle))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .with_context(|| "create connection pool")?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_conn,
            read_pool,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .with_context(|| "get read connection from pool")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.write_conn
            .lock()
            .map_err(|_| anyhow!("sqlite write connection poisoned"))
    }

    /// Replaces the stored index with `snapshot`. Unchanged snapshots are
    /// skipped unless `force` is set.
    pub fn import_snapshot(&self, snapshot: &IndexSnapshot, force: bool) -> Result<ImportStats> {
        let digest = snapshot.digest()?;
        if !force && self.get_meta(SNAPSHOT_DIGEST_KEY)?.as_deref() == Some(digest.as_str()) {
            info!(%digest, "snapshot unchanged, skipping import");
            return Ok(ImportStats {
                skipped: true,
                digest,
                ..ImportStats::default()
            });
        }

        let mut stats = ImportStats {
            digest: digest.clone(),
            ..ImportStats::default()
        };
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute_batch(
            "
            DELETE FROM event_listeners;
            DELETE FROM call_sites;
            DELETE FROM methods;
            DELETE FROM supertypes;
            DELETE FROM types;
            ",
        )?;
        {
            let mut insert_type = tx.prepare(
                "INSERT INTO types (name, kind, annotations, project_source, file_path)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(name) DO UPDATE SET
                    kind = excluded.kind,
                    annotations = excluded.annotations,
                    project_source = excluded.project_source,
                    file_path = excluded.file_path",
            )?;
            let mut insert_super =
                tx.prepare("INSERT INTO supertypes (type_name, super_name) VALUES (?, ?)")?;
            for ty in &snapshot.types {
                insert_type.execute(params![
                    &ty.qualified_name,
                    ty.kind.as_str(),
                    serde_json::to_string(&ty.annotations)?,
                    ty.project_source,
                    ty.file_path.as_deref(),
                ])?;
                for supertype in &ty.supertypes {
                    insert_super.execute(params![&ty.qualified_name, supertype])?;
                }
                stats.types += 1;
            }

            let mut insert_method = tx.prepare(
                "INSERT INTO methods
                 (method_id, owner, name, parameter_types, return_type, visibility, is_static, is_abstract, annotations, file_path, line)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(method_id) DO NOTHING",
            )?;
            let mut insert_listener = tx.prepare(
                "INSERT INTO event_listeners (event, method_id) VALUES (?, ?)
                 ON CONFLICT(event, method_id) DO NOTHING",
            )?;
            for method in &snapshot.methods {
                let mut method = method.clone();
                method.ensure_id();
                stats.methods += insert_method.execute(params![
                    &method.id,
                    &method.owner,
                    &method.name,
                    serde_json::to_string(&method.parameter_types)?,
                    &method.return_type,
                    method.visibility.as_str(),
                    method.is_static,
                    method.is_abstract,
                    serde_json::to_string(&method.annotations)?,
                    method.file_path.as_deref(),
                    method.line,
                ])?;
                if let Some(event) = listened_event(&method) {
                    stats.listeners += insert_listener.execute(params![event, &method.id])?;
                }
            }

            let mut insert_call = tx.prepare(
                "INSERT INTO call_sites (source, target, line, published_event) VALUES (?, ?, ?, ?)",
            )?;
            for call in &snapshot.calls {
                insert_call.execute(params![
                    &call.from,
                    &call.to,
                    call.line,
                    call.publishes.as_deref()
                ])?;
                stats.calls += 1;
            }
        }
        set_meta(&tx, SNAPSHOT_DIGEST_KEY, &digest)?;
        set_meta(&tx, LAST_IMPORTED_KEY, &unix_now().to_string())?;
        tx.commit()?;

        info!(
            types = stats.types,
            methods = stats.methods,
            calls = stats.calls,
            listeners = stats.listeners,
            "snapshot imported"
        );
        Ok(stats)
    }

    pub fn overview(&self) -> Result<IndexOverview> {
        let conn = self.read_conn()?;
        Ok(IndexOverview {
            db_path: self.db_path.to_string_lossy().to_string(),
            types: count_rows(&conn, "types")?,
            methods: count_rows(&conn, "methods")?,
            calls: count_rows(&conn, "call_sites")?,
            listeners: count_rows(&conn, "event_listeners")?,
            snapshot_digest: self.get_meta(SNAPSHOT_DIGEST_KEY)?,
            last_imported: self
                .get_meta(LAST_IMPORTED_KEY)?
                .and_then(|v| v.parse::<i64>().ok()),
        })
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self
            .read_conn()?
            .query_row(
                "SELECT value FROM meta WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn query_methods(&self, sql: &str, arg: &str) -> Result<Vec<MethodInfo>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![arg], MethodRow::from_row)?;
        let mut methods = Vec::new();
        for row in rows {
            methods.push(row?.into_method()?);
        }
        Ok(methods)
    }

    fn query_types(&self, sql: &str, arg: &str) -> Result<Vec<TypeInfo>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![arg], TypeRow::from_row)?;
        let mut types = Vec::new();
        for row in rows {
            types.push(row?.into_type(&conn)?);
        }
        Ok(types)
    }

    fn query_strings(&self, sql: &str, arg: &str) -> Result<Vec<String>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![arg], |row| row.get(0))?;
        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }

    fn query_call_sites(&self, sql: &str, arg: &str) -> Result<Vec<CallSite>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![arg], |row| {
            Ok(CallSite {
                target: row.get(0)?,
                line: row.get(1)?,
                published_event: row.get(2)?,
            })
        })?;
        let mut sites = Vec::new();
        for row in rows {
            sites.push(row?);
        }
        Ok(sites)
    }
}

const METHOD_COLUMNS: &str = "method_id, owner, name, parameter_types, return_type, visibility, is_static, is_abstract, annotations, file_path, line";
const TYPE_COLUMNS: &str = "name, kind, annotations, project_source, file_path";

impl SymbolIndex for Db {
    fn method(&self, id: &str) -> Result<Option<MethodInfo>> {
        let sql = format!("SELECT {METHOD_COLUMNS} FROM methods WHERE method_id = ?");
        Ok(self.query_methods(&sql, id)?.into_iter().next())
    }

    fn methods_named(&self, name: &str) -> Result<Vec<MethodInfo>> {
        let sql = format!("SELECT {METHOD_COLUMNS} FROM methods WHERE name = ? ORDER BY id");
        self.query_methods(&sql, name)
    }

    fn methods_of(&self, type_name: &str) -> Result<Vec<MethodInfo>> {
        let sql = format!("SELECT {METHOD_COLUMNS} FROM methods WHERE owner = ? ORDER BY id");
        self.query_methods(&sql, type_name)
    }

    fn call_sites_of(&self, method_id: &str) -> Result<Vec<CallSite>> {
        self.query_call_sites(
            "SELECT target, line, published_event FROM call_sites WHERE source = ? ORDER BY id",
            method_id,
        )
    }

    fn callers_of(&self, method_id: &str) -> Result<Vec<CallSite>> {
        self.query_call_sites(
            "SELECT source, line, published_event FROM call_sites WHERE target = ? ORDER BY id",
            method_id,
        )
    }

    fn type_info(&self, type_name: &str) -> Result<Option<TypeInfo>> {
        let sql = format!("SELECT {TYPE_COLUMNS} FROM types WHERE name = ?");
        Ok(self.query_types(&sql, type_name)?.into_iter().next())
    }

    fn implementers_of(&self, type_name: &str) -> Result<Vec<TypeInfo>> {
        let sql = format!(
            "WITH RECURSIVE sub(name) AS (
                SELECT type_name FROM supertypes WHERE super_name = ?1
                UNION
                SELECT s.type_name FROM supertypes s JOIN sub ON s.super_name = sub.name
             )
             SELECT {TYPE_COLUMNS} FROM types
             WHERE name IN (SELECT name FROM sub) AND name <> ?1
             ORDER BY id"
        );
        self.query_types(&sql, type_name)
    }

    fn listeners_of(&self, event_type: &str) -> Result<Vec<String>> {
        self.query_strings(
            "SELECT method_id FROM event_listeners WHERE event = ? ORDER BY id",
            event_type,
        )
    }

    fn publishers_of(&self, event_type: &str) -> Result<Vec<String>> {
        self.query_strings(
            "SELECT source FROM call_sites WHERE published_event = ?
             GROUP BY source ORDER BY MIN(id)",
            event_type,
        )
    }
}

struct MethodRow {
    id: String,
    owner: String,
    name: String,
    parameter_types: String,
    return_type: String,
    visibility: String,
    is_static: bool,
    is_abstract: bool,
    annotations: String,
    file_path: Option<String>,
    line: Option<i64>,
}

impl MethodRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner: row.get(1)?,
            name: row.get(2)?,
            parameter_types: row.get(3)?,
            return_type: row.get(4)?,
            visibility: row.get(5)?,
            is_static: row.get(6)?,
            is_abstract: row.get(7)?,
            annotations: row.get(8)?,
            file_path: row.get(9)?,
            line: row.get(10)?,
        })
    }

    fn into_method(self) -> Result<MethodInfo> {
        let parameter_types: Vec<String> = serde_json::from_str(&self.parameter_types)
            .with_context(|| format!("decode parameter types of {}", self.id))?;
        let annotations: Vec<Annotation> = serde_json::from_str(&self.annotations)
            .with_context(|| format!("decode annotations of {}", self.id))?;
        Ok(MethodInfo {
            id: self.id,
            owner: self.owner,
            name: self.name,
            parameter_types,
            return_type: self.return_type,
            visibility: Visibility::parse(&self.visibility).unwrap_or_default(),
            is_static: self.is_static,
            is_abstract: self.is_abstract,
            annotations,
            file_path: self.file_path,
            line: self.line,
        })
    }
}

struct TypeRow {
    name: String,
    kind: String,
    annotations: String,
    project_source: bool,
    file_path: Option<String>,
}

impl TypeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            kind: row.get(1)?,
            annotations: row.get(2)?,
            project_source: row.get(3)?,
            file_path: row.get(4)?,
        })
    }

    fn into_type(self, conn: &Connection) -> Result<TypeInfo> {
        let annotations: Vec<Annotation> = serde_json::from_str(&self.annotations)
            .with_context(|| format!("decode annotations of {}", self.name))?;
        let mut stmt =
            conn.prepare_cached("SELECT super_name FROM supertypes WHERE type_name = ? ORDER BY id")?;
        let rows = stmt.query_map(params![&self.name], |row| row.get::<_, String>(0))?;
        let mut supertypes = Vec::new();
        for row in rows {
            supertypes.push(row?);
        }
        debug!(name = %self.name, supertypes = supertypes.len(), "loaded type");
        Ok(TypeInfo {
            qualified_name: self.name,
            kind: TypeKind::parse(&self.kind),
            annotations,
            supertypes,
            project_source: self.project_source,
            file_path: self.file_path,
        })
    }
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
