use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use kernel::{CommitState, PrincipalRow, RecordKind, Role, Visibility};
use rusqlite::{params, Connection, Error, OpenFlags, Row};

use crate::domain::{MetadataStore, NewFileRecord, RecordRow};

const CACHE_SIZE: &str = "4096";

pub enum Mode {
    ReadWrite,
    ReadOnly,
}

/// SQLite-backed metadata store.
pub struct Sqlite {
    conn: Connection,
}

impl Sqlite {
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self, Error> {
        let c = match mode {
            Mode::ReadWrite => Connection::open(path),
            Mode::ReadOnly => Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY),
        };
        Ok(Self { conn: c? })
    }

    fn enable_foreign_keys(&self) -> Result<(), Error> {
        self.pragma_update("foreign_keys", "ON")
    }

    fn assign_cache_size(&self) -> Result<(), Error> {
        self.pragma_update("cache_size", CACHE_SIZE)
    }

    fn pragma_update(&self, name: &str, value: &str) -> Result<(), Error> {
        self.conn.pragma_update(None, name, value)
    }

    fn prepare_write(&self) -> Result<(), Error> {
        self.assign_cache_size()?;
        self.enable_foreign_keys()?;
        self.pragma_update("synchronous", "FULL")
    }
}

fn visibility_str(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Private => "private",
        Visibility::Shared => "shared",
    }
}

fn conversion_failure(what: &str, value: &str) -> Error {
    Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("unknown {what}: {value}").into(),
    )
}

fn parse_kind(value: &str) -> Result<RecordKind, Error> {
    match value {
        "file" => Ok(RecordKind::File),
        "folder" => Ok(RecordKind::Folder),
        other => Err(conversion_failure("kind", other)),
    }
}

fn parse_visibility(value: &str) -> Result<Visibility, Error> {
    match value {
        "private" => Ok(Visibility::Private),
        "shared" => Ok(Visibility::Shared),
        other => Err(conversion_failure("visibility", other)),
    }
}

fn parse_state(value: &str) -> Result<CommitState, Error> {
    match value {
        "pending" => Ok(CommitState::Pending),
        "committed" => Ok(CommitState::Committed),
        other => Err(conversion_failure("state", other)),
    }
}

const RECORD_COLUMNS: &str = "id, name, kind, parent_id, owner, visibility, state, size, blob_key, content_type, created_at, updated_at";

fn read_record(row: &Row<'_>) -> Result<RecordRow, Error> {
    let kind: String = row.get(2)?;
    let visibility: String = row.get(5)?;
    let state: String = row.get(6)?;
    Ok(RecordRow {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: parse_kind(&kind)?,
        parent_id: row.get(3)?,
        owner: row.get(4)?,
        visibility: parse_visibility(&visibility)?,
        state: parse_state(&state)?,
        size: row.get(7)?,
        blob_key: row.get(8)?,
        content_type: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl MetadataStore for Sqlite {
    type Err = Error;

    fn new_database(&self) -> Result<(), Self::Err> {
        self.pragma_update("encoding", "UTF-8")?;

        self.conn.execute(
            "CREATE TABLE record (
                  id           INTEGER PRIMARY KEY AUTOINCREMENT,
                  name         TEXT NOT NULL,
                  kind         TEXT NOT NULL,
                  parent_id    INTEGER REFERENCES record(id) ON DELETE RESTRICT ON UPDATE RESTRICT,
                  owner        TEXT NOT NULL,
                  visibility   TEXT NOT NULL,
                  state        TEXT NOT NULL,
                  size         INTEGER,
                  blob_key     TEXT,
                  content_type TEXT,
                  created_at   TEXT NOT NULL,
                  updated_at   TEXT NOT NULL
                  )",
            [],
        )?;

        self.conn
            .execute("CREATE INDEX record_parent_ix ON record(parent_id)", [])?;

        self.conn.execute(
            "CREATE TABLE principal (
                  id         INTEGER PRIMARY KEY AUTOINCREMENT,
                  first_name TEXT NOT NULL,
                  last_name  TEXT NOT NULL,
                  email      TEXT NOT NULL UNIQUE,
                  role       TEXT NOT NULL,
                  created_at TEXT NOT NULL
                  )",
            [],
        )?;

        Ok(())
    }

    fn insert_pending_file(&mut self, record: &NewFileRecord<'_>) -> Result<i64, Self::Err> {
        self.prepare_write()?;

        let now = Utc::now();
        let tx = self.conn.transaction()?;
        tx.prepare_cached(
            "INSERT INTO record (name, kind, parent_id, owner, visibility, state, size, blob_key, content_type, created_at, updated_at)
                 VALUES (?1, 'file', ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?8)",
        )?
        .execute(params![
            record.name,
            record.parent_id,
            record.owner,
            visibility_str(record.visibility),
            record.size,
            record.blob_key,
            record.content_type,
            now,
        ])?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(id)
    }

    fn commit_file(&mut self, id: i64) -> Result<usize, Self::Err> {
        self.prepare_write()?;
        self.conn
            .prepare_cached(
                "UPDATE record SET state = 'committed', updated_at = ?2 WHERE id = ?1 AND state = 'pending'",
            )?
            .execute(params![id, Utc::now()])
    }

    fn create_folder(
        &mut self,
        name: &str,
        parent_id: Option<i64>,
        owner: &str,
        visibility: Visibility,
    ) -> Result<i64, Self::Err> {
        self.prepare_write()?;

        let now = Utc::now();
        let tx = self.conn.transaction()?;
        tx.prepare_cached(
            "INSERT INTO record (name, kind, parent_id, owner, visibility, state, created_at, updated_at)
                 VALUES (?1, 'folder', ?2, ?3, ?4, 'committed', ?5, ?5)",
        )?
        .execute(params![name, parent_id, owner, visibility_str(visibility), now])?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(id)
    }

    fn get_record(&mut self, id: i64) -> Result<Option<RecordRow>, Self::Err> {
        let query = format!("SELECT {RECORD_COLUMNS} FROM record WHERE id = ?1");
        let mut stmt = self.conn.prepare_cached(&query)?;
        let mut rows = stmt.query_map(params![id], read_record)?;
        rows.next().transpose()
    }

    fn children(
        &mut self,
        parent_id: Option<i64>,
        principal: &str,
    ) -> Result<Vec<RecordRow>, Self::Err> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM record
                 WHERE parent_id IS ?1 AND state = 'committed'
                 AND (owner = ?2 OR visibility = 'shared')"
        );
        let mut stmt = self.conn.prepare_cached(&query)?;
        let rows = stmt.query_map(params![parent_id, principal], read_record)?;
        rows.collect()
    }

    fn find_child_folder(
        &mut self,
        parent_id: Option<i64>,
        name: &str,
        principal: &str,
    ) -> Result<Option<i64>, Self::Err> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id FROM record
                 WHERE parent_id IS ?1 AND name = ?2 AND kind = 'folder' AND state = 'committed'
                 AND (owner = ?3 OR visibility = 'shared')",
        )?;
        let mut rows = stmt.query_map(params![parent_id, name, principal], |row| row.get(0))?;
        rows.next().transpose()
    }

    fn has_children(&mut self, id: i64) -> Result<bool, Self::Err> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM record WHERE parent_id = ?1")?;
        stmt.exists(params![id])
    }

    fn rename(&mut self, id: i64, new_name: &str) -> Result<usize, Self::Err> {
        self.prepare_write()?;
        self.conn
            .prepare_cached("UPDATE record SET name = ?2, updated_at = ?3 WHERE id = ?1")?
            .execute(params![id, new_name, Utc::now()])
    }

    fn reparent(&mut self, id: i64, new_parent: Option<i64>) -> Result<usize, Self::Err> {
        self.prepare_write()?;
        self.conn
            .prepare_cached("UPDATE record SET parent_id = ?2, updated_at = ?3 WHERE id = ?1")?
            .execute(params![id, new_parent, Utc::now()])
    }

    fn delete_record(&mut self, id: i64) -> Result<usize, Self::Err> {
        self.prepare_write()?;
        self.conn
            .prepare_cached("DELETE FROM record WHERE id = ?1")?
            .execute(params![id])
    }

    fn pending_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, Self::Err> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id FROM record WHERE state = 'pending' AND updated_at < ?1",
        )?;
        let rows = stmt.query_map(params![cutoff], |row| row.get(0))?;
        rows.collect()
    }

    fn referenced_blob_keys(&mut self) -> Result<HashSet<String>, Self::Err> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT blob_key FROM record WHERE blob_key IS NOT NULL")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }

    fn insert_principal(&mut self, row: &PrincipalRow) -> Result<i64, Self::Err> {
        self.prepare_write()?;

        let tx = self.conn.transaction()?;
        tx.prepare_cached(
            "INSERT INTO principal (first_name, last_name, email, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(email) DO UPDATE
                 SET first_name = excluded.first_name,
                     last_name = excluded.last_name,
                     role = excluded.role",
        )?
        .execute(params![
            row.first_name,
            row.last_name,
            row.email,
            row.role.to_string(),
            Utc::now(),
        ])?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(id)
    }

    fn list_principals(&mut self) -> Result<Vec<PrincipalRow>, Self::Err> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT first_name, last_name, email, role FROM principal ORDER BY last_name, first_name",
        )?;
        let rows = stmt.query_map([], |row| {
            let role: String = row.get(3)?;
            Ok(PrincipalRow {
                first_name: row.get(0)?,
                last_name: row.get(1)?,
                email: row.get(2)?,
                role: Role::parse(&role).ok_or_else(|| conversion_failure("role", &role))?,
            })
        })?;
        rows.collect()
    }
}
