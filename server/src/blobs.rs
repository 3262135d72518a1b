use std::io::Write;
use std::path::Path;

use rusqlite::blob::ZeroBlob;
use rusqlite::{params, Connection, DatabaseName, Error, OpenFlags};

use crate::domain::BlobStore;
use crate::sqlite::Mode;

/// SQLite-backed flat blob store.
///
/// Lives in its own database file, independent of the metadata store; the
/// two are never joined in a single transaction.
pub struct SqliteBlobs {
    conn: Connection,
}

impl SqliteBlobs {
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self, Error> {
        let c = match mode {
            Mode::ReadWrite => Connection::open(path),
            Mode::ReadOnly => Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY),
        };
        Ok(Self { conn: c? })
    }

    fn pragma_update(&self, name: &str, value: &str) -> Result<(), Error> {
        self.conn.pragma_update(None, name, value)
    }
}

impl BlobStore for SqliteBlobs {
    type Err = Error;

    fn new_database(&self) -> Result<(), Self::Err> {
        self.pragma_update("encoding", "UTF-8")?;

        self.conn.execute(
            "CREATE TABLE blob (
                  key          TEXT PRIMARY KEY,
                  blake3_hash  TEXT NOT NULL,
                  data         BLOB NOT NULL
                  )",
            [],
        )?;

        Ok(())
    }

    fn put(&mut self, key: &str, data: Vec<u8>) -> Result<usize, Self::Err> {
        self.pragma_update("synchronous", "FULL")?;

        let hash = blake3::hash(&data);
        let hash = hash.to_string();

        let tx = self.conn.transaction()?;

        let len = i32::try_from(data.len()).unwrap_or(i32::MAX);
        tx.prepare_cached(
            "INSERT INTO blob (key, blake3_hash, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET blake3_hash = excluded.blake3_hash, data = excluded.data",
        )?
        .execute(params![key, &hash, &ZeroBlob(len)])?;

        // last_insert_rowid is wrong on the upsert path, so look the row up
        let rowid: i64 = tx.query_row("SELECT rowid FROM blob WHERE key = ?1", params![key], |row| {
            row.get(0)
        })?;

        let mut blob = tx.blob_open(DatabaseName::Main, "blob", "data", rowid, false)?;
        let bytes_written = data.len();
        if let Err(e) = blob.write_all(&data) {
            tracing::error!("{e}");
        }
        blob.flush().unwrap_or_default();
        blob.close()?;

        tx.commit()?;

        Ok(bytes_written)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Err> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT data FROM blob WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get(0))?;
        rows.next().transpose()
    }

    fn delete(&mut self, key: &str) -> Result<bool, Self::Err> {
        self.pragma_update("synchronous", "FULL")?;
        let deleted = self
            .conn
            .prepare_cached("DELETE FROM blob WHERE key = ?1")?
            .execute(params![key])?;
        Ok(deleted > 0)
    }

    fn keys(&mut self) -> Result<Vec<String>, Self::Err> {
        let mut stmt = self.conn.prepare_cached("SELECT key FROM blob")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }
}
