// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rusqlite`-backed sidecar index store.
//!
//! Chosen over the async `sqlx` driver used elsewhere because every other
//! core interface in this crate (inflater, indexer, reader) is synchronous;
//! `rusqlite::Connection`/`Transaction` map directly onto `begin`/`commit`/
//! `rollback`. `WAL` journaling is enabled so a concurrent reader doesn't
//! block on an in-progress writer, though concurrent *builders* against the
//! same index are not supported (see the crate's concurrency model).

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::{Checkpoint, FileMetadataRecord, FileRecord};
use crate::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    logical_name TEXT NOT NULL UNIQUE,
    byte_size INTEGER NOT NULL,
    mtime INTEGER NOT NULL,
    sha256 TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS metadata (
    file_id INTEGER NOT NULL REFERENCES files(id),
    checkpoint_size INTEGER NOT NULL,
    total_lines INTEGER NOT NULL,
    total_uc_size INTEGER NOT NULL,
    PRIMARY KEY (file_id)
);
CREATE TABLE IF NOT EXISTS checkpoints (
    file_id INTEGER NOT NULL REFERENCES files(id),
    checkpoint_idx INTEGER NOT NULL,
    uc_offset INTEGER NOT NULL,
    uc_size INTEGER NOT NULL,
    c_offset INTEGER NOT NULL,
    c_size INTEGER NOT NULL,
    bits INTEGER NOT NULL,
    dict_compressed BLOB NOT NULL,
    num_lines INTEGER NOT NULL,
    last_line_num INTEGER NOT NULL,
    PRIMARY KEY (file_id, checkpoint_idx)
);
CREATE INDEX IF NOT EXISTS checkpoints_uc_offset ON checkpoints(file_id, uc_offset);
";

/// Handle to the sidecar index database for one gzip file (or a set of
/// files, keyed by `logical_name`).
pub struct CheckpointStore {
    conn: Connection,
}

impl CheckpointStore {
    /// Opens or creates the store at `path`, initializing the schema on
    /// first creation.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// True iff all three expected tables exist.
    pub fn is_schema_valid(&self) -> Result<bool, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('files','metadata','checkpoints')",
        )?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count == 3)
    }

    /// True iff a stored record for `logical_name` matches the file's
    /// current `(sha256, mtime, byte_size)`.
    pub fn file_matches(
        &self,
        logical_name: &str,
        byte_size: u64,
        mtime: i64,
        sha256: &str,
    ) -> Result<bool, StoreError> {
        let existing = self.get_file(logical_name)?;
        Ok(matches!(existing, Some(f) if f.byte_size == byte_size && f.mtime == mtime && f.sha256 == sha256))
    }

    pub fn get_file(&self, logical_name: &str) -> Result<Option<FileRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, logical_name, byte_size, mtime, sha256 FROM files WHERE logical_name = ?1",
                params![logical_name],
                |row| {
                    Ok(FileRecord {
                        id: row.get(0)?,
                        logical_name: row.get(1)?,
                        byte_size: row.get::<_, i64>(2)? as u64,
                        mtime: row.get(3)?,
                        sha256: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn get_metadata(&self, file_id: i64) -> Result<Option<FileMetadataRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT file_id, checkpoint_size, total_lines, total_uc_size FROM metadata WHERE file_id = ?1",
                params![file_id],
                |row| {
                    Ok(FileMetadataRecord {
                        file_id: row.get(0)?,
                        checkpoint_size: row.get::<_, i64>(1)? as u64,
                        total_lines: row.get::<_, i64>(2)? as u64,
                        total_uc_size: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
    }

    /// The file's total uncompressed size: from `metadata` if present,
    /// otherwise derived as the max of `uc_offset + uc_size` across
    /// checkpoints.
    pub fn query_max_uc_bytes(&self, file_id: i64) -> Result<u64, StoreError> {
        if let Some(meta) = self.get_metadata(file_id)? {
            return Ok(meta.total_uc_size);
        }
        let max: Option<i64> = self.conn.query_row(
            "SELECT max(uc_offset + uc_size) FROM checkpoints WHERE file_id = ?1",
            params![file_id],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0) as u64)
    }

    /// The maximum `uc_offset` not exceeding `target_uc_offset`.
    pub fn find_checkpoint(
        &self,
        file_id: i64,
        target_uc_offset: u64,
    ) -> Result<Option<Checkpoint>, StoreError> {
        self.conn
            .query_row(
                "SELECT file_id, checkpoint_idx, uc_offset, uc_size, c_offset, c_size, bits, \
                 dict_compressed, num_lines, last_line_num FROM checkpoints \
                 WHERE file_id = ?1 AND uc_offset <= ?2 ORDER BY uc_offset DESC LIMIT 1",
                params![file_id, target_uc_offset as i64],
                Self::row_to_checkpoint,
            )
            .optional()
            .map_err(StoreError::from)
    }

    /// All checkpoints whose `[uc_offset, uc_offset+uc_size)` line range
    /// could contain a line in `[start_line, end_line]` (1-based, using
    /// `last_line_num` as the inclusive upper bound of each checkpoint).
    pub fn get_checkpoints_by_line_range(
        &self,
        file_id: i64,
        start_line: u64,
        end_line: u64,
    ) -> Result<Vec<Checkpoint>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT file_id, checkpoint_idx, uc_offset, uc_size, c_offset, c_size, bits, \
             dict_compressed, num_lines, last_line_num FROM checkpoints \
             WHERE file_id = ?1 AND last_line_num >= ?2 \
             AND (last_line_num - num_lines) < ?3 \
             ORDER BY checkpoint_idx ASC",
        )?;
        let rows = stmt
            .query_map(
                params![file_id, start_line as i64, end_line as i64 + 1],
                Self::row_to_checkpoint,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn row_to_checkpoint(row: &rusqlite::Row) -> rusqlite::Result<Checkpoint> {
        Ok(Checkpoint {
            file_id: row.get(0)?,
            checkpoint_idx: row.get::<_, i64>(1)? as u64,
            uc_offset: row.get::<_, i64>(2)? as u64,
            uc_size: row.get::<_, i64>(3)? as u64,
            c_offset: row.get::<_, i64>(4)? as u64,
            c_size: row.get::<_, i64>(5)? as u64,
            bits: row.get::<_, i64>(6)? as u8,
            dict_compressed: row.get(7)?,
            num_lines: row.get::<_, i64>(8)? as u64,
            last_line_num: row.get::<_, i64>(9)? as u64,
        })
    }

    /// Deletes all `checkpoints` and `metadata` rows for `file_id`, ahead of
    /// a rebuild. The `files` row itself is left for the caller to
    /// overwrite via [`insert_file`](Self::insert_file).
    pub fn cleanup(&self, file_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM checkpoints WHERE file_id = ?1", params![file_id])?;
        self.conn
            .execute("DELETE FROM metadata WHERE file_id = ?1", params![file_id])?;
        Ok(())
    }

    pub fn begin(&mut self) -> Result<Transaction<'_>, StoreError> {
        self.conn.transaction().map_err(StoreError::from)
    }

    /// Inserts or replaces the `files` row for `logical_name`, returning its
    /// `id`.
    pub fn insert_file(
        tx: &Transaction,
        logical_name: &str,
        byte_size: u64,
        mtime: i64,
        sha256: &str,
    ) -> Result<i64, StoreError> {
        tx.execute(
            "INSERT INTO files (logical_name, byte_size, mtime, sha256) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(logical_name) DO UPDATE SET byte_size=excluded.byte_size, \
             mtime=excluded.mtime, sha256=excluded.sha256",
            params![logical_name, byte_size as i64, mtime, sha256],
        )?;
        let id = tx.query_row(
            "SELECT id FROM files WHERE logical_name = ?1",
            params![logical_name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn insert_metadata(
        tx: &Transaction,
        record: FileMetadataRecord,
    ) -> Result<(), StoreError> {
        tx.execute(
            "INSERT INTO metadata (file_id, checkpoint_size, total_lines, total_uc_size) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.file_id,
                record.checkpoint_size as i64,
                record.total_lines as i64,
                record.total_uc_size as i64
            ],
        )?;
        Ok(())
    }

    pub fn insert_checkpoint(tx: &Transaction, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        tx.execute(
            "INSERT INTO checkpoints (file_id, checkpoint_idx, uc_offset, uc_size, c_offset, \
             c_size, bits, dict_compressed, num_lines, last_line_num) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                checkpoint.file_id,
                checkpoint.checkpoint_idx as i64,
                checkpoint.uc_offset as i64,
                checkpoint.uc_size as i64,
                checkpoint.c_offset as i64,
                checkpoint.c_size as i64,
                checkpoint.bits as i64,
                checkpoint.dict_compressed,
                checkpoint.num_lines as i64,
                checkpoint.last_line_num as i64,
            ],
        )?;
        Ok(())
    }
}

/// Compresses a raw 32 KiB dictionary window for storage.
pub fn compress_window(window: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(window)
        .map_err(|e| StoreError::Other(e.to_string()))?;
    encoder.finish().map_err(|e| StoreError::Other(e.to_string()))
}

/// Decompresses a dictionary window previously saved by
/// [`compress_window`].
pub fn decompress_window(compressed: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = DeflateDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| StoreError::Other(e.to_string()))?;
    Ok(out)
}
