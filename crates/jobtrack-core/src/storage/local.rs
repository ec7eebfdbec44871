//! Durable local store
//!
//! Persists each entity collection and the mutation queue in SQLite so
//! offline work survives restarts.
//!
//! ## Tables
//!
//! - `companies`, `contacts`, `job_applications`, `interviews` - row JSON
//!   keyed by id, kept in insertion order
//! - `sync_queue` - pending mutations, read back in timestamp order
//!
//! Every operation takes the connection lock for its own duration only, so
//! single-row writes and single queue appends are atomic. No lock is held
//! across an await point.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::config::Config;
use crate::models::{row_id, EntityType, Row};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::queue::{MutationKind, NewQueueEntry, QueueEntry};
use crate::storage::schema::{init_schema, is_newer_than_supported, needs_init, SCHEMA_VERSION};

/// A point-in-time copy of every collection
///
/// The query engine reads one snapshot for the duration of a query.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub companies: Vec<Row>,
    pub contacts: Vec<Row>,
    pub job_applications: Vec<Row>,
    pub interviews: Vec<Row>,
}

impl Snapshot {
    /// Rows of one collection
    pub fn rows(&self, entity: EntityType) -> &[Row] {
        match entity {
            EntityType::Company => &self.companies,
            EntityType::Contact => &self.contacts,
            EntityType::JobApplication => &self.job_applications,
            EntityType::Interview => &self.interviews,
        }
    }

    /// Find a row by identifier
    pub fn find(&self, entity: EntityType, id: &str) -> Option<&Row> {
        self.rows(entity).iter().find(|row| row_id(row) == Some(id))
    }
}

/// SQLite-backed store for entity collections and the mutation queue
pub struct LocalStore {
    /// Database file; `None` for in-memory stores
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl LocalStore {
    /// Open or create the store under the configured data directory
    pub fn open(config: &Config) -> StorageResult<Self> {
        Self::open_path(config.sqlite_path())
    }

    /// Open or create the store at a specific database path
    pub fn open_path(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let conn = connect(Some(&path))?;
        Ok(Self {
            path: Some(path),
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing and the in-process backend)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = connect(None)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Database file backing this store
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    // ==================== Collections ====================

    /// Get every row of a collection, in insertion order
    pub fn get_all(&self, entity: EntityType) -> StorageResult<Vec<Row>> {
        let conn = self.lock()?;
        read_table(&conn, entity)
    }

    /// Get a row by identifier
    pub fn get(&self, entity: EntityType, id: &str) -> StorageResult<Option<Row>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                &format!("SELECT data FROM {} WHERE id = ?1", entity.table_name()),
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|data| decode_row(entity, id, &data)).transpose()
    }

    /// Insert or overwrite a single row
    pub fn put(&self, entity: EntityType, row: &Row) -> StorageResult<()> {
        let conn = self.lock()?;
        write_row(&conn, entity, row)
    }

    /// Insert or overwrite many rows in one transaction
    pub fn put_many(&self, entity: EntityType, rows: &[Row]) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for row in rows {
            write_row(&tx, entity, row)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a row by identifier; returns whether a row was removed
    pub fn delete(&self, entity: EntityType, id: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", entity.table_name()),
            params![id],
        )?;
        Ok(removed > 0)
    }

    /// Delete many rows in one transaction; returns how many were removed
    pub fn delete_many(&self, entity: EntityType, ids: &[&str]) -> StorageResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt =
                tx.prepare(&format!("DELETE FROM {} WHERE id = ?1", entity.table_name()))?;
            for id in ids {
                removed += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Number of rows in a collection
    pub fn count(&self, entity: EntityType) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", entity.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Read every collection under a single lock
    pub fn snapshot(&self) -> StorageResult<Snapshot> {
        let conn = self.lock()?;
        Ok(Snapshot {
            companies: read_table(&conn, EntityType::Company)?,
            contacts: read_table(&conn, EntityType::Contact)?,
            job_applications: read_table(&conn, EntityType::JobApplication)?,
            interviews: read_table(&conn, EntityType::Interview)?,
        })
    }

    // ==================== Mutation Queue ====================

    /// Append a mutation; returns its sequence number
    pub fn enqueue(&self, entry: &NewQueueEntry) -> StorageResult<i64> {
        let conn = self.lock()?;
        let payload = serde_json::to_string(&entry.payload)?;
        conn.execute(
            "INSERT INTO sync_queue (operation, table_name, payload, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.kind.as_str(),
                entry.entity.table_name(),
                payload,
                entry.timestamp
            ],
        )?;
        let seq = conn.last_insert_rowid();
        debug!(
            "Queued {} on {} as #{}",
            entry.kind, entry.entity, seq
        );
        Ok(seq)
    }

    /// Every queued mutation, oldest first
    ///
    /// Entries with equal timestamps keep their enqueue order.
    pub fn list_queue(&self) -> StorageResult<Vec<QueueEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, operation, table_name, payload, timestamp FROM sync_queue ORDER BY timestamp ASC, id ASC",
        )?;

        let raw = stmt.query_map([], |row| {
            Ok(RawQueueRow {
                seq: row.get(0)?,
                operation: row.get(1)?,
                table_name: row.get(2)?,
                payload: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in raw {
            entries.push(row?.decode()?);
        }
        Ok(entries)
    }

    /// Remove queue entries by sequence number, in one transaction
    pub fn delete_queue_entries(&self, seqs: &[i64]) -> StorageResult<usize> {
        if seqs.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM sync_queue WHERE id = ?1")?;
            for seq in seqs {
                removed += stmt.execute(params![seq])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Number of pending mutations
    pub fn queue_len(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ==================== Maintenance ====================

    /// Destroy and recreate the whole store
    ///
    /// Unsynced queue entries are lost. Callers waiting on the lock run
    /// against the fresh, empty database afterwards. On failure the current
    /// connection stays in place.
    pub fn reset(&self) -> StorageResult<()> {
        let mut conn = self.lock()?;

        let fresh = match &self.path {
            Some(path) => recreate(path)?,
            None => connect(None)?,
        };
        let old = std::mem::replace(&mut *conn, fresh);
        drop(old);

        info!("Local store has been reset");
        Ok(())
    }

    /// Destroy and recreate the store at `path` without opening it first
    ///
    /// Used when the existing database cannot be opened at all, e.g. after
    /// schema drift.
    pub fn reset_path(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let conn = recreate(&path)?;
        info!("Local store at {} has been reset", path.display());
        Ok(Self {
            path: Some(path),
            conn: Mutex::new(conn),
        })
    }
}

/// Remove the database files at `path` and create an empty store there
///
/// Journal siblings go first so a failure leaves the main file untouched.
fn recreate(path: &Path) -> StorageResult<Connection> {
    for file in database_files(path).into_iter().rev() {
        if file.exists() {
            std::fs::remove_file(&file).map_err(|e| StorageError::from_io(e, file.clone()))?;
        }
    }
    connect(Some(path))
}

/// Open a connection and bring its schema up to date
fn connect(path: Option<&Path>) -> StorageResult<Connection> {
    let conn = match path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
            }
            Connection::open(path)?
        }
        None => Connection::open_in_memory()?,
    };

    if is_newer_than_supported(&conn) {
        return Err(StorageError::SchemaDrift {
            details: format!(
                "database schema is newer than supported version {}",
                SCHEMA_VERSION
            ),
        });
    }

    if needs_init(&conn) {
        init_schema(&conn)?;
    }

    Ok(conn)
}

/// The database file plus SQLite's journal siblings
fn database_files(path: &Path) -> Vec<PathBuf> {
    let mut files = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}

fn read_table(conn: &Connection, entity: EntityType) -> StorageResult<Vec<Row>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, data FROM {} ORDER BY rowid",
        entity.table_name()
    ))?;

    let raw = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut rows = Vec::new();
    for item in raw {
        let (id, data) = item?;
        rows.push(decode_row(entity, &id, &data)?);
    }
    Ok(rows)
}

fn write_row(conn: &Connection, entity: EntityType, row: &Row) -> StorageResult<()> {
    let id = row_id(row).ok_or_else(|| StorageError::MissingId {
        table: entity.table_name().to_string(),
    })?;
    let data = serde_json::to_string(row)?;

    conn.execute(
        &format!(
            "INSERT INTO {} (id, data) VALUES (?1, ?2) ON CONFLICT(id) DO UPDATE SET data = excluded.data",
            entity.table_name()
        ),
        params![id, data],
    )?;
    Ok(())
}

fn decode_row(entity: EntityType, id: &str, data: &str) -> StorageResult<Row> {
    serde_json::from_str(data).map_err(|source| StorageError::CorruptRow {
        table: entity.table_name().to_string(),
        id: id.to_string(),
        source,
    })
}

/// Intermediate row struct for reading the queue from SQLite
struct RawQueueRow {
    seq: i64,
    operation: String,
    table_name: String,
    payload: String,
    timestamp: i64,
}

impl RawQueueRow {
    fn decode(self) -> StorageResult<QueueEntry> {
        let kind: MutationKind =
            self.operation
                .parse()
                .map_err(|details: String| StorageError::SchemaDrift {
                    details: format!("queue entry #{}: {}", self.seq, details),
                })?;
        let entity = EntityType::from_table_name(&self.table_name).ok_or_else(|| {
            StorageError::SchemaDrift {
                details: format!(
                    "queue entry #{} targets unknown collection '{}'",
                    self.seq, self.table_name
                ),
            }
        })?;
        let payload = serde_json::from_str(&self.payload).map_err(|source| {
            StorageError::CorruptRow {
                table: "sync_queue".to_string(),
                id: self.seq.to_string(),
                source,
            }
        })?;

        Ok(QueueEntry {
            seq: self.seq,
            kind,
            entity,
            payload,
            timestamp: self.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_put_and_get() {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .put(EntityType::Company, &row(json!({"id": "c1", "name": "Acme"})))
            .unwrap();

        let found = store.get(EntityType::Company, "c1").unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&json!("Acme")));
        assert!(store.get(EntityType::Company, "missing").unwrap().is_none());
        assert!(store.get(EntityType::Contact, "c1").unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites_and_keeps_order() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put(EntityType::Company, &row(json!({"id": "c1", "name": "One"}))).unwrap();
        store.put(EntityType::Company, &row(json!({"id": "c2", "name": "Two"}))).unwrap();
        store.put(EntityType::Company, &row(json!({"id": "c1", "name": "Uno"}))).unwrap();

        let all = store.get_all(EntityType::Company).unwrap();
        let names: Vec<&str> = all.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Uno", "Two"]);
        assert_eq!(store.count(EntityType::Company).unwrap(), 2);
    }

    #[test]
    fn test_put_without_id_fails() {
        let store = LocalStore::open_in_memory().unwrap();
        let err = store
            .put(EntityType::Contact, &row(json!({"name": "Nobody"})))
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingId { .. }));
    }

    #[test]
    fn test_delete() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put(EntityType::Interview, &row(json!({"id": "i1"}))).unwrap();

        assert!(store.delete(EntityType::Interview, "i1").unwrap());
        assert!(!store.delete(EntityType::Interview, "i1").unwrap());
        assert_eq!(store.count(EntityType::Interview).unwrap(), 0);
    }

    #[test]
    fn test_snapshot_reads_all_collections() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put(EntityType::Company, &row(json!({"id": "c1"}))).unwrap();
        store.put(EntityType::JobApplication, &row(json!({"id": "a1"}))).unwrap();
        store.put(EntityType::JobApplication, &row(json!({"id": "a2"}))).unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.rows(EntityType::Company).len(), 1);
        assert_eq!(snapshot.rows(EntityType::JobApplication).len(), 2);
        assert!(snapshot.rows(EntityType::Contact).is_empty());
        assert!(snapshot.find(EntityType::JobApplication, "a2").is_some());
    }

    #[test]
    fn test_queue_ordered_by_timestamp() {
        let store = LocalStore::open_in_memory().unwrap();
        let later = NewQueueEntry {
            kind: MutationKind::Update,
            entity: EntityType::Company,
            payload: row(json!({"id": "c1", "name": "B"})),
            timestamp: 2_000,
        };
        let earlier = NewQueueEntry {
            kind: MutationKind::Create,
            entity: EntityType::Company,
            payload: row(json!({"id": "c1", "name": "A"})),
            timestamp: 1_000,
        };
        let later_seq = store.enqueue(&later).unwrap();
        let earlier_seq = store.enqueue(&earlier).unwrap();
        assert_ne!(later_seq, earlier_seq);

        let queue = store.list_queue().unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].kind, MutationKind::Create);
        assert_eq!(queue[0].seq, earlier_seq);
        assert_eq!(queue[1].kind, MutationKind::Update);
    }

    #[test]
    fn test_queue_ties_keep_enqueue_order() {
        let store = LocalStore::open_in_memory().unwrap();
        for name in ["first", "second", "third"] {
            store
                .enqueue(&NewQueueEntry {
                    kind: MutationKind::Update,
                    entity: EntityType::Contact,
                    payload: row(json!({"id": "d1", "name": name})),
                    timestamp: 500,
                })
                .unwrap();
        }

        let names: Vec<String> = store
            .list_queue()
            .unwrap()
            .iter()
            .map(|e| e.payload["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_delete_queue_entries() {
        let store = LocalStore::open_in_memory().unwrap();
        let a = store.enqueue(&NewQueueEntry::delete(EntityType::Company, "c1")).unwrap();
        let b = store.enqueue(&NewQueueEntry::delete(EntityType::Company, "c2")).unwrap();
        let c = store.enqueue(&NewQueueEntry::delete(EntityType::Company, "c3")).unwrap();

        assert_eq!(store.delete_queue_entries(&[a, c]).unwrap(), 2);
        let remaining = store.list_queue().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].seq, b);
        assert_eq!(store.queue_len().unwrap(), 1);
        assert_eq!(store.delete_queue_entries(&[]).unwrap(), 0);
    }

    #[test]
    fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.db");

        {
            let store = LocalStore::open_path(&path).unwrap();
            store.put(EntityType::Company, &row(json!({"id": "c1"}))).unwrap();
            store.enqueue(&NewQueueEntry::delete(EntityType::Contact, "d1")).unwrap();
        }

        let store = LocalStore::open_path(&path).unwrap();
        assert_eq!(store.count(EntityType::Company).unwrap(), 1);
        assert_eq!(store.queue_len().unwrap(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open_path(temp_dir.path().join("store.db")).unwrap();
        store.put(EntityType::Company, &row(json!({"id": "c1"}))).unwrap();
        store.enqueue(&NewQueueEntry::delete(EntityType::Company, "c1")).unwrap();

        store.reset().unwrap();

        assert_eq!(store.count(EntityType::Company).unwrap(), 0);
        assert_eq!(store.queue_len().unwrap(), 0);
        store.put(EntityType::Company, &row(json!({"id": "c2"}))).unwrap();
        assert_eq!(store.count(EntityType::Company).unwrap(), 1);
    }

    #[test]
    fn test_corrupt_row_reported() {
        let store = LocalStore::open_in_memory().unwrap();
        {
            let conn = store.lock().unwrap();
            conn.execute(
                "INSERT INTO companies (id, data) VALUES ('c1', 'not json')",
                [],
            )
            .unwrap();
        }

        let err = store.get_all(EntityType::Company).unwrap_err();
        assert!(err.requires_reset());
    }

    #[test]
    fn test_newer_schema_is_drift() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.db");
        {
            let store = LocalStore::open_path(&path).unwrap();
            let conn = store.lock().unwrap();
            conn.execute(
                "UPDATE schema_info SET value = '99' WHERE key = 'version'",
                [],
            )
            .unwrap();
        }

        let err = LocalStore::open_path(&path).err().unwrap();
        assert!(matches!(err, StorageError::SchemaDrift { .. }));
    }

    #[test]
    fn test_reset_path_recovers_from_schema_drift() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.db");
        {
            let store = LocalStore::open_path(&path).unwrap();
            store.put(EntityType::Company, &row(json!({"id": "c1"}))).unwrap();
            let conn = store.lock().unwrap();
            conn.execute(
                "UPDATE schema_info SET value = '2' WHERE key = 'version'",
                [],
            )
            .unwrap();
        }
        assert!(LocalStore::open_path(&path).err().unwrap().requires_reset());

        let store = LocalStore::reset_path(&path).unwrap();
        assert_eq!(store.count(EntityType::Company).unwrap(), 0);
        drop(store);

        let reopened = LocalStore::open_path(&path).unwrap();
        reopened.put(EntityType::Company, &row(json!({"id": "c2"}))).unwrap();
        assert_eq!(reopened.count(EntityType::Company).unwrap(), 1);
    }

    #[test]
    fn test_failed_reset_keeps_store_usable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.db");
        let store = LocalStore::open_path(&path).unwrap();
        store.put(EntityType::Company, &row(json!({"id": "c1"}))).unwrap();

        // A directory where the journal file would be cannot be removed
        let journal = temp_dir.path().join("store.db-journal");
        std::fs::create_dir(&journal).unwrap();
        assert!(store.reset().is_err());
        std::fs::remove_dir(&journal).unwrap();

        assert!(store.get(EntityType::Company, "c1").unwrap().is_some());
        store.put(EntityType::Company, &row(json!({"id": "c2"}))).unwrap();
        assert_eq!(store.count(EntityType::Company).unwrap(), 2);

        store.reset().unwrap();
        assert_eq!(store.count(EntityType::Company).unwrap(), 0);
    }
}
