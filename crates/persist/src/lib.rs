//! Tenancy directory: which principal owns which namespace, plus the audit
//! trail of submitted manifests. SQLite-backed, synchronous inside; the
//! trait is async so callers compose it with cluster calls.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use berth_core::{BerthError, BerthResult, Principal, Role};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ownership row linking a namespace to its principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: i64,
    pub principal_id: i64,
    pub namespace: String,
    pub project: Option<String>,
}

/// Audit row for one submitted manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub created_ts: i64,
}

/// Registry of principals, namespace ownership and manifest audit rows.
///
/// Reads are tolerant (absent rows come back as `None` or empty), writes
/// that need a namespace row fail `NotFound` when it is missing.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn namespace_owner(&self, namespace: &str) -> BerthResult<Option<TenantRecord>>;

    async fn principal(&self, id: i64) -> BerthResult<Option<Principal>>;

    /// Bookkeeping rows for a namespace: the namespace itself plus its
    /// ownership assignment to `principal_id`. The cluster-side create
    /// happens elsewhere; [`Directory::assign_namespace`] moves ownership
    /// afterwards.
    async fn register_namespace(
        &self,
        principal_id: i64,
        namespace: &str,
        project: Option<&str>,
    ) -> BerthResult<i64>;

    async fn remove_namespace(&self, namespace: &str) -> BerthResult<()>;

    async fn upsert_principal(&self, name: &str, role: Role) -> BerthResult<Principal>;

    /// Grants (or moves) ownership of an existing namespace.
    async fn assign_namespace(&self, namespace: &str, principal_id: i64) -> BerthResult<()>;

    /// Stores one manifest under its namespace. The namespace row must
    /// already exist.
    async fn record_manifest(&self, namespace: &str, name: &str, content: &str)
        -> BerthResult<i64>;

    /// Audit rows for a namespace, newest first.
    async fn manifests(&self, namespace: &str) -> BerthResult<Vec<ManifestRecord>>;
}

fn db_err(e: rusqlite::Error) -> BerthError {
    BerthError::Store(e.to_string())
}

fn missing_namespace(namespace: &str) -> BerthError {
    BerthError::NotFound(format!("namespace {namespace} is not registered"))
}

// ----------------- SQLite directory -----------------

/// SQLite-backed directory. Simple, synchronous behind a mutex; none of the
/// queries here are latency sensitive.
pub struct SqliteDirectory {
    db: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteDirectory {
    pub fn open_default() -> BerthResult<Self> {
        let path = std::env::var("BERTH_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> BerthResult<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path)
            .map_err(|e| BerthError::Store(format!("opening sqlite db at {path}: {e}")))?;
        db.pragma_update(None, "journal_mode", &"WAL").ok();
        db.pragma_update(None, "synchronous", &"NORMAL").ok();
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS principals (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS namespaces (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                name    TEXT NOT NULL UNIQUE,
                project TEXT
            );
            CREATE TABLE IF NOT EXISTS assignments (
                namespace_id INTEGER PRIMARY KEY REFERENCES namespaces(id),
                principal_id INTEGER NOT NULL REFERENCES principals(id)
            );
            CREATE TABLE IF NOT EXISTS manifests (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace_id INTEGER NOT NULL REFERENCES namespaces(id),
                name         TEXT NOT NULL,
                content      TEXT NOT NULL,
                created_ts   INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_manifests_ns_ts
                ON manifests(namespace_id, created_ts DESC);",
        )
        .map_err(db_err)?;
        let me = Self { db: std::sync::Mutex::new(db) };
        histogram!("directory_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        debug!(path = %path, "directory: open");
        Ok(me)
    }

    fn namespace_id(db: &rusqlite::Connection, namespace: &str) -> BerthResult<Option<i64>> {
        db.query_row(
            "SELECT id FROM namespaces WHERE name = ?1",
            [namespace],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(db_err(other)),
        })
    }
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn namespace_owner(&self, namespace: &str) -> BerthResult<Option<TenantRecord>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT n.id, a.principal_id, n.name, n.project
             FROM namespaces n JOIN assignments a ON a.namespace_id = n.id
             WHERE n.name = ?1",
            [namespace],
            |row| {
                Ok(TenantRecord {
                    id: row.get(0)?,
                    principal_id: row.get(1)?,
                    namespace: row.get(2)?,
                    project: row.get(3)?,
                })
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(db_err(other)),
        })
    }

    async fn principal(&self, id: i64) -> BerthResult<Option<Principal>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT name, role FROM principals WHERE id = ?1",
                [id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_err(other)),
            })?;
        match row {
            None => Ok(None),
            Some((name, role)) => {
                let role = Role::parse(&role)
                    .ok_or_else(|| BerthError::Store(format!("principal {id}: bad role {role}")))?;
                Ok(Some(Principal { id, name, role }))
            }
        }
    }

    async fn register_namespace(
        &self,
        principal_id: i64,
        namespace: &str,
        project: Option<&str>,
    ) -> BerthResult<i64> {
        let started = std::time::Instant::now();
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO namespaces(name, project) VALUES (?1, ?2)",
            (namespace, project),
        )
        .map_err(db_err)?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO assignments(namespace_id, principal_id) VALUES (?1, ?2)",
            (id, principal_id),
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        histogram!("directory_register_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(id)
    }

    async fn remove_namespace(&self, namespace: &str) -> BerthResult<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM manifests WHERE namespace_id IN
                 (SELECT id FROM namespaces WHERE name = ?1)",
            [namespace],
        )
        .map_err(db_err)?;
        tx.execute(
            "DELETE FROM assignments WHERE namespace_id IN
                 (SELECT id FROM namespaces WHERE name = ?1)",
            [namespace],
        )
        .map_err(db_err)?;
        tx.execute("DELETE FROM namespaces WHERE name = ?1", [namespace])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        debug!(namespace = %namespace, "directory: namespace rows removed");
        Ok(())
    }

    async fn upsert_principal(&self, name: &str, role: Role) -> BerthResult<Principal> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO principals(name, role) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET role = excluded.role",
            (name, role.as_str()),
        )
        .map_err(db_err)?;
        let id: i64 = db
            .query_row("SELECT id FROM principals WHERE name = ?1", [name], |row| row.get(0))
            .map_err(db_err)?;
        Ok(Principal { id, name: name.to_string(), role })
    }

    async fn assign_namespace(&self, namespace: &str, principal_id: i64) -> BerthResult<()> {
        let db = self.db.lock().unwrap();
        let id = Self::namespace_id(&db, namespace)?.ok_or_else(|| missing_namespace(namespace))?;
        db.execute(
            "INSERT OR REPLACE INTO assignments(namespace_id, principal_id) VALUES (?1, ?2)",
            (id, principal_id),
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn record_manifest(
        &self,
        namespace: &str,
        name: &str,
        content: &str,
    ) -> BerthResult<i64> {
        let started = std::time::Instant::now();
        let db = self.db.lock().unwrap();
        let id = Self::namespace_id(&db, namespace)?.ok_or_else(|| missing_namespace(namespace))?;
        db.execute(
            "INSERT INTO manifests(namespace_id, name, content, created_ts)
             VALUES (?1, ?2, ?3, ?4)",
            (id, name, content, now_ts()),
        )
        .map_err(db_err)?;
        histogram!("directory_manifest_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("directory_manifest_total", 1u64);
        Ok(db.last_insert_rowid())
    }

    async fn manifests(&self, namespace: &str) -> BerthResult<Vec<ManifestRecord>> {
        let db = self.db.lock().unwrap();
        let Some(id) = Self::namespace_id(&db, namespace)? else {
            return Ok(Vec::new());
        };
        let mut stmt = db
            .prepare(
                "SELECT id, name, content, created_ts FROM manifests
                 WHERE namespace_id = ?1 ORDER BY created_ts DESC, id DESC",
            )
            .map_err(db_err)?;
        let mut rows = stmt.query([id]).map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_err)? {
            out.push(ManifestRecord {
                id: row.get(0).map_err(db_err)?,
                name: row.get(1).map_err(db_err)?,
                content: row.get(2).map_err(db_err)?,
                created_ts: row.get(3).map_err(db_err)?,
            });
        }
        Ok(out)
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".berth");
        let _ = std::fs::create_dir_all(&p);
        p.push("berth.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "berth.db".to_string()
}

pub fn now_ts() -> i64 {
    // seconds since epoch
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs() as i64
}

// ----------------- In-memory directory -----------------

/// In-memory fake with the same row semantics, for tests above this crate.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: std::sync::Mutex<MemoryInner>,
}

struct NamespaceRow {
    id: i64,
    name: String,
    project: Option<String>,
}

#[derive(Default)]
struct MemoryInner {
    principals: Vec<Principal>,
    namespaces: Vec<NamespaceRow>,
    assignments: std::collections::HashMap<i64, i64>,
    manifests: Vec<(String, ManifestRecord)>,
    next_id: i64,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryInner {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn namespace_row(&self, name: &str) -> Option<&NamespaceRow> {
        self.namespaces.iter().find(|n| n.name == name)
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn namespace_owner(&self, namespace: &str) -> BerthResult<Option<TenantRecord>> {
        let inner = self.inner.lock().unwrap();
        let Some(row) = inner.namespace_row(namespace) else {
            return Ok(None);
        };
        Ok(inner.assignments.get(&row.id).map(|principal_id| TenantRecord {
            id: row.id,
            principal_id: *principal_id,
            namespace: row.name.clone(),
            project: row.project.clone(),
        }))
    }

    async fn principal(&self, id: i64) -> BerthResult<Option<Principal>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.principals.iter().find(|p| p.id == id).cloned())
    }

    async fn register_namespace(
        &self,
        principal_id: i64,
        namespace: &str,
        project: Option<&str>,
    ) -> BerthResult<i64> {
        let mut inner = self.inner.lock().unwrap();
        if inner.namespace_row(namespace).is_some() {
            return Err(BerthError::Store(format!("namespace {namespace} already registered")));
        }
        let id = inner.next();
        inner.namespaces.push(NamespaceRow {
            id,
            name: namespace.to_string(),
            project: project.map(str::to_string),
        });
        inner.assignments.insert(id, principal_id);
        Ok(id)
    }

    async fn remove_namespace(&self, namespace: &str) -> BerthResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(id) = inner.namespace_row(namespace).map(|n| n.id) {
            inner.assignments.remove(&id);
        }
        inner.namespaces.retain(|n| n.name != namespace);
        inner.manifests.retain(|(ns, _)| ns != namespace);
        Ok(())
    }

    async fn upsert_principal(&self, name: &str, role: Role) -> BerthResult<Principal> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(p) = inner.principals.iter_mut().find(|p| p.name == name) {
            p.role = role;
            return Ok(p.clone());
        }
        let id = inner.next();
        let p = Principal { id, name: name.to_string(), role };
        inner.principals.push(p.clone());
        Ok(p)
    }

    async fn assign_namespace(&self, namespace: &str, principal_id: i64) -> BerthResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner
            .namespace_row(namespace)
            .map(|n| n.id)
            .ok_or_else(|| missing_namespace(namespace))?;
        inner.assignments.insert(id, principal_id);
        Ok(())
    }

    async fn record_manifest(
        &self,
        namespace: &str,
        name: &str,
        content: &str,
    ) -> BerthResult<i64> {
        let mut inner = self.inner.lock().unwrap();
        if inner.namespace_row(namespace).is_none() {
            return Err(missing_namespace(namespace));
        }
        let id = inner.next();
        inner.manifests.push((
            namespace.to_string(),
            ManifestRecord {
                id,
                name: name.to_string(),
                content: content.to_string(),
                created_ts: now_ts(),
            },
        ));
        Ok(id)
    }

    async fn manifests(&self, namespace: &str) -> BerthResult<Vec<ManifestRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<ManifestRecord> = inner
            .manifests
            .iter()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, m)| m.clone())
            .collect();
        out.reverse();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> String {
        let dir = std::env::temp_dir();
        let f = format!(
            "berth-test-{}.db",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );
        dir.join(f).to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn ownership_round_trips_through_sqlite() {
        let d = SqliteDirectory::open(&temp_db()).unwrap();
        let alice = d.upsert_principal("alice", Role::Member).await.unwrap();
        let ns_id = d.register_namespace(alice.id, "demo", Some("web")).await.unwrap();
        let owner = d.namespace_owner("demo").await.unwrap().unwrap();
        assert_eq!(owner.id, ns_id);
        assert_eq!(owner.principal_id, alice.id);
        assert_eq!(owner.project.as_deref(), Some("web"));
        assert!(d.namespace_owner("other").await.unwrap().is_none());
        let got = d.principal(alice.id).await.unwrap().unwrap();
        assert_eq!(got.name, "alice");
        assert_eq!(got.role, Role::Member);
    }

    #[tokio::test]
    async fn upsert_keeps_the_id_and_updates_the_role() {
        let d = SqliteDirectory::open(&temp_db()).unwrap();
        let first = d.upsert_principal("alice", Role::Member).await.unwrap();
        let second = d.upsert_principal("alice", Role::Admin).await.unwrap();
        assert_eq!(first.id, second.id);
        let got = d.principal(first.id).await.unwrap().unwrap();
        assert_eq!(got.role, Role::Admin);
    }

    #[tokio::test]
    async fn assignment_moves_ownership() {
        let d = SqliteDirectory::open(&temp_db()).unwrap();
        let alice = d.upsert_principal("alice", Role::Member).await.unwrap();
        let bob = d.upsert_principal("bob", Role::Member).await.unwrap();
        d.register_namespace(alice.id, "demo", None).await.unwrap();
        d.assign_namespace("demo", bob.id).await.unwrap();
        let owner = d.namespace_owner("demo").await.unwrap().unwrap();
        assert_eq!(owner.principal_id, bob.id);

        let err = d.assign_namespace("ghost", bob.id).await.unwrap_err();
        assert!(matches!(err, BerthError::NotFound(_)));
    }

    #[tokio::test]
    async fn manifest_rows_require_a_registered_namespace() {
        let d = SqliteDirectory::open(&temp_db()).unwrap();
        let err = d.record_manifest("demo", "web-dpl.yaml", "{}").await.unwrap_err();
        assert!(matches!(err, BerthError::NotFound(_)));

        let alice = d.upsert_principal("alice", Role::Member).await.unwrap();
        d.register_namespace(alice.id, "demo", None).await.unwrap();
        d.record_manifest("demo", "web-dpl.yaml", "{\"kind\":\"Deployment\"}")
            .await
            .unwrap();
        let rows = d.manifests("demo").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "web-dpl.yaml");
        assert!(rows[0].content.contains("Deployment"));
    }

    #[tokio::test]
    async fn remove_namespace_clears_dependent_rows() {
        let d = SqliteDirectory::open(&temp_db()).unwrap();
        let alice = d.upsert_principal("alice", Role::Member).await.unwrap();
        d.register_namespace(alice.id, "demo", None).await.unwrap();
        d.record_manifest("demo", "web-dpl.yaml", "{}").await.unwrap();
        d.remove_namespace("demo").await.unwrap();
        assert!(d.namespace_owner("demo").await.unwrap().is_none());
        assert!(d.manifests("demo").await.unwrap().is_empty());
        // Removing again is a no-op.
        d.remove_namespace("demo").await.unwrap();
    }

    #[tokio::test]
    async fn memory_directory_mirrors_the_row_semantics() {
        let d = MemoryDirectory::new();
        let err = d.record_manifest("demo", "web-dpl.yaml", "{}").await.unwrap_err();
        assert!(matches!(err, BerthError::NotFound(_)));

        let alice = d.upsert_principal("alice", Role::Member).await.unwrap();
        d.register_namespace(alice.id, "demo", None).await.unwrap();
        d.record_manifest("demo", "web-dpl.yaml", "{}").await.unwrap();
        assert_eq!(d.manifests("demo").await.unwrap().len(), 1);
        let owner = d.namespace_owner("demo").await.unwrap().unwrap();
        assert_eq!(owner.principal_id, alice.id);
        d.remove_namespace("demo").await.unwrap();
        assert!(d.namespace_owner("demo").await.unwrap().is_none());
    }
}
