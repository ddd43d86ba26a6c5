//! Delivery ledger: durable set of message ids already delivered.
//!
//! Loaded fully into memory before any send may happen, then appended to
//! on every successful send. Two backends:
//! - JSON: a flat array file, rewritten atomically (temp file + rename)
//! - SQLite: one row per id, survives concurrent readers

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use courier_core::config::{LedgerBackendKind, LedgerConfig};
use courier_core::error::{CourierError, Result};
use courier_core::types::MessageId;

/// Storage behind the ledger.
pub trait LedgerBackend: Send {
    fn kind(&self) -> &'static str;

    /// Read every recorded id.
    fn load(&mut self) -> Result<HashSet<MessageId>>;

    /// Persist `id`. `all` is the full set including `id`, for backends that
    /// rewrite everything.
    fn append(&mut self, id: MessageId, all: &HashSet<MessageId>) -> Result<()>;
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

// ─── JSON file backend ──────────────────────────────────────

pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn write_all(&self, ids: &HashSet<MessageId>) -> Result<()> {
        ensure_parent(&self.path)?;
        let mut sorted: Vec<MessageId> = ids.iter().copied().collect();
        sorted.sort_unstable();
        let json = serde_json::to_string_pretty(&sorted)?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LedgerBackend for JsonFileBackend {
    fn kind(&self) -> &'static str {
        "json"
    }

    fn load(&mut self) -> Result<HashSet<MessageId>> {
        if !self.path.exists() {
            let empty = HashSet::new();
            self.write_all(&empty)
                .map_err(|e| CourierError::Ledger(format!("Failed to create ledger: {e}")))?;
            tracing::info!("✅ Ledger file created at {}", self.path.display());
            return Ok(empty);
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| CourierError::Ledger(format!("Failed to read ledger: {e}")))?;
        if content.trim().is_empty() {
            return Ok(HashSet::new());
        }
        let ids: Vec<MessageId> = serde_json::from_str(&content).map_err(|e| {
            CourierError::Ledger(format!(
                "Corrupt ledger {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(ids.into_iter().collect())
    }

    fn append(&mut self, _id: MessageId, all: &HashSet<MessageId>) -> Result<()> {
        self.write_all(all)
            .map_err(|e| CourierError::Ledger(format!("Failed to write ledger: {e}")))
    }
}

// ─── SQLite backend ─────────────────────────────────────────

pub struct SqliteBackend {
    conn: rusqlite::Connection,
}

impl SqliteBackend {
    /// Open or create the ledger database.
    pub fn open(path: &Path) -> Result<Self> {
        ensure_parent(path)?;
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| CourierError::Ledger(format!("DB open: {e}")))?;
        let backend = Self { conn };
        backend.migrate()?;
        Ok(backend)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS delivered_messages (
                id INTEGER PRIMARY KEY,
                delivered_at TEXT NOT NULL
            );
         ",
            )
            .map_err(|e| CourierError::Ledger(format!("Migration: {e}")))
    }
}

impl LedgerBackend for SqliteBackend {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn load(&mut self) -> Result<HashSet<MessageId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM delivered_messages")
            .map_err(|e| CourierError::Ledger(format!("Load: {e}")))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(|e| CourierError::Ledger(format!("Load: {e}")))?;

        let mut ids = HashSet::new();
        for row in rows {
            let id = row.map_err(|e| CourierError::Ledger(format!("Load row: {e}")))?;
            ids.insert(id as MessageId);
        }
        Ok(ids)
    }

    fn append(&mut self, id: MessageId, _all: &HashSet<MessageId>) -> Result<()> {
        let id = i64::try_from(id)
            .map_err(|_| CourierError::Ledger(format!("Message id {id} out of range")))?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO delivered_messages (id, delivered_at) VALUES (?1, ?2)",
                rusqlite::params![id, Utc::now().to_rfc3339()],
            )
            .map_err(|e| CourierError::Ledger(format!("Append: {e}")))?;
        Ok(())
    }
}

/// Volatile backend for tests and dry runs.
#[derive(Default)]
pub struct MemoryBackend;

impl LedgerBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn load(&mut self) -> Result<HashSet<MessageId>> {
        Ok(HashSet::new())
    }

    fn append(&mut self, _id: MessageId, _all: &HashSet<MessageId>) -> Result<()> {
        Ok(())
    }
}

// ─── Ledger ─────────────────────────────────────────────────

struct LedgerInner {
    delivered: HashSet<MessageId>,
    backend: Box<dyn LedgerBackend>,
}

/// In-memory delivered set backed by durable storage.
pub struct Ledger {
    inner: Mutex<LedgerInner>,
}

impl Ledger {
    /// Open the configured backend at `path` and load it.
    pub fn open(config: &LedgerConfig, path: &Path) -> Result<Self> {
        let backend: Box<dyn LedgerBackend> = match config.backend {
            LedgerBackendKind::Json => Box::new(JsonFileBackend::new(path)),
            LedgerBackendKind::Sqlite => Box::new(SqliteBackend::open(path)?),
        };
        Self::with_backend(backend)
    }

    pub fn with_backend(mut backend: Box<dyn LedgerBackend>) -> Result<Self> {
        let delivered = backend.load()?;
        tracing::info!(
            "✅ Ledger loaded: {} delivered message(s) ({})",
            delivered.len(),
            backend.kind()
        );
        Ok(Self {
            inner: Mutex::new(LedgerInner { delivered, backend }),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                delivered: HashSet::new(),
                backend: Box::new(MemoryBackend),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.lock().delivered.contains(&id)
    }

    /// Record a delivery. The id is remembered in memory even if persisting
    /// fails, so this process never resends it; only a restart could.
    /// Returns `Ok(false)` if it was already recorded.
    pub fn record(&self, id: MessageId) -> Result<bool> {
        let mut inner = self.lock();
        if !inner.delivered.insert(id) {
            return Ok(false);
        }
        let LedgerInner { delivered, backend } = &mut *inner;
        backend.append(id, delivered)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.lock().delivered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
