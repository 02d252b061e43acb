//! Local key store for the two long-lived pairs.
//!
//! `KeyVault` owns the encrypted SQLite connection behind a mutex: callers
//! get `get`/`save`/`clear`/`exists` plus `ensure_initialized` and never
//! touch the raw store. The mutex doubles as the initialization guard, so
//! concurrent "initialize if absent" callers converge on one generated set
//! instead of racing to overwrite each other.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::{ExchangeKeyPair, IdentityKeyPair, LocalKeySet};
use crate::protection::MasterKey;

const MIGRATIONS: &[(i32, &str)] = &[(1, MIGRATION_001)];

const MIGRATION_001: &str = "
CREATE TABLE IF NOT EXISTS vault_keys (
    role        TEXT PRIMARY KEY CHECK (role IN ('identity', 'exchange')),
    private_key BLOB NOT NULL,
    created_at  INTEGER NOT NULL
);
";

/// Encrypted store holding the local identity and exchange private keys.
pub struct KeyVault {
    conn: Mutex<Connection>,
}

impl KeyVault {
    /// Open (or create) the vault at `path`, keyed by `master`.
    pub fn open(path: &Path, master: &MasterKey) -> Result<Self, CryptoError> {
        Self::setup(Connection::open(path)?, master)
    }

    /// In-memory vault under a throwaway master key, for tests and ephemeral
    /// profiles.
    pub fn open_in_memory() -> Result<Self, CryptoError> {
        Self::setup(Connection::open_in_memory()?, &MasterKey::ephemeral())
    }

    fn setup(conn: Connection, master: &MasterKey) -> Result<Self, CryptoError> {
        let pragma = master.vault_pragma()?;
        // SQLCipher's x'...' key syntax is a SQL literal; binding it as a
        // parameter would make SQLCipher treat it as a passphrase instead.
        conn.execute_batch(&format!("PRAGMA key = \"{}\";", pragma.as_str()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_vault_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Load both pairs, generating and storing them atomically if absent.
    ///
    /// A partial row set (one pair without the other) is treated as absent
    /// and replaced wholesale.
    pub fn ensure_initialized(&self) -> Result<LocalKeySet, CryptoError> {
        let conn = self.lock()?;
        if let Some(keys) = load_keys(&conn)? {
            return Ok(keys);
        }
        let keys = LocalKeySet::generate();
        store_keys(&conn, &keys)?;
        Ok(keys)
    }

    /// Both pairs, or `None` when the vault is empty or partial.
    pub fn get(&self) -> Result<Option<LocalKeySet>, CryptoError> {
        let conn = self.lock()?;
        load_keys(&conn)
    }

    /// Replace both pairs in one transaction: both are stored or neither is.
    pub fn save(&self, keys: &LocalKeySet) -> Result<(), CryptoError> {
        let conn = self.lock()?;
        store_keys(&conn, keys)
    }

    /// Remove both pairs. Explicit reset only; nothing calls this internally.
    pub fn clear(&self) -> Result<(), CryptoError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM vault_keys", [])?;
        Ok(())
    }

    /// Whether a complete key set is present.
    pub fn exists(&self) -> Result<bool, CryptoError> {
        Ok(self.get()?.is_some())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CryptoError> {
        self.conn
            .lock()
            .map_err(|_| CryptoError::Storage("vault lock poisoned".into()))
    }
}

fn run_vault_migrations(conn: &Connection) -> Result<(), CryptoError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _vault_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )?;

    let current: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _vault_migrations",
        [],
        |row| row.get(0),
    )?;

    for &(version, sql) in MIGRATIONS {
        if version > current {
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql)?;
            tx.execute("INSERT INTO _vault_migrations (version) VALUES (?1)", [
                version,
            ])?;
            tx.commit()?;
        }
    }

    Ok(())
}

fn load_keys(conn: &Connection) -> Result<Option<LocalKeySet>, CryptoError> {
    let identity = fetch_private(conn, "identity")?;
    let exchange = fetch_private(conn, "exchange")?;

    match (identity, exchange) {
        (Some(id_bytes), Some(ex_bytes)) => Ok(Some(LocalKeySet {
            identity: IdentityKeyPair::from_private_bytes(&id_bytes)?,
            exchange: ExchangeKeyPair::from_private_bytes(&ex_bytes)?,
        })),
        (None, None) => Ok(None),
        _ => {
            tracing::warn!("vault holds a partial key set; treating it as absent");
            Ok(None)
        }
    }
}

fn fetch_private(conn: &Connection, role: &str) -> Result<Option<Zeroizing<Vec<u8>>>, CryptoError> {
    match conn.query_row(
        "SELECT private_key FROM vault_keys WHERE role = ?1",
        [role],
        |row| row.get::<_, Vec<u8>>(0),
    ) {
        Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn store_keys(conn: &Connection, keys: &LocalKeySet) -> Result<(), CryptoError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| CryptoError::Storage("system clock before epoch".into()))?
        .as_secs() as i64;

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM vault_keys", [])?;
    tx.execute(
        "INSERT INTO vault_keys (role, private_key, created_at) VALUES ('identity', ?1, ?2)",
        rusqlite::params![keys.identity.private_bytes().as_ref(), now],
    )?;
    tx.execute(
        "INSERT INTO vault_keys (role, private_key, created_at) VALUES ('exchange', ?1, ?2)",
        rusqlite::params![keys.exchange.private_bytes().as_ref(), now],
    )?;
    tx.commit()?;
    Ok(())
}
