//! Database types and global state

use std::path::Path;
use std::sync::{Mutex, OnceLock};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use heed::types::{Bytes, Str, U64};
use tracing::info;

use crate::error::{err, ObjpermError, Result};

// Database type aliases
pub type Db = Database<Bytes, U64<byteorder::BigEndian>>;
pub type DbStr = Database<Bytes, Str>;
pub type DbU64 = Database<Str, U64<byteorder::BigEndian>>;
pub type DbJson = Database<Bytes, Bytes>;

/// Create a 16-byte key from two u64 values
#[inline]
pub fn key(a: u64, b: u64) -> [u8; 16] {
    let a = a.to_be_bytes();
    let b = b.to_be_bytes();
    [a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7],
     b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]
}

/// Milliseconds since the epoch, stored as the value of index entries
pub(crate) fn current_epoch() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Bidirectional index: fwd[a,b] and rev[b,a] stay in sync
pub struct BiPair {
    pub fwd: Db,
    pub rev: Db,
}

impl BiPair {
    #[inline]
    pub fn put(&self, tx: &mut RwTxn, a: u64, b: u64, v: u64) -> Result<()> {
        self.fwd.put(tx, &key(a, b), &v).map_err(err)?;
        self.rev.put(tx, &key(b, a), &v).map_err(err)
    }

    #[inline]
    pub fn del(&self, tx: &mut RwTxn, a: u64, b: u64) -> Result<bool> {
        let r = self.fwd.delete(tx, &key(a, b)).map_err(err)?;
        self.rev.delete(tx, &key(b, a)).map_err(err)?;
        Ok(r)
    }

    /// Remove every pair whose right-hand side is `b`
    pub fn del_rev(&self, tx: &mut RwTxn, b: u64) -> Result<usize> {
        let pairs = self.list_rev(tx, b)?;
        for &(a, _) in &pairs {
            self.del(tx, a, b)?;
        }
        Ok(pairs.len())
    }

    pub fn list_fwd(&self, tx: &RoTxn, a: u64) -> Result<Vec<(u64, u64)>> {
        Self::list_pfx(tx, &self.fwd, a)
    }

    pub fn list_rev(&self, tx: &RoTxn, b: u64) -> Result<Vec<(u64, u64)>> {
        Self::list_pfx(tx, &self.rev, b)
    }

    pub fn count_fwd(&self, tx: &RoTxn, a: u64) -> Result<usize> {
        Self::count_pfx(tx, &self.fwd, a)
    }

    fn list_pfx(tx: &RoTxn, db: &Db, pfx: u64) -> Result<Vec<(u64, u64)>> {
        let mut r = Vec::new();
        for item in db.prefix_iter(tx, &pfx.to_be_bytes()).map_err(err)? {
            let (k, v) = item.map_err(err)?;
            if let Some(tail) = k.get(8..).and_then(|t| <[u8; 8]>::try_from(t).ok()) {
                r.push((u64::from_be_bytes(tail), v));
            }
        }
        Ok(r)
    }

    fn count_pfx(tx: &RoTxn, db: &Db, pfx: u64) -> Result<usize> {
        Ok(db.prefix_iter(tx, &pfx.to_be_bytes()).map_err(err)?.count())
    }

    fn clear(&self, tx: &mut RwTxn) -> Result<()> {
        self.fwd.clear(tx).map_err(err)?;
        self.rev.clear(tx).map_err(err)
    }
}

/// All database handles
pub struct Dbs {
    /// permission id -> JSON record
    pub perms: DbJson,
    /// (user, permission)
    pub users: BiPair,
    /// (group, permission)
    pub groups: BiPair,
    /// (object type, permission)
    pub types: BiPair,
    /// (user, group) membership
    pub members: BiPair,
    /// object type id -> "app_label.model"
    pub type_labels: DbStr,
    /// "app_label.model" -> object type id
    pub type_names: DbU64,
    pub meta: Database<Str, Str>,
}

// Global state
pub static ENV: OnceLock<Env> = OnceLock::new();
pub static DBS: OnceLock<Dbs> = OnceLock::new();
pub static TEST_LOCK: Mutex<()> = Mutex::new(());
pub static INIT_PATH: OnceLock<String> = OnceLock::new();

/// Get the database handles, or error if not initialized
#[inline]
pub fn dbs() -> Result<&'static Dbs> {
    DBS.get().ok_or_else(|| ObjpermError::Storage("Not initialized".into()))
}

/// Get the environment, or error if not initialized
#[inline]
pub fn env() -> Result<&'static Env> {
    ENV.get().ok_or_else(|| ObjpermError::Storage("Not initialized".into()))
}

/// Execute a read-only operation
#[inline]
pub fn read<T, F: FnOnce(&Dbs, &RoTxn) -> Result<T>>(f: F) -> Result<T> {
    f(dbs()?, &env()?.read_txn().map_err(err)?)
}

/// Initialize the database
pub fn init(path: &str) -> Result<()> {
    if let Some(p) = INIT_PATH.get() {
        return if p == path {
            Ok(())
        } else {
            Err(ObjpermError::Storage(format!("Already init at {}", p)))
        };
    }
    std::fs::create_dir_all(path).map_err(err)?;
    // SAFETY: LMDB requires no other processes access this path concurrently during open.
    let e = unsafe {
        EnvOpenOptions::new()
            .map_size(1 << 30)
            .max_dbs(12)
            .open(Path::new(path))
            .map_err(err)?
    };
    let mut tx = e.write_txn().map_err(err)?;
    let d = Dbs {
        perms: e.create_database(&mut tx, Some("perms")).map_err(err)?,
        users: BiPair {
            fwd: e.create_database(&mut tx, Some("user_perms")).map_err(err)?,
            rev: e.create_database(&mut tx, Some("perm_users")).map_err(err)?,
        },
        groups: BiPair {
            fwd: e.create_database(&mut tx, Some("group_perms")).map_err(err)?,
            rev: e.create_database(&mut tx, Some("perm_groups")).map_err(err)?,
        },
        types: BiPair {
            fwd: e.create_database(&mut tx, Some("type_perms")).map_err(err)?,
            rev: e.create_database(&mut tx, Some("perm_types")).map_err(err)?,
        },
        members: BiPair {
            fwd: e.create_database(&mut tx, Some("members")).map_err(err)?,
            rev: e.create_database(&mut tx, Some("member_of")).map_err(err)?,
        },
        type_labels: e.create_database(&mut tx, Some("type_labels")).map_err(err)?,
        type_names: e.create_database(&mut tx, Some("type_names")).map_err(err)?,
        meta: e.create_database(&mut tx, Some("meta")).map_err(err)?,
    };
    tx.commit().map_err(err)?;
    let _ = (ENV.set(e), DBS.set(d), INIT_PATH.set(path.to_string()));
    info!(path, "permission store opened");
    Ok(())
}

/// Clear all databases (for testing)
pub fn clear_all() -> Result<()> {
    crate::tx::transact(|tx| {
        let d = tx.dbs();
        d.perms.clear(tx.tx()).map_err(err)?;
        d.users.clear(tx.tx())?;
        d.groups.clear(tx.tx())?;
        d.types.clear(tx.tx())?;
        d.members.clear(tx.tx())?;
        d.type_labels.clear(tx.tx()).map_err(err)?;
        d.type_names.clear(tx.tx()).map_err(err)?;
        d.meta.clear(tx.tx()).map_err(err)
    })
}

/// Get the test lock (for single-threaded tests)
pub fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|p| p.into_inner())
}
