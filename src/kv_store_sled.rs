use std::path::Path;

use sled::{Batch, Db, Tree};

use crate::errors::{LogBufError, LogBufResult};
use crate::kv_store::{KeyValueStore, WriteOp};

/// A sled-backed implementation of KeyValueStore, one tree per namespace.
///
/// Writes are flushed before returning so a crash right after `set` does not
/// lose the slot. That costs an fsync per call, and the caller's thread blocks
/// on it: `LogBuffer` runs these calls under its lock, on whichever thread
/// appends or flushes. Multi-key updates go through `apply`, which commits a
/// `sled::Batch` atomically with a single flush.
#[derive(Clone)]
pub struct SledStore {
    tree: Tree,
}

impl SledStore {
    /// Opens (or creates) the database at `path` and the named tree inside it.
    pub fn open(path: impl AsRef<Path>, namespace: &str) -> LogBufResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            LogBufError::storage(format!("open sled db at {}", path.display()), e)
        })?;
        Self::with_db(&db, namespace)
    }

    /// Opens a namespace on an already opened database. Several stores can
    /// share one `Db` this way.
    pub fn with_db(db: &Db, namespace: &str) -> LogBufResult<Self> {
        let tree = db
            .open_tree(namespace)
            .map_err(|e| LogBufError::storage(format!("open tree {namespace}"), e))?;
        Ok(Self { tree })
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> LogBufResult<Option<String>> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => {
                let text = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    LogBufError::corrupt_state(key, String::from_utf8_lossy(e.as_bytes()))
                })?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> LogBufResult<()> {
        self.tree.insert(key.as_bytes(), value.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> LogBufResult<()> {
        self.tree.remove(key.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    fn apply(&self, ops: &[WriteOp]) -> LogBufResult<()> {
        let mut batch = Batch::default();
        for op in ops {
            match op {
                WriteOp::Set(key, value) => batch.insert(key.as_bytes(), value.as_bytes()),
                WriteOp::Remove(key) => batch.remove(key.as_bytes()),
            }
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        Ok(())
    }
}
