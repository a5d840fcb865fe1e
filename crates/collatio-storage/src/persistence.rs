//! Transactional, file-backed corpus store.
//!
//! ```text
//!   read(|c| ..) ─────────► live Corpus ◄──── swap on commit
//!                               │                  ▲
//!   transaction(|c| ..) ── clone ──► private copy ─┤ Ok: write snapshot
//!                                                  └ Err: drop copy
//! ```
//!
//! Writers hold the write lock for the whole transaction, so imports are
//! serialized. Readers always see the last committed corpus.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Corpus, StoreError};

/// Shared handle to a corpus, optionally persisted as a JSON snapshot.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    inner: Arc<RwLock<Corpus>>,
    path: Option<PathBuf>,
}

impl CorpusStore {
    /// A store that lives only as long as its handles.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Corpus::new())),
            path: None,
        }
    }

    /// Opens the snapshot at `path`, starting empty when the file does not
    /// exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let corpus = if path.exists() {
            let bytes = fs::read(&path)?;
            let corpus: Corpus = serde_json::from_slice(&bytes)?;
            tracing::debug!(path = %path.display(), "loaded corpus snapshot");
            corpus
        } else {
            Corpus::new()
        };
        Ok(Self {
            inner: Arc::new(RwLock::new(corpus)),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs a side-effect-free query against the committed corpus.
    pub fn read<R>(&self, f: impl FnOnce(&Corpus) -> R) -> R {
        let guard = self.inner.read();
        f(&guard)
    }

    /// Applies `f` atomically.
    ///
    /// `f` works on a copy of the corpus. When it returns `Ok` the copy is
    /// written to the snapshot file and becomes the live corpus; when it
    /// returns `Err`, or the snapshot cannot be written, nothing changes.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&mut Corpus) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self.inner.write();
        let mut working = guard.clone();
        match f(&mut working) {
            Ok(value) => {
                if let Some(path) = &self.path {
                    write_snapshot(path, &working).map_err(E::from)?;
                }
                *guard = working;
                Ok(value)
            }
            Err(err) => {
                tracing::debug!("transaction rolled back");
                Err(err)
            }
        }
    }

    /// A detached copy of the committed corpus.
    pub fn snapshot(&self) -> Corpus {
        self.inner.read().clone()
    }
}

/// Writes `corpus` next to `path` and renames it into place.
fn write_snapshot(path: &Path, corpus: &Corpus) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(corpus)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    tracing::debug!(path = %path.display(), "corpus snapshot written");
    Ok(())
}
