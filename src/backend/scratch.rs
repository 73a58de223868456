use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::backend::error::{Result, SeekError};

/// File name of the store inside an ephemeral scratch directory.
pub const SPILL_FILE_NAME: &str = "spill.db";

/// Supplies the directory under which ephemeral stores are created.
pub trait ScratchProvider {
    /// Creates the root if needed and returns it.
    fn ensure_and_return_root(&self) -> io::Result<PathBuf>;

    /// Root the provider will try to create, reported when that fails.
    /// Providers that return `None` are reported with an empty path.
    fn root_hint(&self) -> Option<PathBuf> {
        None
    }
}

/// Scratch provider backed by a fixed directory.
#[derive(Clone, Debug)]
pub struct ScratchRoot {
    root: PathBuf,
}

impl ScratchRoot {
    /// Uses `root` as the scratch root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Uses the per-user cache directory, falling back to `build/`.
    pub fn user_cache() -> Self {
        let root = dirs::cache_dir()
            .map(|base| base.join("tablecraft"))
            .unwrap_or_else(|| PathBuf::from(super::options::DEFAULT_SCRATCH_ROOT));
        Self { root }
    }

    /// Returns the configured root without creating it.
    pub fn path(&self) -> &Path {
        &self.root
    }
}

impl ScratchProvider for ScratchRoot {
    fn ensure_and_return_root(&self) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        Ok(self.root.clone())
    }

    fn root_hint(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }
}

/// A process-private directory holding one ephemeral store.
#[derive(Debug)]
pub(crate) struct ScratchDir {
    dir: TempDir,
    db_path: PathBuf,
}

impl ScratchDir {
    pub(crate) fn create(provider: &dyn ScratchProvider) -> Result<Self> {
        let root = provider
            .ensure_and_return_root()
            .map_err(|err| {
                let root = provider.root_hint().unwrap_or_default();
                SeekError::io("create scratch root", root, err)
            })?;
        let dir = tempfile::Builder::new()
            .prefix("seekdb")
            .tempdir_in(&root)
            .map_err(|err| SeekError::io("create scratch dir", &root, err))?;
        let db_path = dir.path().join(SPILL_FILE_NAME);
        Ok(Self { dir, db_path })
    }

    pub(crate) fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn dir_path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the spill file, its WAL companions and the directory.
    pub(crate) fn remove(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|err| SeekError::io("remove scratch dir", path, err))
    }
}
