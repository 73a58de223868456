use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default name of the single view a backend maintains.
pub const DEFAULT_VIEW_NAME: &str = "_view";
/// Default name of the stable key column.
pub const DEFAULT_KEY_NAME: &str = "_id";
/// Default scratch root, relative to the working directory.
pub const DEFAULT_SCRATCH_ROOT: &str = "build";

/// Resource tuning profile applied when a backend is opened.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMode {
    /// Conservative cache budget.
    #[default]
    Auto,
    /// Smallest cache budget, for constrained machines.
    LowRam,
    /// Larger cache budget.
    Normal,
}

impl MemoryMode {
    /// Page cache budget in KiB.
    pub fn cache_kib(self) -> i64 {
        match self {
            MemoryMode::Auto => 16 * 1024,
            MemoryMode::LowRam => 8 * 1024,
            MemoryMode::Normal => 32 * 1024,
        }
    }

    /// Returns the string representation of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryMode::Auto => "auto",
            MemoryMode::LowRam => "low_ram",
            MemoryMode::Normal => "normal",
        }
    }
}

/// Options used when opening a [`Backend`](crate::backend::Backend).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendOptions {
    /// Cache tuning profile.
    pub mode: MemoryMode,
    /// Name of the view reads run against.
    pub view_name: String,
    /// Name of the stable key column.
    pub key_name: String,
    /// Directory under which ephemeral stores are created.
    pub scratch_root: PathBuf,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            mode: MemoryMode::Auto,
            view_name: DEFAULT_VIEW_NAME.to_string(),
            key_name: DEFAULT_KEY_NAME.to_string(),
            scratch_root: PathBuf::from(DEFAULT_SCRATCH_ROOT),
        }
    }
}

impl BackendOptions {
    /// Sets the tuning profile.
    pub fn mode(mut self, mode: MemoryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the scratch root for ephemeral stores.
    pub fn scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Sets the stable key column name.
    pub fn key_name(mut self, key: impl Into<String>) -> Self {
        self.key_name = key.into();
        self
    }

    /// Sets the view name.
    pub fn view_name(mut self, view: impl Into<String>) -> Self {
        self.view_name = view.into();
        self
    }
}
