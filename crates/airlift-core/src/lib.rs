mod eventlog;
mod manifest;
mod state;
mod store;

pub use eventlog::{EventLog, LogEntry, LogLevel, MemoryLog, StdLog, MEMORY_LOG_CAPACITY};
pub use manifest::{update_available, RemoteManifest};
pub use state::{state_keys, UpdateState, DEFAULT_APPLIED_VERSION};
pub use store::{copy_tree, FileStore, KeyValueStore, StoreEntry, StoreEntryKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSlot {
    Active,
    Staging,
    Backup,
}

impl ContentSlot {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Staging => "staging",
            Self::Backup => "backup",
        }
    }

    pub fn entry_path(self) -> String {
        format!("{}/index.html", self.dir_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateFailure {
    Network,
    Archive,
    Injection,
    Store,
    Recovery,
}

impl UpdateFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Archive => "archive",
            Self::Injection => "injection",
            Self::Store => "store",
            Self::Recovery => "recovery",
        }
    }
}
