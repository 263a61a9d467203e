mod disk;
mod prefs;

pub use disk::DiskStore;
pub use prefs::PrefsStore;
