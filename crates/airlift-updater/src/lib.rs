mod boot;
mod config;
mod resolver;
mod stager;
mod swap;

pub use boot::{
    BootReport, BootSequencer, ContentMode, PassOutcome, PENDING_BUNDLE_PATH, PENDING_QUEUE_DIR,
};
pub use config::{load_config, UpdateConfig, UpdateMode, CONFIG_PATH, DEFAULT_CONTAINER_ID};
pub use resolver::{cache_busted, CheckOutcome, HttpFetch, RemoteFetch, VersionResolver};
pub use stager::stage_bundle;
pub use swap::{AtomicSwapManager, RecoveryOutcome, SwapOutcome};

use airlift_core::{ContentSlot, EventLog, FileStore, KeyValueStore, UpdateState};
use anyhow::Result;

pub fn clear_local_content(
    files: &dyn FileStore,
    kv: &dyn KeyValueStore,
    log: &dyn EventLog,
) -> Result<()> {
    for slot in [ContentSlot::Active, ContentSlot::Staging, ContentSlot::Backup] {
        files.remove_tree(slot.dir_name())?;
    }
    files.remove_tree(PENDING_QUEUE_DIR)?;
    UpdateState::new(kv).reset()?;
    log.info("local content cleared, reverted to default");
    Ok(())
}
