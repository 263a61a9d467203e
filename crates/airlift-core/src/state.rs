use anyhow::Result;

use crate::manifest::RemoteManifest;
use crate::store::KeyValueStore;

pub mod state_keys {
    pub const APPLIED_VERSION: &str = "appliedVersion";
    pub const APPLIED_BUILD_ID: &str = "appliedBuildId";
    pub const PENDING_VERSION: &str = "pendingVersion";
    pub const PENDING_BUILD_ID: &str = "pendingBuildId";
    pub const UPDATE_IN_PROGRESS: &str = "updateInProgress";
}

pub const DEFAULT_APPLIED_VERSION: &str = "0.0.0";

pub struct UpdateState<'a> {
    kv: &'a dyn KeyValueStore,
}

impl<'a> UpdateState<'a> {
    pub fn new(kv: &'a dyn KeyValueStore) -> Self {
        Self { kv }
    }

    pub fn applied_version(&self) -> Result<String> {
        Ok(self
            .kv
            .get(state_keys::APPLIED_VERSION)?
            .unwrap_or_else(|| DEFAULT_APPLIED_VERSION.to_string()))
    }

    pub fn applied_build_id(&self) -> Result<Option<String>> {
        self.kv.get(state_keys::APPLIED_BUILD_ID)
    }

    pub fn record_applied(&self, manifest: &RemoteManifest) -> Result<()> {
        self.kv.set(state_keys::APPLIED_VERSION, &manifest.version)?;
        match manifest.build_id.as_deref() {
            Some(build_id) => self.kv.set(state_keys::APPLIED_BUILD_ID, build_id)?,
            None => self.kv.remove(state_keys::APPLIED_BUILD_ID)?,
        }
        Ok(())
    }

    pub fn pending(&self) -> Result<Option<RemoteManifest>> {
        let Some(version) = self.kv.get(state_keys::PENDING_VERSION)? else {
            return Ok(None);
        };
        let build_id = self.kv.get(state_keys::PENDING_BUILD_ID)?;
        Ok(Some(RemoteManifest { version, build_id }))
    }

    pub fn record_pending(&self, manifest: &RemoteManifest) -> Result<()> {
        self.kv.set(state_keys::PENDING_VERSION, &manifest.version)?;
        match manifest.build_id.as_deref() {
            Some(build_id) => self.kv.set(state_keys::PENDING_BUILD_ID, build_id)?,
            None => self.kv.remove(state_keys::PENDING_BUILD_ID)?,
        }
        Ok(())
    }

    pub fn clear_pending(&self) -> Result<()> {
        self.kv.remove(state_keys::PENDING_VERSION)?;
        self.kv.remove(state_keys::PENDING_BUILD_ID)?;
        Ok(())
    }

    pub fn update_in_progress(&self) -> Result<bool> {
        Ok(self.kv.get(state_keys::UPDATE_IN_PROGRESS)?.is_some())
    }

    pub fn mark_update_in_progress(&self) -> Result<()> {
        self.kv.set(state_keys::UPDATE_IN_PROGRESS, "true")
    }

    pub fn clear_update_in_progress(&self) -> Result<()> {
        self.kv.remove(state_keys::UPDATE_IN_PROGRESS)
    }

    pub fn reset(&self) -> Result<()> {
        self.kv
            .set(state_keys::APPLIED_VERSION, DEFAULT_APPLIED_VERSION)?;
        self.kv.remove(state_keys::APPLIED_BUILD_ID)?;
        self.clear_pending()?;
        self.clear_update_in_progress()?;
        Ok(())
    }
}
