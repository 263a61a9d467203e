use airlift_core::{
    copy_tree, ContentSlot, EventLog, FileStore, KeyValueStore, RemoteManifest, UpdateFailure,
    UpdateState,
};
use airlift_injector::{ContentInjector, HostView};
use anyhow::{Context, Result};

use crate::stager::stage_bundle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Committed,
    RolledBack(UpdateFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Clean,
    Recovered,
}

pub struct AtomicSwapManager<'a> {
    files: &'a dyn FileStore,
    kv: &'a dyn KeyValueStore,
    view: &'a dyn HostView,
    log: &'a dyn EventLog,
}

impl<'a> AtomicSwapManager<'a> {
    pub fn new(
        files: &'a dyn FileStore,
        kv: &'a dyn KeyValueStore,
        view: &'a dyn HostView,
        log: &'a dyn EventLog,
    ) -> Self {
        Self {
            files,
            kv,
            view,
            log,
        }
    }

    pub fn begin_update(
        &self,
        bytes: &[u8],
        manifest: &RemoteManifest,
        container_id: &str,
    ) -> Result<SwapOutcome> {
        let state = UpdateState::new(self.kv);
        state.mark_update_in_progress()?;
        self.log.info(&format!(
            "starting update swap: version={} buildId={}",
            manifest.version,
            manifest.build_id.as_deref().unwrap_or("-")
        ));

        if let Err(err) = self.prepare_backup() {
            self.log
                .error(&format!("backup preparation failed: {err:#}"));
            return self.discard_attempt(&state, UpdateFailure::Store);
        }

        if let Err(err) = stage_bundle(self.files, self.log, bytes) {
            self.log.error(&format!("bundle staging failed: {err:#}"));
            return self.discard_attempt(&state, UpdateFailure::Archive);
        }

        let injector = ContentInjector::new(self.files, self.view, self.log);
        let trial = injector.inject(ContentSlot::Staging, container_id);
        if !trial.is_success() {
            self.log.warn(&format!(
                "trial injection rejected staged bundle: {}",
                trial.as_str()
            ));
            return self.discard_attempt(&state, UpdateFailure::Injection);
        }

        match self.commit(&state, manifest) {
            Ok(()) => {
                self.log
                    .info(&format!("update committed: version={}", manifest.version));
                Ok(SwapOutcome::Committed)
            }
            Err(err) => {
                self.log.error(&format!("commit failed: {err:#}"));
                self.roll_back(&state, UpdateFailure::Store)
            }
        }
    }

    pub fn recover_if_needed(&self) -> Result<RecoveryOutcome> {
        let state = UpdateState::new(self.kv);
        let flagged = state.update_in_progress()?;
        let orphaned_backup = self.files.exists(ContentSlot::Backup.dir_name())
            && !self.files.exists(ContentSlot::Active.dir_name());
        if !flagged && !orphaned_backup {
            return Ok(RecoveryOutcome::Clean);
        }

        self.log
            .warn("interrupted update detected, restoring last known-good content");
        if let Err(err) = self.restore_previous() {
            let _ = state.clear_update_in_progress();
            return Err(err).context("boot recovery failed");
        }
        state.clear_update_in_progress()?;
        self.log.info("boot recovery complete");
        Ok(RecoveryOutcome::Recovered)
    }

    fn prepare_backup(&self) -> Result<()> {
        self.files.remove_tree(ContentSlot::Staging.dir_name())?;
        self.files.remove_tree(ContentSlot::Backup.dir_name())?;
        if self.files.exists(ContentSlot::Active.dir_name()) {
            copy_tree(
                self.files,
                ContentSlot::Active.dir_name(),
                ContentSlot::Backup.dir_name(),
            )?;
        }
        Ok(())
    }

    fn commit(&self, state: &UpdateState, manifest: &RemoteManifest) -> Result<()> {
        self.files.remove_tree(ContentSlot::Active.dir_name())?;
        copy_tree(
            self.files,
            ContentSlot::Staging.dir_name(),
            ContentSlot::Active.dir_name(),
        )?;
        self.files.remove_tree(ContentSlot::Staging.dir_name())?;
        self.files.remove_tree(ContentSlot::Backup.dir_name())?;
        state.record_applied(manifest)?;
        state.clear_update_in_progress()?;
        Ok(())
    }

    // Before commit nothing has touched active; the backup may be partial, so
    // it must never be restored here.
    fn discard_attempt(&self, state: &UpdateState, failure: UpdateFailure) -> Result<SwapOutcome> {
        if let Err(err) = self.remove_work_slots() {
            self.log
                .error(&format!("failed to discard update attempt: {err:#}"));
            let _ = state.clear_update_in_progress();
            return Err(err).context("update cleanup failed");
        }
        state.clear_update_in_progress()?;
        self.log
            .warn(&format!("update rolled back: {}", failure.as_str()));
        Ok(SwapOutcome::RolledBack(failure))
    }

    fn remove_work_slots(&self) -> Result<()> {
        self.files.remove_tree(ContentSlot::Staging.dir_name())?;
        self.files.remove_tree(ContentSlot::Backup.dir_name())?;
        Ok(())
    }

    fn roll_back(&self, state: &UpdateState, failure: UpdateFailure) -> Result<SwapOutcome> {
        if let Err(err) = self.restore_previous() {
            self.log.error(&format!(
                "rollback failed to restore previous content: {err:#}"
            ));
            let _ = state.clear_update_in_progress();
            return Err(err).context("update rollback failed");
        }
        state.clear_update_in_progress()?;
        self.log
            .warn(&format!("update rolled back: {}", failure.as_str()));
        Ok(SwapOutcome::RolledBack(failure))
    }

    fn restore_previous(&self) -> Result<()> {
        self.files.remove_tree(ContentSlot::Staging.dir_name())?;
        if self.files.exists(ContentSlot::Backup.dir_name()) {
            self.files.remove_tree(ContentSlot::Active.dir_name())?;
            copy_tree(
                self.files,
                ContentSlot::Backup.dir_name(),
                ContentSlot::Active.dir_name(),
            )?;
            self.files.remove_tree(ContentSlot::Backup.dir_name())?;
        }
        Ok(())
    }
}
