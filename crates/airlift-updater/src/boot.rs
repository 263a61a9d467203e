use airlift_core::{
    ContentSlot, EventLog, FileStore, KeyValueStore, RemoteManifest, UpdateFailure, UpdateState,
};
use airlift_injector::{ContentInjector, HostView, InjectOutcome};
use anyhow::Result;

use crate::config::{UpdateConfig, UpdateMode};
use crate::resolver::{cache_busted, CheckOutcome, RemoteFetch, VersionResolver};
use crate::swap::{AtomicSwapManager, RecoveryOutcome, SwapOutcome};

pub const PENDING_QUEUE_DIR: &str = "pending";
pub const PENDING_BUNDLE_PATH: &str = "pending/bundle.zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    Local,
    Default,
}

impl ContentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct BootReport {
    pub recovery: Option<RecoveryOutcome>,
    pub pending: Option<SwapOutcome>,
    pub injection: InjectOutcome,
    pub mode: ContentMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    UpToDate,
    Unreachable,
    Applied(RemoteManifest),
    Deferred(RemoteManifest),
    Failed(UpdateFailure),
}

pub struct BootSequencer<'a> {
    files: &'a dyn FileStore,
    kv: &'a dyn KeyValueStore,
    view: &'a dyn HostView,
    log: &'a dyn EventLog,
    fetch: &'a dyn RemoteFetch,
}

impl<'a> BootSequencer<'a> {
    pub fn new(
        files: &'a dyn FileStore,
        kv: &'a dyn KeyValueStore,
        view: &'a dyn HostView,
        log: &'a dyn EventLog,
        fetch: &'a dyn RemoteFetch,
    ) -> Self {
        Self {
            files,
            kv,
            view,
            log,
            fetch,
        }
    }

    pub fn boot(&self, config: &UpdateConfig) -> Result<BootReport> {
        let swap = AtomicSwapManager::new(self.files, self.kv, self.view, self.log);
        let recovery = match swap.recover_if_needed() {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                self.log.error(&format!(
                    "boot recovery failed, serving default content: {err:#}"
                ));
                None
            }
        };

        let pending = if recovery.is_some() {
            match self.apply_pending(config) {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.log
                        .error(&format!("deferred update failed at boot: {err:#}"));
                    None
                }
            }
        } else {
            None
        };

        let injector = ContentInjector::new(self.files, self.view, self.log);
        let injection = injector.inject(ContentSlot::Active, &config.container_id);
        let mode = if injection.is_success() {
            ContentMode::Local
        } else {
            self.log.info(&format!(
                "no usable local content, serving default: {}",
                injection.as_str()
            ));
            ContentMode::Default
        };

        Ok(BootReport {
            recovery,
            pending,
            injection,
            mode,
        })
    }

    pub fn apply_pending(&self, config: &UpdateConfig) -> Result<Option<SwapOutcome>> {
        let state = UpdateState::new(self.kv);
        let Some(manifest) = state.pending()? else {
            return Ok(None);
        };

        if !self.files.exists(PENDING_BUNDLE_PATH) {
            self.log
                .warn("pending update recorded but its bundle is missing, discarding");
            state.clear_pending()?;
            return Ok(None);
        }

        self.log.info(&format!(
            "applying deferred update: version={}",
            manifest.version
        ));
        let bytes = self.files.read(PENDING_BUNDLE_PATH)?;
        let swap = AtomicSwapManager::new(self.files, self.kv, self.view, self.log);
        let outcome = swap.begin_update(&bytes, &manifest, &config.container_id);

        state.clear_pending()?;
        self.files.remove_tree(PENDING_QUEUE_DIR)?;
        Ok(Some(outcome?))
    }

    pub fn run_update_pass(&self, config: &UpdateConfig) -> Result<PassOutcome> {
        if config.manifest_url.is_empty() || config.bundle_url.is_empty() {
            return Err(anyhow::anyhow!(
                "update pass requires both a manifest url and a bundle url"
            ));
        }

        let resolver = VersionResolver::new(self.fetch, self.kv, self.log);
        let manifest = match resolver.check(&config.manifest_url)? {
            CheckOutcome::UpToDate => return Ok(PassOutcome::UpToDate),
            CheckOutcome::Unreachable => return Ok(PassOutcome::Unreachable),
            CheckOutcome::UpdateAvailable(manifest) => manifest,
        };

        let bytes = match self.fetch.fetch(&cache_busted(&config.bundle_url)) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.log.warn(&format!("bundle download failed: {err:#}"));
                return Ok(PassOutcome::Failed(UpdateFailure::Network));
            }
        };

        match config.mode {
            UpdateMode::OnNextBoot => {
                self.queue_pending(&manifest, &bytes)?;
                Ok(PassOutcome::Deferred(manifest))
            }
            UpdateMode::Immediate => {
                let swap = AtomicSwapManager::new(self.files, self.kv, self.view, self.log);
                match swap.begin_update(&bytes, &manifest, &config.container_id)? {
                    SwapOutcome::Committed => Ok(PassOutcome::Applied(manifest)),
                    SwapOutcome::RolledBack(failure) => Ok(PassOutcome::Failed(failure)),
                }
            }
        }
    }

    pub fn queue_pending(&self, manifest: &RemoteManifest, bytes: &[u8]) -> Result<()> {
        self.files.write(PENDING_BUNDLE_PATH, bytes)?;
        UpdateState::new(self.kv).record_pending(manifest)?;
        self.log.info(&format!(
            "queued update for next boot: version={}",
            manifest.version
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use airlift_core::{
        FileStore, KeyValueStore, MemoryLog, RemoteManifest, UpdateFailure, UpdateState,
    };
    use airlift_injector::{HeadlessView, InjectOutcome};
    use airlift_store::{DiskStore, PrefsStore};
    use anyhow::{anyhow, Result};

    use super::{BootSequencer, ContentMode, PassOutcome, PENDING_BUNDLE_PATH};
    use crate::config::{UpdateConfig, UpdateMode};
    use crate::resolver::RemoteFetch;
    use crate::stager::tests::build_zip;
    use crate::swap::{RecoveryOutcome, SwapOutcome};

    const CONTAINER: &str = "localAppContainer";
    const ENTRY_HTML: &str = "<html><head></head><body><div>app</div></body></html>";

    struct FakeFetch {
        responses: Mutex<Vec<Result<Vec<u8>>>>,
    }

    impl FakeFetch {
        fn new(responses: Vec<Result<Vec<u8>>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }

        fn remaining(&self) -> usize {
            self.responses.lock().expect("lock").len()
        }
    }

    impl RemoteFetch for FakeFetch {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            let mut responses = self.responses.lock().expect("lock");
            if responses.is_empty() {
                return Err(anyhow!("no response scripted"));
            }
            responses.remove(0)
        }
    }

    struct Harness {
        files: DiskStore,
        prefs: PrefsStore,
    }

    impl Harness {
        fn new() -> Self {
            let mut path = std::env::temp_dir();
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("system time")
                .as_nanos();
            path.push(format!(
                "airlift-boot-tests-{}-{}",
                std::process::id(),
                nanos
            ));
            let files = DiskStore::new(path.clone());
            let prefs = PrefsStore::new(path.join("prefs"));
            Self { files, prefs }
        }

        fn cleanup(&self) {
            let _ = fs::remove_dir_all(self.files.root());
        }
    }

    fn config(mode: UpdateMode) -> UpdateConfig {
        UpdateConfig {
            manifest_url: "https://example.test/version.json".to_string(),
            bundle_url: "https://example.test/bundle.zip".to_string(),
            container_id: CONTAINER.to_string(),
            mode,
        }
    }

    fn bundle() -> Vec<u8> {
        build_zip(&[("index.html", ENTRY_HTML), ("a.txt", "X")])
    }

    #[test]
    fn update_pass_applies_immediately() {
        let harness = Harness::new();
        let log = MemoryLog::new();
        let view = HeadlessView::new(&harness.files, &[CONTAINER]);
        let fetch = FakeFetch::new(vec![
            Ok(br#"{"version":"2.0.0","buildId":"b-2"}"#.to_vec()),
            Ok(bundle()),
        ]);
        let sequencer =
            BootSequencer::new(&harness.files, &harness.prefs, &view, &log, &fetch);

        let outcome = sequencer
            .run_update_pass(&config(UpdateMode::Immediate))
            .expect("pass must finish");
        match outcome {
            PassOutcome::Applied(manifest) => assert_eq!(manifest.version, "2.0.0"),
            other => panic!("expected applied, got {other:?}"),
        }
        assert_eq!(harness.files.read("active/a.txt").expect("must read"), b"X");
        assert_eq!(fetch.remaining(), 0);

        let state = UpdateState::new(&harness.prefs as &dyn KeyValueStore);
        assert_eq!(state.applied_version().expect("must read"), "2.0.0");

        harness.cleanup();
    }

    #[test]
    fn update_pass_skips_bundle_download_when_up_to_date() {
        let harness = Harness::new();
        let log = MemoryLog::new();
        let view = HeadlessView::new(&harness.files, &[CONTAINER]);
        UpdateState::new(&harness.prefs as &dyn KeyValueStore)
            .record_applied(&RemoteManifest {
                version: "2.0.0".to_string(),
                build_id: Some("b-2".to_string()),
            })
            .expect("must record");
        let fetch = FakeFetch::new(vec![Ok(
            br#"{"version":"2.0.0","buildId":"b-2"}"#.to_vec()
        )]);
        let sequencer =
            BootSequencer::new(&harness.files, &harness.prefs, &view, &log, &fetch);

        let outcome = sequencer
            .run_update_pass(&config(UpdateMode::Immediate))
            .expect("pass must finish");
        assert_eq!(outcome, PassOutcome::UpToDate);
        assert_eq!(fetch.remaining(), 0);
        assert!(!harness.files.exists("active"));

        harness.cleanup();
    }

    #[test]
    fn update_pass_is_soft_on_unreachable_manifest() {
        let harness = Harness::new();
        let log = MemoryLog::new();
        let view = HeadlessView::new(&harness.files, &[CONTAINER]);
        let fetch = FakeFetch::new(vec![Err(anyhow!("connection refused"))]);
        let sequencer =
            BootSequencer::new(&harness.files, &harness.prefs, &view, &log, &fetch);

        let outcome = sequencer
            .run_update_pass(&config(UpdateMode::Immediate))
            .expect("pass must finish");
        assert_eq!(outcome, PassOutcome::Unreachable);

        harness.cleanup();
    }

    #[test]
    fn update_pass_reports_network_failure_on_bundle_download() {
        let harness = Harness::new();
        let log = MemoryLog::new();
        let view = HeadlessView::new(&harness.files, &[CONTAINER]);
        let fetch = FakeFetch::new(vec![
            Ok(br#"{"version":"2.0.0"}"#.to_vec()),
            Err(anyhow!("timed out")),
        ]);
        let sequencer =
            BootSequencer::new(&harness.files, &harness.prefs, &view, &log, &fetch);

        let outcome = sequencer
            .run_update_pass(&config(UpdateMode::Immediate))
            .expect("pass must finish");
        assert_eq!(outcome, PassOutcome::Failed(UpdateFailure::Network));
        assert!(!harness.files.exists("active"));
        assert!(log.contains("bundle download failed"));

        harness.cleanup();
    }

    #[test]
    fn update_pass_requires_configured_urls() {
        let harness = Harness::new();
        let log = MemoryLog::new();
        let view = HeadlessView::new(&harness.files, &[CONTAINER]);
        let fetch = FakeFetch::new(vec![]);
        let sequencer =
            BootSequencer::new(&harness.files, &harness.prefs, &view, &log, &fetch);

        assert!(sequencer
            .run_update_pass(&UpdateConfig::default())
            .is_err());

        harness.cleanup();
    }

    #[test]
    fn deferred_mode_queues_instead_of_applying() {
        let harness = Harness::new();
        let log = MemoryLog::new();
        let view = HeadlessView::new(&harness.files, &[CONTAINER]);
        let fetch = FakeFetch::new(vec![
            Ok(br#"{"version":"2.0.0","buildId":"b-2"}"#.to_vec()),
            Ok(bundle()),
        ]);
        let sequencer =
            BootSequencer::new(&harness.files, &harness.prefs, &view, &log, &fetch);

        let outcome = sequencer
            .run_update_pass(&config(UpdateMode::OnNextBoot))
            .expect("pass must finish");
        match outcome {
            PassOutcome::Deferred(manifest) => assert_eq!(manifest.version, "2.0.0"),
            other => panic!("expected deferred, got {other:?}"),
        }
        assert!(harness.files.exists(PENDING_BUNDLE_PATH));
        assert!(!harness.files.exists("active"));

        let state = UpdateState::new(&harness.prefs as &dyn KeyValueStore);
        let pending = state.pending().expect("must read").expect("pending set");
        assert_eq!(pending.version, "2.0.0");

        harness.cleanup();
    }

    #[test]
    fn boot_consumes_a_queued_update() {
        let harness = Harness::new();
        let log = MemoryLog::new();
        let view = HeadlessView::new(&harness.files, &[CONTAINER]);
        let fetch = FakeFetch::new(vec![]);
        let sequencer =
            BootSequencer::new(&harness.files, &harness.prefs, &view, &log, &fetch);

        sequencer
            .queue_pending(
                &RemoteManifest {
                    version: "2.0.0".to_string(),
                    build_id: Some("b-2".to_string()),
                },
                &bundle(),
            )
            .expect("must queue");

        let report = sequencer
            .boot(&config(UpdateMode::OnNextBoot))
            .expect("boot must finish");
        assert_eq!(report.recovery, Some(RecoveryOutcome::Clean));
        assert_eq!(report.pending, Some(SwapOutcome::Committed));
        assert_eq!(report.injection, InjectOutcome::Injected);
        assert_eq!(report.mode, ContentMode::Local);

        let state = UpdateState::new(&harness.prefs as &dyn KeyValueStore);
        assert!(state.pending().expect("must read").is_none());
        assert!(!harness.files.exists("pending"));
        assert_eq!(state.applied_version().expect("must read"), "2.0.0");

        harness.cleanup();
    }

    #[test]
    fn boot_discards_pending_keys_without_a_bundle() {
        let harness = Harness::new();
        let log = MemoryLog::new();
        let view = HeadlessView::new(&harness.files, &[CONTAINER]);
        let fetch = FakeFetch::new(vec![]);
        UpdateState::new(&harness.prefs as &dyn KeyValueStore)
            .record_pending(&RemoteManifest {
                version: "2.0.0".to_string(),
                build_id: None,
            })
            .expect("must record");
        let sequencer =
            BootSequencer::new(&harness.files, &harness.prefs, &view, &log, &fetch);

        let report = sequencer
            .boot(&config(UpdateMode::OnNextBoot))
            .expect("boot must finish");
        assert_eq!(report.pending, None);

        let state = UpdateState::new(&harness.prefs as &dyn KeyValueStore);
        assert!(state.pending().expect("must read").is_none());

        harness.cleanup();
    }

    #[test]
    fn boot_without_local_content_serves_default() {
        let harness = Harness::new();
        let log = MemoryLog::new();
        let view = HeadlessView::new(&harness.files, &[CONTAINER]);
        let fetch = FakeFetch::new(vec![]);
        let sequencer =
            BootSequencer::new(&harness.files, &harness.prefs, &view, &log, &fetch);

        let report = sequencer
            .boot(&config(UpdateMode::Immediate))
            .expect("boot must finish");
        assert_eq!(report.recovery, Some(RecoveryOutcome::Clean));
        assert_eq!(report.injection, InjectOutcome::MissingEntry);
        assert_eq!(report.mode, ContentMode::Default);

        harness.cleanup();
    }

    #[test]
    fn boot_recovers_an_interrupted_swap_before_injecting() {
        let harness = Harness::new();
        let log = MemoryLog::new();
        let view = HeadlessView::new(&harness.files, &[CONTAINER]);
        let fetch = FakeFetch::new(vec![]);

        harness
            .files
            .write("backup/index.html", ENTRY_HTML.as_bytes())
            .expect("must write backup");
        harness
            .files
            .write("active/partial.bin", b"half")
            .expect("must write partial");
        UpdateState::new(&harness.prefs as &dyn KeyValueStore)
            .mark_update_in_progress()
            .expect("must mark");

        let sequencer =
            BootSequencer::new(&harness.files, &harness.prefs, &view, &log, &fetch);
        let report = sequencer
            .boot(&config(UpdateMode::Immediate))
            .expect("boot must finish");
        assert_eq!(report.recovery, Some(RecoveryOutcome::Recovered));
        assert_eq!(report.mode, ContentMode::Local);
        assert!(!harness.files.exists("active/partial.bin"));
        assert!(harness.files.exists("active/index.html"));

        harness.cleanup();
    }
}
