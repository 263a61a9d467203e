use std::time::{Duration, SystemTime, UNIX_EPOCH};

use airlift_core::{update_available, EventLog, KeyValueStore, RemoteManifest, UpdateState};
use anyhow::{anyhow, Context, Result};

pub trait RemoteFetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetch {
    client: reqwest::blocking::Client,
}

impl HttpFetch {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build http client")?;
        Ok(Self { client })
    }
}

impl RemoteFetch for HttpFetch {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .with_context(|| format!("request failed: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("request returned status {status}: {url}"));
        }

        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read response body: {url}"))?;
        Ok(bytes.to_vec())
    }
}

pub fn cache_busted(url: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}t={millis}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    UpdateAvailable(RemoteManifest),
    UpToDate,
    Unreachable,
}

pub struct VersionResolver<'a> {
    fetch: &'a dyn RemoteFetch,
    kv: &'a dyn KeyValueStore,
    log: &'a dyn EventLog,
}

impl<'a> VersionResolver<'a> {
    pub fn new(
        fetch: &'a dyn RemoteFetch,
        kv: &'a dyn KeyValueStore,
        log: &'a dyn EventLog,
    ) -> Self {
        Self { fetch, kv, log }
    }

    pub fn check(&self, manifest_url: &str) -> Result<CheckOutcome> {
        let url = cache_busted(manifest_url);
        let bytes = match self.fetch.fetch(&url) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.log.warn(&format!("manifest fetch failed: {err:#}"));
                return Ok(CheckOutcome::Unreachable);
            }
        };

        let manifest = match RemoteManifest::from_json(&bytes) {
            Ok(manifest) => manifest,
            Err(err) => {
                self.log
                    .warn(&format!("remote manifest rejected: {err:#}"));
                return Ok(CheckOutcome::Unreachable);
            }
        };

        let state = UpdateState::new(self.kv);
        let applied_version = state.applied_version()?;
        let applied_build_id = state.applied_build_id()?;
        self.log.info(&format!(
            "version check: local={applied_version} (buildId={}) remote={} (buildId={})",
            applied_build_id.as_deref().unwrap_or("-"),
            manifest.version,
            manifest.build_id.as_deref().unwrap_or("-")
        ));

        if update_available(&manifest, &applied_version, applied_build_id.as_deref()) {
            Ok(CheckOutcome::UpdateAvailable(manifest))
        } else {
            self.log.info("content is already up to date");
            Ok(CheckOutcome::UpToDate)
        }
    }
}
