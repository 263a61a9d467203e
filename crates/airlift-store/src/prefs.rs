use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use airlift_core::KeyValueStore;
use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone)]
pub struct PrefsStore {
    path: PathBuf,
}

impl PrefsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read preferences file: {}", self.path.display())
                });
            }
        };

        let mut entries = BTreeMap::new();
        for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(entries)
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut payload = String::new();
        for (key, value) in entries {
            payload.push_str(&format!("{key}={value}\n"));
        }
        fs::write(&self.path, payload.as_bytes()).with_context(|| {
            format!("failed to write preferences file: {}", self.path.display())
        })
    }
}

impl KeyValueStore for PrefsStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() || key.contains('=') || key.contains('\n') {
            return Err(anyhow!("invalid preference key: {key}"));
        }
        if value.contains('\n') {
            return Err(anyhow!("preference value must be a single line: {key}"));
        }

        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.load()?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.save(&entries)
    }
}

#[cfg(test)]
mod tests {
    use airlift_core::KeyValueStore;
    use std::fs;

    use super::PrefsStore;

    fn test_prefs() -> PrefsStore {
        let mut path = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        path.push(format!(
            "airlift-prefs-tests-{}-{}",
            std::process::id(),
            nanos
        ));
        path.push("prefs");
        PrefsStore::new(path)
    }

    fn cleanup(prefs: &PrefsStore) {
        if let Some(parent) = prefs.path().parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn get_returns_none_before_first_write() {
        let prefs = test_prefs();
        assert!(prefs.get("appliedVersion").expect("must read").is_none());
        cleanup(&prefs);
    }

    #[test]
    fn set_get_remove_round_trip() {
        let prefs = test_prefs();

        prefs.set("appliedVersion", "1.0.0").expect("must set");
        prefs.set("appliedBuildId", "b-1").expect("must set");
        assert_eq!(
            prefs.get("appliedVersion").expect("must read").as_deref(),
            Some("1.0.0")
        );

        prefs.set("appliedVersion", "1.1.0").expect("must overwrite");
        assert_eq!(
            prefs.get("appliedVersion").expect("must read").as_deref(),
            Some("1.1.0")
        );

        prefs.remove("appliedVersion").expect("must remove");
        assert!(prefs.get("appliedVersion").expect("must read").is_none());
        assert_eq!(
            prefs.get("appliedBuildId").expect("must read").as_deref(),
            Some("b-1")
        );

        cleanup(&prefs);
    }

    #[test]
    fn remove_missing_key_is_a_no_op() {
        let prefs = test_prefs();
        prefs.remove("missing").expect("must tolerate missing");
        cleanup(&prefs);
    }

    #[test]
    fn values_may_contain_equals_signs() {
        let prefs = test_prefs();
        prefs.set("token", "a=b=c").expect("must set");
        assert_eq!(
            prefs.get("token").expect("must read").as_deref(),
            Some("a=b=c")
        );
        cleanup(&prefs);
    }

    #[test]
    fn rejects_keys_and_values_that_break_the_record_format() {
        let prefs = test_prefs();
        assert!(prefs.set("bad=key", "x").is_err());
        assert!(prefs.set("", "x").is_err());
        assert!(prefs.set("key", "multi\nline").is_err());
        cleanup(&prefs);
    }

    #[test]
    fn malformed_lines_are_skipped_on_load() {
        let prefs = test_prefs();
        prefs.set("appliedVersion", "1.0.0").expect("must set");

        let mut raw = fs::read_to_string(prefs.path()).expect("must read raw");
        raw.push_str("garbage line without separator\n");
        fs::write(prefs.path(), raw).expect("must rewrite");

        assert_eq!(
            prefs.get("appliedVersion").expect("must read").as_deref(),
            Some("1.0.0")
        );
        cleanup(&prefs);
    }
}
