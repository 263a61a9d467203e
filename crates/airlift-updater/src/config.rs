use airlift_core::FileStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH: &str = "config.json";
pub const DEFAULT_CONTAINER_ID: &str = "localAppContainer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateMode {
    Immediate,
    OnNextBoot,
}

impl UpdateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::OnNextBoot => "on-next-boot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateConfig {
    pub manifest_url: String,
    pub bundle_url: String,
    pub container_id: String,
    pub mode: UpdateMode,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            manifest_url: String::new(),
            bundle_url: String::new(),
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            mode: UpdateMode::Immediate,
        }
    }
}

pub fn load_config(store: &dyn FileStore) -> Result<UpdateConfig> {
    if !store.exists(CONFIG_PATH) {
        return Ok(UpdateConfig::default());
    }
    let raw = store.read(CONFIG_PATH)?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse update config: {CONFIG_PATH}"))
}
