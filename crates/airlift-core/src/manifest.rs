use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteManifest {
    pub version: String,
    #[serde(
        default,
        rename = "buildId",
        deserialize_with = "deserialize_build_id"
    )]
    pub build_id: Option<String>,
}

impl RemoteManifest {
    pub fn from_json(bytes: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(bytes).context("failed to parse remote manifest")
    }
}

fn deserialize_build_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(text)) => Ok(Some(text)),
        Some(serde_json::Value::Number(number)) => Ok(Some(number.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "buildId must be a string or a number, got: {other}"
        ))),
    }
}

pub fn update_available(
    remote: &RemoteManifest,
    applied_version: &str,
    applied_build_id: Option<&str>,
) -> bool {
    match remote.build_id.as_deref() {
        Some(remote_build_id) => applied_build_id != Some(remote_build_id),
        None => remote.version != applied_version,
    }
}
