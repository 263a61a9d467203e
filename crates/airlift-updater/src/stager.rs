use std::io::{Cursor, Read};

use airlift_core::{ContentSlot, EventLog, FileStore};
use anyhow::{anyhow, Context, Result};
use zip::ZipArchive;

pub fn stage_bundle(store: &dyn FileStore, log: &dyn EventLog, bytes: &[u8]) -> Result<usize> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).context("failed to open update bundle archive")?;

    let mut written = 0usize;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read bundle entry {index}"))?;
        if entry.is_dir() {
            continue;
        }

        let Some(relative) = sanitized_entry_path(entry.name()) else {
            return Err(anyhow!(
                "bundle entry escapes the staging slot: {}",
                entry.name()
            ));
        };

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to decompress bundle entry: {relative}"))?;

        let path = format!("{}/{relative}", ContentSlot::Staging.dir_name());
        store
            .write(&path, &data)
            .with_context(|| format!("failed to write staged file: {path}"))?;
        written += 1;
    }

    if written == 0 {
        return Err(anyhow!("update bundle contains no files"));
    }

    log.info(&format!("staged {written} files from update bundle"));
    Ok(written)
}

fn sanitized_entry_path(name: &str) -> Option<String> {
    let mut parts = Vec::new();
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return None,
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
