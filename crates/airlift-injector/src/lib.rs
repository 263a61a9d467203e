mod html;
mod view;

pub use html::{
    parse_entry_document, EntryDocument, HeadElement, HeadElementKind, ScriptElement,
};
pub use view::{HeadlessView, HostView, ResolvedScript};

use airlift_core::{ContentSlot, EventLog, FileStore};
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    Injected,
    MissingEntry,
    MissingContainer,
    ParseFailed,
    ScriptFailed,
}

impl InjectOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Injected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Injected => "injected",
            Self::MissingEntry => "missing-entry",
            Self::MissingContainer => "missing-container",
            Self::ParseFailed => "parse-failed",
            Self::ScriptFailed => "script-failed",
        }
    }
}

const PRESERVED_SCRIPT_ATTRIBUTES: [&str; 6] = [
    "type",
    "nomodule",
    "defer",
    "async",
    "crossorigin",
    "integrity",
];

pub struct ContentInjector<'a> {
    files: &'a dyn FileStore,
    view: &'a dyn HostView,
    log: &'a dyn EventLog,
}

impl<'a> ContentInjector<'a> {
    pub fn new(files: &'a dyn FileStore, view: &'a dyn HostView, log: &'a dyn EventLog) -> Self {
        Self { files, view, log }
    }

    pub fn inject(&self, slot: ContentSlot, container_id: &str) -> InjectOutcome {
        let entry_path = slot.entry_path();
        if !self.files.exists(&entry_path) {
            self.log
                .info(&format!("no entry document to inject: {entry_path}"));
            return InjectOutcome::MissingEntry;
        }

        let raw = match self.files.read(&entry_path) {
            Ok(raw) => raw,
            Err(err) => {
                self.log
                    .error(&format!("failed to read entry document: {err:#}"));
                return InjectOutcome::MissingEntry;
            }
        };
        let html = String::from_utf8_lossy(&raw).into_owned();

        let base = match self.base_url(&entry_path) {
            Ok(base) => base,
            Err(err) => {
                self.log
                    .error(&format!("failed to resolve slot base url: {err:#}"));
                return InjectOutcome::MissingEntry;
            }
        };

        if !self.view.container_exists(container_id) {
            self.log
                .warn(&format!("injection container not found: {container_id}"));
            return InjectOutcome::MissingContainer;
        }

        let doc = match parse_entry_document(&html) {
            Ok(doc) => doc,
            Err(err) => {
                self.log
                    .warn(&format!("entry document rejected: {err:#}"));
                return InjectOutcome::ParseFailed;
            }
        };

        self.log
            .info(&format!("injecting {entry_path} with base {base}"));
        self.view.set_base_href(&base);
        for element in &doc.head {
            self.view.append_head_element(&element.markup);
        }
        self.view.replace_container(container_id, &doc.body);

        for script in &doc.scripts {
            let resolved = resolve_script(slot, &base, script);
            match &resolved.src {
                Some(src) => self.log.info(&format!(
                    "attaching external script: {src}{}",
                    if resolved.module { " (module)" } else { "" }
                )),
                None => self.log.debug("attaching inline script"),
            }
            if let Err(err) = self.view.attach_script(container_id, &resolved) {
                self.log.error(&format!(
                    "script attach failed, aborting injection: {err:#}"
                ));
                return InjectOutcome::ScriptFailed;
            }
        }

        self.log
            .info(&format!("injection complete for slot {}", slot.dir_name()));
        InjectOutcome::Injected
    }

    fn base_url(&self, entry_path: &str) -> Result<String> {
        let uri = self.files.uri(entry_path)?;
        let converted = self.view.convert_file_url(&uri);
        Ok(converted
            .strip_suffix("index.html")
            .map(str::to_string)
            .unwrap_or(converted))
    }
}

fn resolve_script(slot: ContentSlot, base: &str, script: &ScriptElement) -> ResolvedScript {
    let (src, store_path) = match &script.src {
        None => (None, None),
        Some(raw) if is_remote(raw) => (Some(raw.clone()), None),
        Some(raw) => {
            let trimmed = raw
                .trim_start_matches("./")
                .trim_start_matches('/')
                .to_string();
            (
                Some(format!("{base}{trimmed}")),
                Some(format!("{}/{trimmed}", slot.dir_name())),
            )
        }
    };

    let attributes = script
        .attributes
        .iter()
        .filter(|(name, _)| PRESERVED_SCRIPT_ATTRIBUTES.contains(&name.as_str()))
        .cloned()
        .collect();

    ResolvedScript {
        src,
        store_path,
        text: script.text.clone(),
        module: script.is_module(),
        attributes,
    }
}

fn is_remote(src: &str) -> bool {
    src.contains("://") || src.starts_with("//") || src.starts_with("data:")
}
