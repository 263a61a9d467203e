use std::sync::Mutex;

use airlift_core::FileStore;
use anyhow::{anyhow, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScript {
    pub src: Option<String>,
    pub store_path: Option<String>,
    pub text: String,
    pub module: bool,
    pub attributes: Vec<(String, String)>,
}

pub trait HostView {
    fn convert_file_url(&self, store_url: &str) -> String;
    fn container_exists(&self, container_id: &str) -> bool;
    fn set_base_href(&self, href: &str);
    fn append_head_element(&self, markup: &str);
    fn replace_container(&self, container_id: &str, body: &str);
    fn attach_script(&self, container_id: &str, script: &ResolvedScript) -> Result<()>;
}

pub struct HeadlessView<'a> {
    files: &'a dyn FileStore,
    containers: Vec<String>,
    base_href: Mutex<Option<String>>,
    head: Mutex<Vec<String>>,
    container_html: Mutex<Vec<(String, String)>>,
    attached: Mutex<Vec<String>>,
}

impl<'a> HeadlessView<'a> {
    pub fn new(files: &'a dyn FileStore, container_ids: &[&str]) -> Self {
        Self {
            files,
            containers: container_ids.iter().map(|id| id.to_string()).collect(),
            base_href: Mutex::new(None),
            head: Mutex::new(Vec::new()),
            container_html: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
        }
    }

    pub fn base_href(&self) -> Option<String> {
        self.base_href.lock().ok().and_then(|href| href.clone())
    }

    pub fn head_elements(&self) -> Vec<String> {
        self.head
            .lock()
            .map(|head| head.clone())
            .unwrap_or_default()
    }

    pub fn container_html(&self, container_id: &str) -> Option<String> {
        self.container_html
            .lock()
            .ok()
            .and_then(|containers| {
                containers
                    .iter()
                    .find(|(id, _)| id == container_id)
                    .map(|(_, html)| html.clone())
            })
    }

    pub fn attached_scripts(&self) -> Vec<String> {
        self.attached
            .lock()
            .map(|attached| attached.clone())
            .unwrap_or_default()
    }
}

impl HostView for HeadlessView<'_> {
    fn convert_file_url(&self, store_url: &str) -> String {
        store_url.to_string()
    }

    fn container_exists(&self, container_id: &str) -> bool {
        self.containers.iter().any(|id| id == container_id)
    }

    fn set_base_href(&self, href: &str) {
        if let Ok(mut base_href) = self.base_href.lock() {
            *base_href = Some(href.to_string());
        }
    }

    fn append_head_element(&self, markup: &str) {
        if let Ok(mut head) = self.head.lock() {
            head.push(markup.to_string());
        }
    }

    fn replace_container(&self, container_id: &str, body: &str) {
        if let Ok(mut containers) = self.container_html.lock() {
            containers.retain(|(id, _)| id != container_id);
            containers.push((container_id.to_string(), body.to_string()));
        }
    }

    fn attach_script(&self, _container_id: &str, script: &ResolvedScript) -> Result<()> {
        if let Some(store_path) = &script.store_path {
            if !self.files.exists(store_path) {
                return Err(anyhow!("script resource missing from slot: {store_path}"));
            }
        }

        let mut attached = self
            .attached
            .lock()
            .map_err(|_| anyhow!("host view state is poisoned"))?;
        attached.push(
            script
                .src
                .clone()
                .unwrap_or_else(|| "inline".to_string()),
        );
        Ok(())
    }
}
