use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub name: String,
    pub kind: StoreEntryKind,
}

pub trait FileStore: Send + Sync {
    fn exists(&self, path: &str) -> bool;
    fn read(&self, path: &str) -> Result<Vec<u8>>;
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;
    fn remove_tree(&self, path: &str) -> Result<()>;
    fn list(&self, path: &str) -> Result<Vec<StoreEntry>>;
    fn uri(&self, path: &str) -> Result<String>;
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

pub fn copy_tree(store: &dyn FileStore, src: &str, dst: &str) -> Result<()> {
    for entry in store.list(src)? {
        let src_path = format!("{src}/{}", entry.name);
        let dst_path = format!("{dst}/{}", entry.name);
        match entry.kind {
            StoreEntryKind::Directory => copy_tree(store, &src_path, &dst_path)?,
            StoreEntryKind::File => {
                let data = store.read(&src_path)?;
                store.write(&dst_path, &data)?;
            }
        }
    }
    Ok(())
}
