pub mod aggregate;
pub mod export;
pub mod grade;
pub mod init;
pub mod list;
pub mod stats;
pub mod submissions;
pub mod validate;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use gradewise_core::gradebook::Gradebook;
use gradewise_core::parser::Dataset;
use gradewise_core::store::MemoryStore;
use gradewise_core::traits::StaticGroups;

/// A dataset file loaded into an in-memory store.
pub(crate) struct LoadedDataset {
    pub store: Arc<MemoryStore>,
    pub groups: Arc<StaticGroups>,
    group_table: HashMap<String, Vec<String>>,
}

impl LoadedDataset {
    pub async fn load(path: &Path) -> Result<Self> {
        let dataset = Dataset::load(path)?;
        let group_table = dataset.groups.clone();
        let (store, groups) = dataset.into_store().await?;
        Ok(Self {
            store: Arc::new(store),
            groups: Arc::new(groups),
            group_table,
        })
    }

    pub fn gradebook(&self) -> Gradebook {
        Gradebook::new(self.store.clone(), self.groups.clone())
    }

    /// Write the store's current records back to `path`.
    pub async fn save(&self, path: &Path) -> Result<()> {
        Dataset::from_store(&self.store, self.group_table.clone())
            .await
            .save(path)
    }
}
