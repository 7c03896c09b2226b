use anyhow::{Context, Result};
use price_field_core::LocationTable;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Claim locations persisted between runs as a JSON object keyed by claim id.
pub struct LocationCache {
    table: LocationTable,
    file_path: PathBuf,
    loaded_len: usize,
}

impl LocationCache {
    /// Load the cache, starting empty if the file is missing or unreadable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let file_path = path.as_ref().to_path_buf();
        let table = match Self::read(&file_path) {
            Ok(Some(table)) => {
                info!(claims = table.len(), "loaded saved claim locations");
                table
            }
            Ok(None) => {
                debug!("location cache {:?} not found, starting empty", file_path);
                LocationTable::new()
            }
            Err(e) => {
                warn!("unable to load saved claim locations: {e:#}");
                LocationTable::new()
            }
        };
        let loaded_len = table.len();
        Self {
            table,
            file_path,
            loaded_len,
        }
    }

    fn read(path: &Path) -> Result<Option<LocationTable>> {
        if !path.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let table = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(table))
    }

    pub fn table_mut(&mut self) -> &mut LocationTable {
        &mut self.table
    }

    /// Write the table back if it gained entries since loading.
    pub fn save(&mut self) -> Result<()> {
        if self.table.len() == self.loaded_len {
            debug!("location cache unchanged, skipping save");
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&self.table)?;
        fs::write(&self.file_path, json)
            .with_context(|| format!("writing {}", self.file_path.display()))?;
        info!(claims = self.table.len(), "saved claim locations");
        self.loaded_len = self.table.len();
        Ok(())
    }
}
