// File-backed key/value store
// Author: kelexine (https://github.com/kelexine)

use super::KeyValueStore;
use crate::error::{PortalError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// JSON map on disk, mirrored in memory.
///
/// Reads are served from memory; every write rewrites the file through a
/// temporary sibling and a rename, so a crash never leaves half a file.
/// Memory only changes once the write has landed on disk.
/// On unix the file is kept at 0600.
pub struct FileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file starts empty. An unreadable or malformed file is
    /// logged and also starts empty; it is replaced on the next write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = Self::load(&path);

        debug!("Opened storage at {} ({} keys)", path.display(), values.len());

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> BTreeMap<String, String> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("Failed to read storage {}: {}", path.display(), e);
                return BTreeMap::new();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(
                "Storage file {} is not a JSON string map, starting empty: {}",
                path.display(),
                e
            );
            BTreeMap::new()
        })
    }

    /// Serializes and writes the map back to disk.
    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(values)
            .map_err(|e| PortalError::Storage(format!("Serialization failure: {}", e)))?;

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(|e| {
                PortalError::Storage(format!("Failed to create {}: {}", tmp.display(), e))
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
            }

            file.write_all(json.as_bytes())
                .map_err(|e| PortalError::Storage(format!("Disk write failure: {}", e)))?;
            file.sync_all()?;
        }

        fs::rename(&tmp, &self.path).map_err(|e| {
            PortalError::Storage(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write();
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.write();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}
