//! Best-effort hosts entries with scoped rollback

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::error::HostsFileError;
use super::file;
use crate::core::HostsConfig;

/// Result of an add request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// A line was written and the hostname recorded as auto-added
    Added,
    /// A loopback entry already existed; it is not ours to remove
    AlreadyPresent,
    /// The edit failed and was logged
    Failed,
}

/// Maps hostnames to loopback in the OS hosts table
///
/// Only hostnames written by this manager are tracked, so [`remove_all`]
/// never touches entries that pre-existed.
///
/// [`remove_all`]: HostEntryManager::remove_all
#[derive(Debug)]
pub struct HostEntryManager {
    hosts_file: PathBuf,
    auto_added: Mutex<BTreeSet<String>>,
}

impl HostEntryManager {
    pub fn new(hosts_file: impl Into<PathBuf>) -> Self {
        Self {
            hosts_file: hosts_file.into(),
            auto_added: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn from_config(config: &HostsConfig) -> Self {
        Self::new(config.hosts_file.clone())
    }

    pub fn hosts_file(&self) -> &Path {
        &self.hosts_file
    }

    /// Map `hostname` to 127.0.0.1; failures are logged, never returned
    pub fn add_entry(&self, hostname: &str) -> EntryOutcome {
        match self.try_add(hostname) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(hostname, error = %e, "Could not add hosts entry");
                EntryOutcome::Failed
            }
        }
    }

    fn try_add(&self, hostname: &str) -> Result<EntryOutcome, HostsFileError> {
        file::validate_hostname(hostname)?;
        let contents = file::read(&self.hosts_file)?;
        if file::has_loopback_entry(&contents, hostname) {
            tracing::debug!(hostname, "Hosts entry already present");
            return Ok(EntryOutcome::AlreadyPresent);
        }

        file::write(&self.hosts_file, &file::with_entry(&contents, hostname))?;
        self.auto_added.lock().insert(hostname.to_ascii_lowercase());
        tracing::info!(hostname, "Added hosts entry");
        Ok(EntryOutcome::Added)
    }

    /// Remove the loopback line for `hostname`; absent entries are a no-op.
    ///
    /// Returns `false` only when the table could not be edited.
    pub fn remove_entry(&self, hostname: &str) -> bool {
        match self.try_remove(hostname) {
            Ok(()) => {
                self.auto_added.lock().remove(&hostname.to_ascii_lowercase());
                true
            }
            Err(e) => {
                tracing::warn!(hostname, error = %e, "Could not remove hosts entry");
                false
            }
        }
    }

    fn try_remove(&self, hostname: &str) -> Result<(), HostsFileError> {
        let contents = file::read(&self.hosts_file)?;
        if let Some(updated) = file::without_entry(&contents, hostname) {
            file::write(&self.hosts_file, &updated)?;
            tracing::info!(hostname, "Removed hosts entry");
        }
        Ok(())
    }

    /// Remove every auto-added entry; the tracked set is cleared regardless
    pub fn remove_all(&self) {
        let snapshot = std::mem::take(&mut *self.auto_added.lock());
        for hostname in snapshot {
            if let Err(e) = self.try_remove(&hostname) {
                tracing::warn!(hostname = %hostname, error = %e, "Could not remove hosts entry");
            }
        }
    }

    pub fn was_auto_added(&self, hostname: &str) -> bool {
        self.auto_added.lock().contains(&hostname.to_ascii_lowercase())
    }

    pub fn auto_added(&self) -> Vec<String> {
        self.auto_added.lock().iter().cloned().collect()
    }
}
