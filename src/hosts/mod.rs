//! Hosts table entries for exposed previews
//!
//! Publishes a custom domain as a loopback alias. All edits are best-effort:
//! a missing privilege leaves the feature unavailable instead of failing the
//! preview.

mod error;
mod file;
mod manager;
#[cfg(test)]
mod tests;

pub use error::HostsFileError;
pub use file::{validate_hostname, ENTRY_MARKER};
pub use manager::{EntryOutcome, HostEntryManager};
