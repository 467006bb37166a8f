//! Line-level edits of the OS hosts table
//!
//! Entries are whole lines keyed by hostname and always map to loopback.
//! Every other line, comments included, is preserved byte-for-byte.

use std::fmt::Write;
use std::net::IpAddr;
use std::path::Path;

use super::error::HostsFileError;

/// Marker appended to lines this crate writes
pub const ENTRY_MARKER: &str = "# added by preview-server";

/// Reject names that would corrupt the table
pub fn validate_hostname(hostname: &str) -> Result<(), HostsFileError> {
    let valid = !hostname.is_empty()
        && hostname.len() <= 253
        && !hostname.contains('#')
        && !hostname.chars().any(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(HostsFileError::InvalidHostname {
            hostname: hostname.to_string(),
        })
    }
}

/// Address and names of a non-comment line
fn parse_line(line: &str) -> Option<(IpAddr, Vec<&str>)> {
    let content = line.split('#').next().unwrap_or_default();
    let mut fields = content.split_whitespace();
    let address = fields.next()?.parse().ok()?;
    Some((address, fields.collect()))
}

/// Whether any loopback line already names `hostname`
pub fn has_loopback_entry(contents: &str, hostname: &str) -> bool {
    contents.lines().any(|line| match parse_line(line) {
        Some((address, names)) => {
            address.is_loopback() && names.iter().any(|n| n.eq_ignore_ascii_case(hostname))
        }
        None => false,
    })
}

/// Append a loopback line for `hostname`
pub fn with_entry(contents: &str, hostname: &str) -> String {
    let mut updated = contents.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    // Writing into a String cannot fail.
    let _ = writeln!(updated, "127.0.0.1\t{}\t{}", hostname, ENTRY_MARKER);
    updated
}

/// Drop loopback lines whose only name is `hostname`
///
/// Returns `None` when nothing matched.
pub fn without_entry(contents: &str, hostname: &str) -> Option<String> {
    let mut removed = false;
    let kept: Vec<&str> = contents
        .split_inclusive('\n')
        .filter(|line| {
            let matches = matches!(
                parse_line(line),
                Some((address, names))
                    if address.is_loopback()
                        && names.len() == 1
                        && names[0].eq_ignore_ascii_case(hostname)
            );
            removed |= matches;
            !matches
        })
        .collect();

    removed.then(|| kept.concat())
}

pub fn read(path: &Path) -> Result<String, HostsFileError> {
    std::fs::read_to_string(path).map_err(|e| HostsFileError::from_io(path, e))
}

/// Rewrite the table in place
///
/// The hosts file may be a bind mount or carry OS-managed attributes, so it is
/// overwritten rather than replaced by rename.
pub fn write(path: &Path, contents: &str) -> Result<(), HostsFileError> {
    std::fs::write(path, contents).map_err(|e| HostsFileError::from_io(path, e))
}
