use super::file::{has_loopback_entry, with_entry, without_entry};
use super::*;

const SYSTEM_TABLE: &str = "\
# static table lookup for hostnames
127.0.0.1\tlocalhost
::1\tlocalhost ip6-localhost
192.168.1.20\tnas.lan
";

fn hosts_fixture(contents: &str) -> (tempfile::TempDir, HostEntryManager) {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("hosts");
    std::fs::write(&path, contents).unwrap();
    let manager = HostEntryManager::new(path);
    (dir, manager)
}

fn read(manager: &HostEntryManager) -> String {
    std::fs::read_to_string(manager.hosts_file()).unwrap()
}

// ============================================================================
// Line edits
// ============================================================================

#[test]
fn test_presence_requires_loopback_address() {
    assert!(has_loopback_entry(SYSTEM_TABLE, "localhost"));
    assert!(has_loopback_entry(SYSTEM_TABLE, "ip6-localhost"));
    assert!(!has_loopback_entry(SYSTEM_TABLE, "nas.lan"));
    assert!(!has_loopback_entry(SYSTEM_TABLE, "hostnames"));
}

#[test]
fn test_with_entry_appends_marked_line() {
    let updated = with_entry("127.0.0.1\tlocalhost", "preview.test");
    assert_eq!(
        updated,
        format!("127.0.0.1\tlocalhost\n127.0.0.1\tpreview.test\t{}\n", ENTRY_MARKER)
    );
}

#[test]
fn test_without_entry_preserves_other_lines() {
    let with = with_entry(SYSTEM_TABLE, "preview.test");
    assert_eq!(without_entry(&with, "preview.test").unwrap(), SYSTEM_TABLE);
    assert!(without_entry(SYSTEM_TABLE, "preview.test").is_none());
}

#[test]
fn test_without_entry_leaves_shared_lines() {
    let table = "127.0.0.1\tlocalhost preview.test\n";
    assert!(without_entry(table, "preview.test").is_none());
}

#[test]
fn test_hostname_validation() {
    assert!(validate_hostname("preview.test").is_ok());
    assert!(validate_hostname("").is_err());
    assert!(validate_hostname("bad host").is_err());
    assert!(validate_hostname("evil#comment").is_err());
    assert!(validate_hostname("two\nlines").is_err());
}

// ============================================================================
// Manager
// ============================================================================

#[test]
fn test_add_records_auto_added() {
    let (_dir, manager) = hosts_fixture(SYSTEM_TABLE);

    assert_eq!(manager.add_entry("preview.test"), EntryOutcome::Added);
    assert!(manager.was_auto_added("preview.test"));
    assert!(has_loopback_entry(&read(&manager), "preview.test"));

    // Second add finds the line it wrote
    assert_eq!(manager.add_entry("preview.test"), EntryOutcome::AlreadyPresent);
    assert_eq!(read(&manager).matches("preview.test").count(), 1);
}

#[test]
fn test_pre_existing_entry_not_tracked() {
    let (_dir, manager) = hosts_fixture(SYSTEM_TABLE);

    assert_eq!(manager.add_entry("localhost"), EntryOutcome::AlreadyPresent);
    assert!(!manager.was_auto_added("localhost"));

    manager.remove_all();
    assert_eq!(read(&manager), SYSTEM_TABLE);
}

#[test]
fn test_add_failure_is_logged_not_raised() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = HostEntryManager::new(dir.path().join("missing").join("hosts"));

    assert_eq!(manager.add_entry("preview.test"), EntryOutcome::Failed);
    assert!(!manager.was_auto_added("preview.test"));
    assert!(manager.auto_added().is_empty());
}

#[test]
fn test_invalid_hostname_is_not_written() {
    let (_dir, manager) = hosts_fixture(SYSTEM_TABLE);

    assert_eq!(manager.add_entry("bad host"), EntryOutcome::Failed);
    assert_eq!(read(&manager), SYSTEM_TABLE);
}

#[test]
fn test_remove_entry_drops_tracking() {
    let (_dir, manager) = hosts_fixture(SYSTEM_TABLE);
    manager.add_entry("preview.test");

    assert!(manager.remove_entry("preview.test"));
    assert!(!manager.was_auto_added("preview.test"));
    assert_eq!(read(&manager), SYSTEM_TABLE);

    // Absent entries are a successful no-op
    assert!(manager.remove_entry("preview.test"));
}

#[test]
fn test_remove_all_restores_table() {
    let (_dir, manager) = hosts_fixture(SYSTEM_TABLE);
    manager.add_entry("a.test");
    manager.add_entry("b.test");
    assert_eq!(manager.auto_added(), vec!["a.test", "b.test"]);

    manager.remove_all();

    assert!(manager.auto_added().is_empty());
    assert_eq!(read(&manager), SYSTEM_TABLE);
}

#[test]
fn test_remove_all_clears_set_when_file_vanishes() {
    let (_dir, manager) = hosts_fixture(SYSTEM_TABLE);
    manager.add_entry("preview.test");
    std::fs::remove_file(manager.hosts_file()).unwrap();

    manager.remove_all();

    assert!(!manager.was_auto_added("preview.test"));
}

#[test]
fn test_hostnames_compare_case_insensitively() {
    let (_dir, manager) = hosts_fixture(SYSTEM_TABLE);
    manager.add_entry("Preview.Test");

    assert!(manager.was_auto_added("preview.test"));
    assert_eq!(manager.add_entry("PREVIEW.TEST"), EntryOutcome::AlreadyPresent);
}
