//! Run history store behavior against a real temporary directory.

use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use vne_agent::history::Store;
use vne_agent::{Finding, Results};

fn results_at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Results {
    let mut res = Results::default();
    res.when = Utc
        .with_ymd_and_hms(year, month, day, hour, min, sec)
        .unwrap();
    res.target_host = "1.1.1.1".to_string();
    res.classification = "Healthy".to_string();
    res
}

#[test]
fn save_uses_timestamp_ids_and_suffixes_collisions() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), 20);
    let res = results_at(2025, 3, 9, 14, 30, 0);

    let first = store.save(&res).unwrap();
    assert_eq!(first, "20250309-143000");

    let second = store.save(&res).unwrap();
    assert_eq!(second, "20250309-143000-01");

    let third = store.save(&res).unwrap();
    assert_eq!(third, "20250309-143000-02");
}

#[test]
fn cap_prunes_the_lexicographically_smallest_files() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), 20);

    for i in 0..25u32 {
        let res = results_at(2025, 1, 1, 0, i / 60, i % 60);
        store.save(&res).unwrap();
    }

    let mut files: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n.ends_with(".json"))
        .collect();
    files.sort();
    assert_eq!(files.len(), 20);
    // The five oldest (smallest names) are gone.
    assert_eq!(files[0], "20250101-000005.json");
}

#[test]
fn list_is_newest_first_with_metadata() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), 20);

    store.save(&results_at(2025, 1, 1, 10, 0, 0)).unwrap();
    store.save(&results_at(2025, 1, 2, 10, 0, 0)).unwrap();
    store.save(&results_at(2025, 1, 3, 10, 0, 0)).unwrap();

    let entries = store.list().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].id, "20250103-100000");
    assert_eq!(entries[2].id, "20250101-100000");
    assert_eq!(entries[0].target, "1.1.1.1");
    assert_eq!(entries[0].classification, "Healthy");
}

#[test]
fn list_on_a_missing_directory_is_empty() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path().join("never-created"), 20);
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn load_round_trips_the_full_record() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), 20);

    let mut res = results_at(2025, 6, 1, 12, 0, 0);
    res.findings = vec![Finding::medium("Packet loss to internet target (~8%).")];
    res.gw_loss_pct = "0%".to_string();
    let id = store.save(&res).unwrap();

    let loaded = store.load(&id).unwrap();
    assert_eq!(loaded.when, res.when);
    assert_eq!(loaded.findings, res.findings);
    assert_eq!(loaded.gw_loss_pct, "0%");
}

#[test]
fn update_overwrites_in_place_without_new_files() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), 20);

    let mut res = results_at(2025, 6, 1, 12, 0, 0);
    let id = store.save(&res).unwrap();

    res.findings = vec![Finding::info("FortiGate vendor pack completed.")];
    store.update(&id, &res).unwrap();

    let loaded = store.load(&id).unwrap();
    assert_eq!(loaded.findings.len(), 1);

    let count = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(count, 1);
}

#[test]
fn traversal_ids_are_rejected() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), 20);
    let res = results_at(2025, 6, 1, 12, 0, 0);

    assert!(store.update("../evil", &res).is_err());
    assert!(store.update("a/b", &res).is_err());
    assert!(store.update("a\\b", &res).is_err());
    assert!(store.load("..").is_err());
}

#[test]
fn missing_run_load_is_detectable_as_not_found() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), 20);
    let err = store.load("20990101-000000").unwrap_err();
    assert!(Store::is_missing(&err));
}
