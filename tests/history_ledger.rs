mod common;
use common::tmp_dir;

use sshbot::services::config::HistorySettings;
use sshbot::services::history::HistoryLedger;
use sshbot::services::logger::Logger;
use sshbot::stores::file_history_store::HistoryRecord;
use std::path::PathBuf;
use std::sync::Arc;

const DAY: i64 = 86_400;
const NOW: i64 = 1_700_000_000;

fn ledger(path: PathBuf) -> HistoryLedger {
    HistoryLedger::new(
        Logger::new("test"),
        &HistorySettings {
            path: Some(path),
            ..HistorySettings::default()
        },
    )
}

#[test]
fn records_outside_retention_are_pruned() {
    let dir = tmp_dir("sshbot-history");
    let path = dir.join("history.json");
    let ledger = ledger(path.clone());

    ledger
        .append_at(HistoryRecord::new(1, "web", "uptime", NOW - 8 * DAY), NOW - 8 * DAY)
        .expect("append old");
    ledger
        .append_at(HistoryRecord::new(1, "db", "disk", NOW - 3600), NOW - 3600)
        .expect("append recent");

    let records = ledger.list_at(NOW);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].host, "db");

    let on_disk: Vec<HistoryRecord> =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
    assert_eq!(on_disk, records);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn appended_record_is_listed_last() {
    let dir = tmp_dir("sshbot-history");
    let ledger = ledger(dir.join("history.json"));
    ledger
        .append_at(HistoryRecord::new(1, "web", "uptime", NOW - 10), NOW - 10)
        .expect("append");
    ledger
        .append_at(HistoryRecord::new(2, "db", "disk", NOW), NOW)
        .expect("append");

    let records = ledger.list_at(NOW);
    assert_eq!(records.last(), Some(&HistoryRecord::new(2, "db", "disk", NOW)));
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn corrupt_file_reads_as_empty_and_is_replaced_on_append() {
    let dir = tmp_dir("sshbot-history");
    let path = dir.join("history.json");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(&path, "{ not json").expect("write");

    let ledger = ledger(path.clone());
    assert!(ledger.list_at(NOW).is_empty());
    ledger
        .append_at(HistoryRecord::new(1, "web", "uptime", NOW), NOW)
        .expect("append");
    assert_eq!(ledger.list_at(NOW).len(), 1);
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn concurrent_appends_are_not_lost() {
    let dir = tmp_dir("sshbot-history");
    let ledger = Arc::new(ledger(dir.join("history.json")));

    let mut handles = Vec::new();
    for i in 0..16 {
        let ledger = ledger.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            ledger.append_at(HistoryRecord::new(i, "web", "uptime", NOW), NOW)
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("append");
    }

    assert_eq!(ledger.list_at(NOW).len(), 16);
    let _ = std::fs::remove_dir_all(dir);
}
