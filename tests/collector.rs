mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chat_archive_collector::{
    archive::{read_archive, write_archive},
    collector::{
        PartitionOutcome,
        runner::{CollectError, Collector},
    },
    config::CollectorConfig,
    schema::NormalizedRecord,
};

use common::{BASE_SECS, FakeSource, item, test_config};

const GUILD: u64 = 468_638_089_359_785_984;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_more_than_capacity_fetchers_at_once() {
    let mut source = FakeSource::new().with_delay(Duration::from_millis(20));
    for id in 1..=25 {
        source = source.with_channel(id, &format!("chan{id}"), 3);
    }
    let source = Arc::new(source);
    let collector = Collector::new(source.clone(), test_config());

    let outcomes = collector.collect(GUILD).await.unwrap();

    assert_eq!(outcomes.len(), 25);
    assert!(outcomes.iter().all(|o| !o.is_failed()));
    assert_eq!(collector.gate().capacity(), 10);
    assert_eq!(collector.gate().peak(), 10);
    assert!(source.peak_in_flight() <= 10);
    assert_eq!(collector.gate().in_use(), 0);
}

#[tokio::test]
async fn only_text_channels_are_fetched() {
    let source = Arc::new(
        FakeSource::new()
            .with_channel(1, "general", 4)
            .with_voice(2, "lounge"),
    );
    let collector = Collector::new(source.clone(), test_config());

    let outcomes = collector.collect(GUILD).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].partition().name, "general");
    assert_eq!(source.calls(2), 0);
}

#[tokio::test]
async fn run_writes_globally_ordered_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("message_history.json");

    // Interleaved timestamps across two channels
    let source = Arc::new(
        FakeSource::new()
            .with_items(1, "general", vec![item(10, 1, BASE_SECS), item(12, 1, BASE_SECS + 2)])
            .with_items(2, "memes", vec![item(11, 2, BASE_SECS + 1), item(13, 2, BASE_SECS + 2)]),
    );
    let collector = Collector::new(source, test_config());

    let report = collector.run(GUILD, &path).await.unwrap();
    assert_eq!(report.records, 4);
    assert_eq!(report.collected, 2);
    assert!(report.failures.is_empty());

    let records = read_archive(&path).unwrap();
    let ids: Vec<u64> = records.iter().map(|r| r.msg_id).collect();
    assert_eq!(ids, vec![10, 11, 12, 13]);
    assert_eq!(records[0].time, BASE_SECS - 25_200);
    assert_eq!(records[0].channel, "general");
    assert_eq!(records[1].channel, "memes");
    assert_eq!(records[1].channel_id, 2);
}

#[tokio::test]
async fn failed_channel_is_reported_apart_from_empty_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("message_history.json");

    let source = Arc::new(
        FakeSource::new()
            .with_channel(1, "general", 3)
            .with_channel(2, "quiet", 0)
            .with_channel(3, "staff", 3)
            .forbid(3),
    );
    let collector = Collector::new(source, test_config());

    let report = collector.run(GUILD, &path).await.unwrap();

    assert_eq!(report.partitions, 3);
    assert_eq!(report.collected, 1);
    assert_eq!(report.empty, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].partition, "staff");
    assert!(report.failures[0].reason.contains("permission"));

    // Siblings still archived
    assert_eq!(read_archive(&path).unwrap().len(), 3);
    assert!(report.to_string().contains("staff"));
}

#[tokio::test]
async fn strict_mode_keeps_previous_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("message_history.json");
    let previous = vec![NormalizedRecord {
        author: "old".into(),
        author_id: 1,
        content: "from last run".into(),
        channel: "general".into(),
        channel_id: 1,
        msg_id: 1,
        time: 0,
    }];
    write_archive(&path, &previous).unwrap();
    let before = fs::read_to_string(&path).unwrap();

    let source = Arc::new(
        FakeSource::new()
            .with_channel(1, "general", 3)
            .with_channel(2, "staff", 3)
            .forbid(2),
    );
    let cfg = CollectorConfig { fail_on_partition_error: true, ..test_config() };
    let collector = Collector::new(source, cfg);

    match collector.run(GUILD, &path).await {
        Err(CollectError::PartitionsFailed(failures)) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].partition_id, 2);
        }
        other => panic!("expected PartitionsFailed, got {other:?}"),
    }
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[tokio::test]
async fn empty_server_yields_empty_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("message_history.json");
    let collector = Collector::new(Arc::new(FakeSource::new()), test_config());

    let report = collector.run(GUILD, &path).await.unwrap();

    assert_eq!(report.partitions, 0);
    assert_eq!(report.records, 0);
    assert_eq!(fs::read_to_string(&path).unwrap(), "");
}

#[tokio::test]
async fn listing_failure_is_fatal_to_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("message_history.json");
    let collector = Collector::new(Arc::new(FakeSource::new().fail_listing()), test_config());

    let err = collector.run(GUILD, &path).await.unwrap_err();

    assert!(matches!(err, CollectError::ListPartitions(_)));
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_runs_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("message_history.json");

    let source = Arc::new(
        FakeSource::new()
            .with_channel(1, "general", 2)
            .with_delay(Duration::from_millis(200)),
    );
    let collector = Arc::new(Collector::new(source, test_config()));

    let first = tokio::spawn({
        let collector = collector.clone();
        let path = path.clone();
        async move { collector.run(GUILD, &path).await }
    });

    while collector.gate().in_use() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = collector.run(GUILD, &path).await;
    assert!(matches!(second, Err(CollectError::AlreadyRunning)));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.records, 2);
}

#[tokio::test]
async fn dropping_the_run_releases_every_slot() {
    let mut source = FakeSource::new().with_delay(Duration::from_secs(3600));
    for id in 1..=12 {
        source = source.with_channel(id, &format!("chan{id}"), 1);
    }
    let collector = Collector::new(Arc::new(source), test_config());

    let outcome = tokio::time::timeout(Duration::from_millis(100), collector.collect(GUILD)).await;
    assert!(outcome.is_err());

    // Aborted tasks drop their slots once the runtime polls them
    for _ in 0..100 {
        if collector.gate().in_use() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(collector.gate().in_use(), 0);
}

#[test]
fn outcome_accessors() {
    let outcome = PartitionOutcome::Collected {
        partition: chat_archive_collector::schema::Partition {
            id: 5,
            name: "x".into(),
            kind: chat_archive_collector::schema::PartitionKind::Text,
        },
        items: vec![],
    };
    assert!(!outcome.is_failed());
    assert_eq!(outcome.partition().id, 5);
}
