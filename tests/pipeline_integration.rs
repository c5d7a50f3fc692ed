//! Integration tests for the pipeline coordinator.
//!
//! Streams are served by wiremock and merges are done by [`support::CopyMerger`],
//! so these tests need neither network access nor ffmpeg.

mod support;

use std::sync::Arc;
use std::time::Duration;

use mediabatch_core::{FailureKind, HttpClient, ItemId, PipelineCoordinator};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use support::socket_guard::start_mock_server_or_skip;
use support::{
    CopyMerger, audio_body, config, entry, file_count, mount_failing_item, mount_item,
    mount_item_with_delay, source, video_body,
};

#[tokio::test]
async fn test_fetch_failure_is_isolated_to_its_item() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_item(&server, "ep1").await;
    mount_failing_item(&server, "ep2", 500).await;
    mount_item(&server, "ep3").await;
    let dir = TempDir::new().unwrap();

    let merger = Arc::new(CopyMerger::new());
    let coordinator = PipelineCoordinator::new(
        config(dir.path(), 2, 1),
        HttpClient::new().unwrap(),
        source(vec![
            entry(&server, "ep1", "First"),
            entry(&server, "ep2", "Second"),
            entry(&server, "ep3", "Third"),
        ]),
        merger.clone(),
    );

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.summary.total(), 3);
    assert_eq!(report.summary.success_count(), 2);
    assert_eq!(report.summary.failure_count(), 1);
    assert!(!report.cancelled);

    let failed = &report.summary.failures[0];
    assert_eq!(failed.item_id, ItemId::from("ep2"));
    assert_eq!(failed.index, 2);
    assert_eq!(failed.kind, FailureKind::Download);

    let first = dir.path().join("out").join("1.First.mp4");
    let mut expected = video_body("ep1");
    expected.extend(audio_body("ep1"));
    assert_eq!(std::fs::read(&first).unwrap(), expected);
    assert!(dir.path().join("out").join("3.Third.mp4").exists());
    assert!(!dir.path().join("out").join("2.Second.mp4").exists());

    let mut merged = merger.merged_ids();
    merged.sort();
    assert_eq!(merged, vec!["ep1".to_string(), "ep3".to_string()]);
}

#[tokio::test]
async fn test_merge_failure_removes_partial_output() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    for id in ["a", "b", "c"] {
        mount_item(&server, id).await;
    }
    let dir = TempDir::new().unwrap();

    let coordinator = PipelineCoordinator::new(
        config(dir.path(), 1, 2),
        HttpClient::new().unwrap(),
        source(vec![
            entry(&server, "a", "Alpha"),
            entry(&server, "b", "Beta"),
            entry(&server, "c", "Gamma"),
        ]),
        Arc::new(CopyMerger::new().failing_for(&["a"])),
    );

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.summary.total(), 3);
    assert_eq!(report.summary.success_count(), 2);
    assert_eq!(report.summary.failure_count(), 1);
    let failed = &report.summary.failures[0];
    assert_eq!(failed.item_id, ItemId::from("a"));
    assert_eq!(failed.index, 1);
    assert_eq!(failed.kind, FailureKind::Merge);
    assert!(failed.reason.contains("simulated merge failure"));

    let out = dir.path().join("out");
    assert!(!out.join("1.Alpha.mp4").exists());
    assert!(out.join("2.Beta.mp4").exists());
    assert!(out.join("3.Gamma.mp4").exists());
    assert_eq!(file_count(&out.join("temp")), 0);
    assert_eq!(report.merge_stats.failed, 1);
    assert_eq!(report.merge_stats.succeeded, 2);
}

#[tokio::test]
async fn test_every_item_gets_exactly_one_outcome() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    for id in ["i1", "i2", "i4", "i5"] {
        mount_item(&server, id).await;
    }
    mount_failing_item(&server, "i3", 404).await;
    mount_failing_item(&server, "i6", 503).await;

    for (download, merge) in [(1, 1), (2, 1), (1, 3), (4, 2), (6, 6)] {
        let dir = TempDir::new().unwrap();
        let coordinator = PipelineCoordinator::new(
            config(dir.path(), download, merge),
            HttpClient::new().unwrap(),
            source(
                ["i1", "i2", "i3", "i4", "i5", "i6"]
                    .iter()
                    .map(|id| entry(&server, id, id))
                    .collect(),
            ),
            Arc::new(CopyMerger::new().failing_for(&["i5"])),
        );

        let report = coordinator.run().await.unwrap();
        let summary = &report.summary;
        assert_eq!(summary.total(), 6, "B_d={download} B_m={merge}");
        assert_eq!(summary.success_count(), 3, "B_d={download} B_m={merge}");
        assert_eq!(summary.failure_count(), 3, "B_d={download} B_m={merge}");
        assert_eq!(
            summary.success_count() + summary.failure_count(),
            summary.total()
        );
        let indices: Vec<usize> = summary.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(file_count(&dir.path().join("out")), 3);
    }
}

#[tokio::test]
async fn test_concurrency_bounds_are_respected() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let ids = ["p1", "p2", "p3", "p4", "p5", "p6"];
    for id in ids {
        mount_item_with_delay(&server, id, Duration::from_millis(50)).await;
    }
    let dir = TempDir::new().unwrap();
    let merger = Arc::new(CopyMerger::new().with_delay(Duration::from_millis(50)));

    let coordinator = PipelineCoordinator::new(
        config(dir.path(), 2, 1),
        HttpClient::new().unwrap(),
        source(ids.iter().map(|id| entry(&server, id, id)).collect()),
        merger.clone(),
    );

    let report = coordinator.run().await.unwrap();

    assert!(report.summary.is_complete_success());
    assert_eq!(report.download_concurrency, 2);
    assert_eq!(report.merge_concurrency, 1);
    assert!(report.peak_fetching <= 2, "peak fetching {}", report.peak_fetching);
    assert!(report.peak_gate <= 2, "peak gate {}", report.peak_gate);
    assert_eq!(merger.peak_active(), 1);
    assert_eq!(report.merge_stats.peak_active, 1);
}

#[tokio::test]
async fn test_bounds_are_clamped_to_item_count() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_item(&server, "only").await;
    let dir = TempDir::new().unwrap();

    let coordinator = PipelineCoordinator::new(
        config(dir.path(), 16, 8),
        HttpClient::new().unwrap(),
        source(vec![entry(&server, "only", "Only")]),
        Arc::new(CopyMerger::new()),
    );

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.download_concurrency, 1);
    assert_eq!(report.merge_concurrency, 1);
    assert!(report.summary.is_complete_success());
}

#[tokio::test]
async fn test_temp_files_are_removed_after_run() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_item(&server, "ok").await;
    mount_failing_item(&server, "gone", 410).await;
    mount_item(&server, "broken").await;
    let dir = TempDir::new().unwrap();

    let coordinator = PipelineCoordinator::new(
        config(dir.path(), 3, 2),
        HttpClient::new().unwrap(),
        source(vec![
            entry(&server, "ok", "Ok"),
            entry(&server, "gone", "Gone"),
            entry(&server, "broken", "Broken"),
        ]),
        Arc::new(CopyMerger::new().failing_for(&["broken"])),
    );

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.summary.success_count(), 1);

    let temp_dir = dir.path().join("out").join("temp");
    assert!(temp_dir.is_dir());
    assert_eq!(file_count(&temp_dir), 0);
    assert_eq!(file_count(&dir.path().join("out")), 1);
}

#[tokio::test]
async fn test_interrupt_stops_admission_and_cleans_up() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    for id in ["slow1", "slow2", "slow3"] {
        mount_item_with_delay(&server, id, Duration::from_secs(3)).await;
    }
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    let coordinator = PipelineCoordinator::new(
        config(dir.path(), 1, 1),
        HttpClient::new().unwrap(),
        source(
            ["slow1", "slow2", "slow3"]
                .iter()
                .map(|id| entry(&server, id, id))
                .collect(),
        ),
        Arc::new(CopyMerger::new()),
    )
    .with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
        .await
        .unwrap()
        .unwrap();
    trigger.await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.summary.total(), 3);
    assert_eq!(report.summary.success_count(), 0);
    assert!(
        report
            .summary
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::Cancelled)
    );
    assert_eq!(file_count(&dir.path().join("out").join("temp")), 0);
    assert_eq!(file_count(&dir.path().join("out")), 0);
}

#[tokio::test]
async fn test_unreachable_stream_location_fails_item() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_item(&server, "fine").await;
    let dir = TempDir::new().unwrap();
    let mut bad = entry(&server, "bad", "Bad");
    bad.video_url = "not a url".to_string();

    let coordinator = PipelineCoordinator::new(
        config(dir.path(), 2, 1),
        HttpClient::new().unwrap(),
        source(vec![entry(&server, "fine", "Fine"), bad]),
        Arc::new(CopyMerger::new()),
    );

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.summary.success_count(), 1);
    let failed = &report.summary.failures[0];
    assert_eq!(failed.item_id, ItemId::from("bad"));
    assert_eq!(failed.kind, FailureKind::Source);
}
