//! End-to-end broadcast scenarios: detector → pipeline → hub → subscribers.

use courtview_core::{FrameEntry, PipelineState, RawDetection, StopReason};
use courtview_sim::{
    ScenarioId, ScenarioRunner, ScriptedDetector, SimConfig, SimSinkController, SimWorld, SyntheticDetector,
};
use proptest::prelude::*;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn world(buffer_capacity: usize) -> SimWorld {
    SimWorld::new(SimConfig {
        buffer_capacity,
        ..SimConfig::default()
    })
    .unwrap()
}

async fn collect_ids(controller: &mut SimSinkController, count: usize) -> Vec<u64> {
    tokio::time::timeout(WAIT, controller.collect(count))
        .await
        .unwrap()
        .iter()
        .map(|e| e.sequence_id)
        .collect()
}

/// Reads until the entry with `last` arrives.
async fn read_until(controller: &mut SimSinkController, last: u64) -> Vec<FrameEntry> {
    let mut entries = Vec::new();
    loop {
        let entry = tokio::time::timeout(WAIT, controller.recv_entry())
            .await
            .unwrap()
            .expect("subscriber dropped before the final entry");
        let done = entry.sequence_id == last;
        entries.push(entry);
        if done {
            return entries;
        }
    }
}

#[tokio::test]
async fn test_late_joiner_gets_tail_then_live() {
    let world = world(3);
    let mut pipeline = world.pipeline(ScriptedDetector::new().empty_frames(1, 8));

    for _ in 0..5 {
        pipeline.step().await;
    }
    let (_, mut late) = world.subscribe("late");
    assert_eq!(collect_ids(&mut late, 3).await, vec![3, 4, 5]);

    for _ in 0..3 {
        pipeline.step().await;
    }
    assert_eq!(collect_ids(&mut late, 3).await, vec![6, 7, 8]);
    assert!(late.drain().is_empty());
}

#[tokio::test]
async fn test_severed_subscriber_does_not_affect_others() {
    let world = world(10);
    let mut pipeline = world.pipeline(ScriptedDetector::new().empty_frames(1, 2));

    let (_, mut a) = world.subscribe("a");
    let (b_id, b) = world.subscribe("b");
    let (_, mut c) = world.subscribe("c");

    b.sever();
    pipeline.step().await;
    pipeline.step().await;

    assert_eq!(collect_ids(&mut a, 2).await, vec![1, 2]);
    assert_eq!(collect_ids(&mut c, 2).await, vec![1, 2]);
    assert!(world.wait_until_gone(b_id, 10_000).await);

    // The next subscriber enumerates only the healthy ones
    let (d_id, _d) = world.subscribe("d");
    let ids = world.hub().subscriber_ids();
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&b_id));
    assert!(ids.contains(&d_id));
    assert_eq!(world.hub().stats().subscribers_pruned, 1);
}

#[tokio::test]
async fn test_dropped_controller_is_pruned() {
    let world = world(10);
    let mut pipeline = world.pipeline(ScriptedDetector::new().empty_frames(1, 2));

    let (gone_id, gone) = world.subscribe("gone");
    drop(gone);
    pipeline.step().await;

    assert!(world.wait_until_gone(gone_id, 10_000).await);
    assert_eq!(world.hub().subscriber_count(), 0);
}

#[tokio::test]
async fn test_send_failure_mid_replay_prunes_without_retry() {
    let world = world(10);
    let mut pipeline = world.pipeline(ScriptedDetector::new().empty_frames(1, 6));
    for _ in 0..5 {
        pipeline.step().await;
    }

    let (flaky_id, mut flaky) = world.subscribe_with("flaky", |c| c.fail_after(2));
    let (steady_id, mut steady) = world.subscribe("steady");

    // Ends early: the connection closes once the hub drops it
    assert_eq!(collect_ids(&mut flaky, 5).await, vec![1, 2]);
    assert!(world.wait_until_gone(flaky_id, 10_000).await);
    assert_eq!(world.hub().stats().subscribers_pruned, 1);
    assert_eq!(flaky.delivered(), 2);

    pipeline.step().await;
    assert_eq!(collect_ids(&mut steady, 6).await, vec![1, 2, 3, 4, 5, 6]);
    assert!(flaky.drain().is_empty());
    assert_eq!(world.hub().subscriber_ids(), vec![steady_id]);
}

#[tokio::test]
async fn test_idle_hub_skips_serialization() {
    let world = world(60);
    let status = world.pipeline(ScriptedDetector::new().empty_frames(1, 100)).run().await;

    assert_eq!(status.frames_emitted, 100);
    let stats = world.hub().stats();
    assert_eq!(stats.frames_published, 100);
    assert_eq!(stats.frames_serialized, 0);
    assert_eq!(stats.messages_enqueued, 0);
    assert_eq!(world.hub().history().len(), 60);
}

#[tokio::test]
async fn test_bad_frames_leave_no_gaps() {
    let world = world(10);
    let player = RawDetection::new([600.0, 300.0, 640.0, 420.0], 0.9, Some(1));
    let broken = RawDetection::new([f64::NAN, 300.0, 640.0, 420.0], 0.9, Some(1));
    let detector = ScriptedDetector::new()
        .batch(1, vec![player.clone()])
        .frame_error(2, "decode")
        .batch(3, vec![broken])
        .batch(4, vec![player]);

    let (_, mut viewer) = world.subscribe("viewer");
    let status = world.pipeline(detector).run().await;

    assert_eq!(status.frames_emitted, 2);
    assert_eq!(status.frames_skipped, 2);
    let entries = tokio::time::timeout(WAIT, viewer.collect(2)).await.unwrap();
    let seen: Vec<(u64, u64)> = entries.iter().map(|e| (e.sequence_id, e.frame_index)).collect();
    assert_eq!(seen, vec![(1, 1), (2, 4)]);
}

#[tokio::test]
async fn test_source_outage_keeps_history_and_subscribers() {
    let world = world(20);
    let calibration = world.calibration().unwrap().clone();
    let mut oracle = world.oracle();
    oracle.spawn_random_players(4);
    let detector = SyntheticDetector::new(oracle, calibration, 30.0, 100).with_outage_at(31);

    let (viewer_id, mut viewer) = world.subscribe("viewer");
    let status = world.pipeline(detector).run().await;

    assert_eq!(status.state, PipelineState::Stopped);
    assert!(matches!(status.stop_reason, Some(StopReason::SourceFatalError(_))));
    assert_eq!(status.last_sequence_id, Some(30));
    assert_eq!(collect_ids(&mut viewer, 30).await, (1..=30).collect::<Vec<_>>());
    assert!(world.hub().contains(viewer_id));

    let (_, mut late) = world.subscribe("late");
    assert_eq!(collect_ids(&mut late, 20).await, (11..=30).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_uncalibrated_world_streams_without_court_points() {
    let world = SimWorld::new(SimConfig {
        court_corners: None,
        ..SimConfig::default()
    })
    .unwrap();
    let detector = ScriptedDetector::new().batch(
        1,
        vec![RawDetection::new([600.0, 300.0, 640.0, 420.0], 0.9, Some(1))],
    );

    let (_, mut viewer) = world.subscribe("viewer");
    world.pipeline(detector).run().await;

    let entry = tokio::time::timeout(WAIT, viewer.recv_entry()).await.unwrap().unwrap();
    assert_eq!(entry.detections.len(), 1);
    assert!(entry.detections[0].transformed_ground_point.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribers_joining_mid_run_see_contiguous_ids() {
    const FRAMES: u64 = 500;

    let world = SimWorld::new(SimConfig {
        buffer_capacity: 60,
        queue_depth: 1024,
        ..SimConfig::default()
    })
    .unwrap();
    let pipeline = world.pipeline(ScriptedDetector::new().empty_frames(1, FRAMES));
    let producer = tokio::spawn(pipeline.run());

    let mut viewers = Vec::new();
    for i in 0..8 {
        for _ in 0..i * 25 {
            tokio::task::yield_now().await;
        }
        viewers.push(world.subscribe(&format!("viewer-{i}")).1);
    }
    producer.await.unwrap();

    for viewer in &mut viewers {
        let ids: Vec<u64> = read_until(viewer, FRAMES).await.iter().map(|e| e.sequence_id).collect();
        let first = ids[0];
        assert_eq!(ids, (first..=FRAMES).collect::<Vec<_>>(), "{}", viewer.label());
    }
}

#[tokio::test]
async fn test_same_seed_same_broadcast() {
    async fn broadcast(seed: u64) -> Vec<FrameEntry> {
        let world = SimWorld::new(SimConfig {
            seed,
            ..SimConfig::default()
        })
        .unwrap();
        let calibration = world.calibration().unwrap().clone();
        let mut oracle = world.oracle();
        oracle.spawn_random_players(5);
        let detector = SyntheticDetector::new(oracle, calibration, 30.0, 40);

        let (_, mut viewer) = world.subscribe("viewer");
        world.pipeline(detector).run().await;
        tokio::time::timeout(WAIT, viewer.collect(40)).await.unwrap()
    }

    let first = broadcast(11).await;
    assert_eq!(first.len(), 40);
    assert_eq!(first, broadcast(11).await);
    assert_ne!(first, broadcast(12).await);
}

#[tokio::test]
async fn test_all_scenarios_pass() {
    let runner = ScenarioRunner::new(7).with_frames(150).with_players(8);
    for scenario in ScenarioId::all() {
        let result = runner.run(scenario).await;
        assert!(result.passed, "{scenario}: {:?}", result.failure_reason);
    }
}

#[tokio::test]
async fn test_full_match_reports_accuracy() {
    let result = ScenarioRunner::new(42).run(ScenarioId::FullMatch).await;
    assert!(result.passed, "{:?}", result.failure_reason);
    assert_eq!(result.frames_emitted, 300);
    assert!(result.metrics.placed_detections > 0);
    assert!(result.metrics.rms_error_m.unwrap() < 0.5);
    assert_eq!(result.final_subscribers, 2);
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_joiner_sees_buffered_tail_then_live(capacity in 1usize..8, before in 0u64..20, after in 0u64..6) {
        let received = block_on(async {
            let world = world(capacity);
            let mut pipeline = world.pipeline(ScriptedDetector::new().empty_frames(1, before + after));
            for _ in 0..before {
                pipeline.step().await;
            }
            let (_, mut viewer) = world.subscribe("viewer");
            for _ in 0..after {
                pipeline.step().await;
            }

            let buffered = (before as usize).min(capacity);
            collect_ids(&mut viewer, buffered + after as usize).await
        });

        let first = before.saturating_sub(capacity as u64) + 1;
        let expected: Vec<u64> = (first..=before + after).collect();
        prop_assert_eq!(received, expected);
    }
}

