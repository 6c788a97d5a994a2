//! Tracker lifecycle: init, background reload, interrupt, teardown.

mod common;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{MemoryDataSource, StubParser};
use ocarina_io::DataSource;
use ocarina_dash::{
    AdaptationSet, DashError, Playlist, PlaylistType, ReloadRateLimiter, Representation,
    SegmentEntry, SegmentIndex, SegmentList, SegmentTemplate, StreamType, SegmentTracker,
    TrackerOptions, TrackerState,
};
use url::Url;

fn manifest_url() -> Url {
    Url::parse("http://cdn.example/stream/manifest.mpd").unwrap()
}

fn template_vod(segments: u64, seg_secs: u64) -> Playlist {
    Playlist {
        media_presentation_duration: Some(Duration::from_secs(segments * seg_secs)),
        adaptation_sets: vec![AdaptationSet {
            id: 0,
            content_type: StreamType::Video,
            lang: None,
            representations: vec![Representation {
                id: "v0".into(),
                bandwidth: 1_000_000,
                width: Some(1280),
                height: Some(720),
                codecs: None,
                index: SegmentIndex::Template(SegmentTemplate {
                    media: "v0-$Number$.m4s".into(),
                    initialization: Some("v0-init.m4s".into()),
                    timescale: 1,
                    duration: seg_secs,
                    start_number: 0,
                    presentation_time_offset: 0,
                }),
            }],
        }],
        ..Playlist::new(PlaylistType::Static)
    }
}

/// Live playlist with an explicit entry list so the window is deterministic.
fn live_list(entries: u64, update_period: Duration) -> Playlist {
    Playlist {
        minimum_update_period: Some(update_period),
        adaptation_sets: vec![AdaptationSet {
            id: 0,
            content_type: StreamType::Video,
            lang: None,
            representations: vec![Representation {
                id: "v0".into(),
                bandwidth: 1_000_000,
                width: None,
                height: None,
                codecs: None,
                index: SegmentIndex::List(SegmentList {
                    initialization: None,
                    timescale: 1,
                    start_number: 0,
                    entries: (0..entries)
                        .map(|i| SegmentEntry {
                            uri: format!("v0-{i}.m4s"),
                            range: None,
                            duration: 2,
                        })
                        .collect(),
                }),
            }],
        }],
        ..Playlist::new(PlaylistType::Live)
    }
}

fn tracker_with(
    source: Arc<MemoryDataSource>,
    parser: Arc<StubParser>,
    limiter: Arc<ReloadRateLimiter>,
    options: TrackerOptions,
) -> SegmentTracker {
    SegmentTracker::new(manifest_url(), 0, "v0", source, parser, limiter, options)
}

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn init_then_walk_static_manifest() {
    let source = MemoryDataSource::new("vod");
    let parser = StubParser::new();
    parser.insert("vod", template_vod(5, 4));

    let tracker = tracker_with(
        source.clone(),
        parser,
        Arc::new(ReloadRateLimiter::new()),
        TrackerOptions::default(),
    );
    assert_eq!(tracker.state(), TrackerState::Uninitialized);

    tracker.init().unwrap();
    assert_eq!(tracker.state(), TrackerState::Ready);
    assert!(tracker.is_inited());
    assert!(!tracker.is_live());
    assert_eq!(source.open_count(), 1);

    // Static manifest, 5 segments of 4s, start time 0.
    let start = tracker.start_segment().unwrap();
    assert_eq!(start.sequence, 0);
    assert_eq!(tracker.next_segment().unwrap().sequence, 1);
    assert_eq!(tracker.next_segment().unwrap().sequence, 2);
    assert_eq!(tracker.next_segment().unwrap().sequence, 3);
    assert_eq!(tracker.next_segment().unwrap().sequence, 4);
    assert!(tracker.next_segment().is_none());

    // No reload worker for static streams.
    assert_eq!(source.open_count(), 1);
}

#[test]
fn init_parse_error_leaves_tracker_retryable() {
    let source = MemoryDataSource::new("garbage");
    let parser = StubParser::new();
    parser.insert("vod", template_vod(3, 4));

    let tracker = tracker_with(
        source.clone(),
        parser,
        Arc::new(ReloadRateLimiter::new()),
        TrackerOptions::default(),
    );

    let err = tracker.init().unwrap_err();
    assert!(matches!(err, DashError::Parse(_)));
    assert_eq!(tracker.state(), TrackerState::Uninitialized);

    // A corrected manifest makes a retry succeed.
    source.set_payload("vod");
    tracker.init().unwrap();
    assert!(tracker.is_inited());
}

#[test]
fn init_timeout_surfaces_as_timeout() {
    let source = MemoryDataSource::new("vod");
    source.set_fail_timeout(true);
    let parser = StubParser::new();
    parser.insert("vod", template_vod(3, 4));

    let tracker = tracker_with(
        source,
        parser,
        Arc::new(ReloadRateLimiter::new()),
        TrackerOptions::default(),
    );
    assert!(matches!(tracker.init().unwrap_err(), DashError::Timeout));
}

#[test]
fn live_reload_publishes_new_snapshot() {
    common::init_tracing();
    let source = MemoryDataSource::new("live-v1");
    let parser = StubParser::new();
    parser.insert("live-v1", live_list(3, Duration::from_millis(30)));
    parser.insert("live-v2", live_list(5, Duration::from_millis(30)));

    let options = TrackerOptions::default().with_min_reload_interval(Duration::from_millis(10));
    let tracker = tracker_with(
        source.clone(),
        parser,
        Arc::new(ReloadRateLimiter::new()),
        options,
    );
    tracker.init().unwrap();
    assert!(tracker.is_live());
    assert_eq!(tracker.last_segment_number(), Some(2));

    source.set_payload("live-v2");
    assert!(
        wait_until(Duration::from_secs(5), || tracker.last_segment_number() == Some(4)),
        "reload worker never published the grown window"
    );
}

#[test]
fn reload_failure_keeps_previous_snapshot() {
    let source = MemoryDataSource::new("live-v1");
    let parser = StubParser::new();
    parser.insert("live-v1", live_list(3, Duration::from_millis(20)));
    parser.insert("live-v2", live_list(6, Duration::from_millis(20)));

    let options = TrackerOptions::default().with_min_reload_interval(Duration::from_millis(10));
    let tracker = tracker_with(
        source.clone(),
        parser,
        Arc::new(ReloadRateLimiter::new()),
        options,
    );
    tracker.init().unwrap();
    let opens_after_init = source.open_count();

    // Unparseable payload: reloads fail, the old snapshot stays.
    source.set_payload("junk");
    assert!(
        wait_until(Duration::from_secs(5), || source.open_count() > opens_after_init + 1),
        "reload worker stopped retrying after failures"
    );
    assert_eq!(tracker.last_segment_number(), Some(2));
    assert_eq!(tracker.state(), TrackerState::Ready);

    // Retries at the same cadence pick up a later good manifest.
    source.set_payload("live-v2");
    assert!(wait_until(Duration::from_secs(5), || {
        tracker.last_segment_number() == Some(5)
    }));
}

#[test]
fn forced_reload_refreshes_immediately() {
    let source = MemoryDataSource::new("live-v1");
    let parser = StubParser::new();
    // Long scheduled cadence; only a forced reload can explain a refresh.
    parser.insert("live-v1", live_list(3, Duration::from_secs(3600)));
    parser.insert("live-v2", live_list(4, Duration::from_secs(3600)));

    let tracker = tracker_with(
        source.clone(),
        parser,
        Arc::new(ReloadRateLimiter::new()),
        TrackerOptions::default(),
    );
    tracker.init().unwrap();

    source.set_payload("live-v2");
    tracker.reload_playlist().unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || tracker.last_segment_number() == Some(3)),
        "forced reload did not refresh the snapshot"
    );
}

#[test]
fn shared_rate_limiter_suppresses_reload_storms() {
    let source = MemoryDataSource::new("live-v1");
    let parser = StubParser::new();
    parser.insert("live-v1", live_list(3, Duration::from_millis(200)));

    let limiter = Arc::new(ReloadRateLimiter::new());
    let options = TrackerOptions::default().with_min_reload_interval(Duration::from_millis(50));

    let a = SegmentTracker::new(
        manifest_url(),
        0,
        "v0",
        source.clone(),
        parser.clone(),
        limiter.clone(),
        options.clone(),
    );
    let b = SegmentTracker::new(
        manifest_url(),
        0,
        "v0",
        source.clone(),
        parser,
        limiter,
        options,
    );
    a.init().unwrap();
    b.init().unwrap();
    let opens_after_init = source.open_count();

    std::thread::sleep(Duration::from_millis(700));
    let reloads = source.open_count() - opens_after_init;

    // Two uncoordinated workers on a 200ms cadence would fetch ~6 times in
    // 700ms; the shared limiter keeps it to one fetch per period.
    assert!(
        reloads <= 5,
        "expected coordinated reloads, saw {reloads} fetches in 700ms"
    );
    assert!(reloads >= 1, "no reload happened at all");
}

#[test]
fn interrupt_mid_reload_is_prompt_and_worker_exits() {
    common::init_tracing();
    // Every open stalls 10s; only cooperative interrupt can end it early.
    let source = MemoryDataSource::with_delay("live-v1", Duration::from_secs(10));
    let parser = StubParser::new();
    parser.insert("live-v1", live_list(3, Duration::from_millis(20)));

    let options = TrackerOptions::default().with_min_reload_interval(Duration::from_millis(10));
    let tracker = tracker_with(source.clone(), parser, Arc::new(ReloadRateLimiter::new()), options);

    // First load would block for 10s; interrupt from another thread.
    let started = Instant::now();
    let canceller = std::thread::spawn({
        let source = source.clone();
        move || {
            std::thread::sleep(Duration::from_millis(50));
            source.interrupt(true);
        }
    });
    let err = tracker.init().unwrap_err();
    assert!(err.is_interrupted());
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "init did not observe the interrupt promptly"
    );
    canceller.join().unwrap();
}

#[test]
fn interrupted_live_tracker_stops_and_joins() {
    let source = MemoryDataSource::new("live-v1");
    let parser = StubParser::new();
    parser.insert("live-v1", live_list(3, Duration::from_millis(20)));

    let options = TrackerOptions::default().with_min_reload_interval(Duration::from_millis(10));
    let tracker = tracker_with(source, parser, Arc::new(ReloadRateLimiter::new()), options);
    tracker.init().unwrap();
    assert!(tracker.start_segment().is_some());

    tracker.interrupt(true);
    assert_eq!(tracker.state(), TrackerState::Stopped);
    assert!(tracker.start_segment().is_none());
    assert!(tracker.next_segment().is_none());
    assert!(tracker.segment_list().is_empty());
    assert!(matches!(tracker.reload_playlist(), Err(DashError::Interrupted)));

    // Teardown interrupts and joins the worker; bounded time.
    let started = Instant::now();
    drop(tracker);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn snapshot_swaps_are_never_torn() {
    let source = MemoryDataSource::new("live-v1");
    let parser = StubParser::new();
    parser.insert("live-v1", live_list(3, Duration::from_millis(10)));
    parser.insert("live-v2", live_list(5, Duration::from_millis(10)));

    let options = TrackerOptions::default().with_min_reload_interval(Duration::from_millis(5));
    let tracker = tracker_with(source.clone(), parser, Arc::new(ReloadRateLimiter::new()), options);
    tracker.init().unwrap();

    let flipper = std::thread::spawn({
        let source = source.clone();
        move || {
            for i in 0..40 {
                source.set_payload(if i % 2 == 0 { "live-v2" } else { "live-v1" });
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    });

    // Every observation must be internally consistent with exactly one of
    // the two published snapshots.
    for _ in 0..200 {
        let segments = tracker.segment_list();
        assert!(
            segments.len() == 3 || segments.len() == 5,
            "torn snapshot: saw {} segments",
            segments.len()
        );
        if let Some(last) = tracker.last_segment_number() {
            assert!(last == 2 || last == 4);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    flipper.join().unwrap();
}
