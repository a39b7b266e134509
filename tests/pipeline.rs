//! End-to-end pipeline tests against stand-in extraction tools
//!
//! Every test writes a small `sh` script that behaves like the extraction tool and runs real
//! jobs through the dispatcher, worker and fan-out.
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --test pipeline
//! ```

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{
    COMPLETES, FAILS, HANGS, NO_METADATA, REENCODES, assert_keys_in_order, collect_events_until,
    collect_until_terminal, progress_pcts, significant_keys, test_config, write_stub_tool,
};
use serial_test::serial;
use std::sync::Arc;
use std::time::{Duration, Instant};
use ytdl_web::config::RetryConfig;
use ytdl_web::staging::{StagingPaths, temp_basename};
use ytdl_web::{Dispatcher, Downloader, Event, EventHub, EventKey, Job, YtdlService};

const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

async fn started_service(body: &str) -> (YtdlService, tempfile::TempDir) {
    let root = tempfile::tempdir().unwrap();
    let tool = write_stub_tool(root.path(), body);
    let service = YtdlService::new(test_config(root.path(), tool))
        .await
        .unwrap();
    service.start().unwrap();
    (service, root)
}

#[tokio::test]
#[serial]
async fn completed_job_emits_info_progress_link_completed() {
    let (service, root) = started_service(COMPLETES).await;
    let mut events = service.subscribe();

    service.enqueue(URL).await.unwrap();
    let collected = collect_until_terminal(&mut events, Duration::from_secs(15)).await;

    assert_keys_in_order(
        &collected,
        &[
            EventKey::Info,
            EventKey::Info,
            EventKey::Info,
            EventKey::LinkStream,
            EventKey::Completed,
        ],
    );
    assert_eq!(progress_pcts(&collected), vec![50.0, 100.0]);
    assert!(
        !significant_keys(&collected).contains(&EventKey::Error),
        "{collected:?}"
    );

    let link = collected
        .iter()
        .find_map(|e| match e {
            Event::LinkStream(info) => Some(info.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(link.download_url, "dl/ytdl-Band-Song.m4a");
    assert_eq!(link.title, "Song");
    assert_eq!(link.artist, "Band");
    assert_eq!(link.file_size, 1000);

    match collected.last().unwrap() {
        Event::Completed(status) => {
            assert_eq!(status.id, link.id);
            assert_eq!(status.msg, "dl/ytdl-Band-Song.m4a");
        }
        other => panic!("expected completed, got {other:?}"),
    }

    assert!(root.path().join("dl/ytdl-Band-Song.m4a").is_file());
    let recent = service.recent().await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].url, "dl/ytdl-Band-Song.m4a");

    service.shutdown().await.unwrap();
}

#[tokio::test]
#[serial]
async fn reencoded_job_links_stream_once_then_completes() {
    const SOUNDCLOUD: &str = "https://soundcloud.com/band/song";

    let root = tempfile::tempdir().unwrap();
    let tool = write_stub_tool(root.path(), REENCODES);
    let mut config = test_config(root.path(), tool);
    config.reencode.estimate_interval = Duration::from_millis(50);
    let service = YtdlService::new(config).await.unwrap();
    service.start().unwrap();
    let mut events = service.subscribe();

    service.enqueue(SOUNDCLOUD).await.unwrap();
    let collected = collect_until_terminal(&mut events, Duration::from_secs(15)).await;

    assert_keys_in_order(
        &collected,
        &[EventKey::Info, EventKey::LinkStream, EventKey::Completed],
    );
    assert!(
        !significant_keys(&collected).contains(&EventKey::Error),
        "{collected:?}"
    );

    let links: Vec<String> = collected
        .iter()
        .filter_map(|e| match e {
            Event::LinkStream(info) => Some(info.download_url.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        links,
        vec![format!("dl/stream/t/{}.opus", temp_basename(SOUNDCLOUD))]
    );

    // The encode estimate reports against the mp3 source.
    assert!(progress_pcts(&collected).contains(&100.0));

    match collected.last().unwrap() {
        Event::Completed(status) => assert_eq!(status.msg, "dl/ytdl-Band-Song.oga"),
        other => panic!("expected completed, got {other:?}"),
    }
    assert!(root.path().join("dl/ytdl-Band-Song.oga").is_file());

    service.shutdown().await.unwrap();
}

#[tokio::test]
#[serial]
async fn missing_metadata_ends_in_error_after_polling_cap() {
    let (service, _root) = started_service(NO_METADATA).await;
    let mut events = service.subscribe();

    let started = Instant::now();
    service.enqueue(URL).await.unwrap();
    let collected = collect_until_terminal(&mut events, Duration::from_secs(15)).await;

    // 20 attempts at 50ms
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert_eq!(significant_keys(&collected), vec![EventKey::Error]);
    match collected.last().unwrap() {
        Event::Error(status) => assert!(status.msg.contains("info.json"), "{}", status.msg),
        other => panic!("expected error, got {other:?}"),
    }

    service.shutdown().await.unwrap();
}

#[tokio::test]
#[serial]
async fn failing_tool_reports_exit_error() {
    let (service, _root) = started_service(FAILS).await;
    let mut events = service.subscribe();

    service.enqueue(URL).await.unwrap();
    let collected = collect_until_terminal(&mut events, Duration::from_secs(15)).await;

    assert!(
        collected
            .iter()
            .any(|e| matches!(e, Event::Unknown(line) if line == "ERROR: Unsupported URL"))
    );
    match collected.last() {
        Some(Event::Error(status)) => assert!(status.msg.contains("exited"), "{}", status.msg),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(
        !collected
            .iter()
            .any(|e| matches!(e, Event::Completed(_) | Event::Info(_)))
    );

    service.shutdown().await.unwrap();
}

#[tokio::test]
#[serial]
async fn deadline_kills_process_tree_silently() {
    let root = tempfile::tempdir().unwrap();
    let tool = write_stub_tool(root.path(), HANGS);
    let mut config = test_config(root.path(), tool);
    // Below the floor `validate` enforces, so the pipeline is assembled by hand.
    config.download.max_process_time = Duration::from_secs(1);
    std::fs::create_dir_all(config.temp_dir()).unwrap();
    let pid_file = StagingPaths::for_url(&config.temp_dir(), URL).with_extension("pid");
    let config = Arc::new(config);

    let hub = EventHub::new(64);
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(Downloader::new(Arc::clone(&config), tx)),
        2,
        RetryConfig::default(),
    ));
    let stop = tokio_util::sync::CancellationToken::new();
    let forwarder = {
        let hub = hub.clone();
        let stop = stop.clone();
        tokio::spawn(async move { hub.forward(rx, stop).await })
    };
    let runner = {
        let dispatcher = Arc::clone(&dispatcher);
        let stop = stop.clone();
        tokio::spawn(async move { dispatcher.start(stop).await })
    };

    let mut events = hub.subscribe();
    dispatcher.enqueue(Job::new(URL)).await.unwrap();

    // Mid-stream: metadata and the first progress line arrive.
    let early = collect_events_until(&mut events, Duration::from_secs(10), |e| {
        matches!(e, Event::Info(info) if info.progress.is_some())
    })
    .await;
    assert_eq!(progress_pcts(&early), vec![10.0]);

    // Nothing further once the deadline passes.
    let late = collect_events_until(&mut events, Duration::from_secs(3), |_| false).await;
    assert!(late.iter().all(|e| !e.is_terminal()), "{late:?}");

    let wait = Instant::now();
    while dispatcher.in_flight() > 0 && wait.elapsed() < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(dispatcher.in_flight(), 0);

    #[cfg(target_os = "linux")]
    {
        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let wait = Instant::now();
        while common::process_alive(pid) && wait.elapsed() < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!common::process_alive(pid), "child {pid} survived the deadline");
    }
    #[cfg(not(target_os = "linux"))]
    let _ = pid_file;

    stop.cancel();
    runner.await.unwrap().unwrap();
    forwarder.await.unwrap();
}

#[tokio::test]
#[serial]
async fn unsubscribed_listener_stops_receiving_while_other_completes() {
    let (service, _root) = started_service(COMPLETES).await;
    let mut leaving = service.subscribe();
    let mut staying = service.subscribe();
    assert_eq!(service.hub().subscriber_count(), 2);

    service.enqueue(URL).await.unwrap();

    let first = collect_events_until(&mut leaving, Duration::from_secs(10), |e| {
        matches!(e, Event::Info(_))
    })
    .await;
    assert!(matches!(first.last(), Some(Event::Info(_))));
    leaving.unsubscribe();
    assert_eq!(service.hub().subscriber_count(), 1);

    let collected = collect_until_terminal(&mut staying, Duration::from_secs(15)).await;
    assert!(matches!(collected.last(), Some(Event::Completed(_))));
    assert_keys_in_order(
        &collected,
        &[EventKey::Info, EventKey::LinkStream, EventKey::Completed],
    );

    service.shutdown().await.unwrap();
}

#[tokio::test]
#[serial]
async fn shutdown_waits_for_running_job() {
    let (service, root) = started_service(COMPLETES).await;
    let mut events = service.subscribe();

    service.enqueue(URL).await.unwrap();
    collect_events_until(&mut events, Duration::from_secs(10), |e| {
        matches!(e, Event::Info(_))
    })
    .await;

    service.shutdown().await.unwrap();

    assert_eq!(service.in_flight(), 0);
    assert!(root.path().join("dl/ytdl-Band-Song.m4a").is_file());
    let rest = collect_until_terminal(&mut events, Duration::from_secs(1)).await;
    assert!(matches!(rest.last(), Some(Event::Completed(_))), "{rest:?}");
}
